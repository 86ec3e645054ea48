//! REST operation groups: account, persona, and voice management.
//!
//! Every operation builds a request, sends it through the shared HTTPS
//! helper, and checks the status code plus the response fields the service
//! uses to signal success. Field-length constraints are validated locally
//! before any network call. Domain payloads stay untyped
//! (`serde_json::Value`); this crate does not model the service's schemas.

pub mod account;
pub mod persona;
pub mod voice;

/// Base URL for the main chat API.
pub(crate) const PLUS_BASE: &str = "https://plus.character.ai";

/// Base URL for the multimodal (voice) API.
pub(crate) const NEO_BASE: &str = "https://neo.character.ai";
