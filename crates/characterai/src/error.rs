//! Error taxonomy for the client.
//!
//! Three families of failure surface from this crate:
//!
//! - credential problems ([`Error::Authentication`]), raised at the HTTP
//!   layer on a 401 or when the WebSocket handshake is refused;
//! - transport problems ([`Error::Request`], [`Error::SessionClosed`]),
//!   raised when a request cannot complete or the server closes the
//!   real-time socket under an active session;
//! - action failures, raised after the service answered but refused or
//!   mangled the operation.
//!
//! Validation failures ([`Error::InvalidArgument`]) are raised before any
//! network call is made. Nothing in this crate retries: transport failures
//! tear the affected session down so the next attempt starts clean.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The service rejected the credential (HTTP 401 or a refused
    /// WebSocket handshake).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport-level failure: no response, connection reset mid-send, or
    /// a broken session detected while waiting for frames.
    #[error("request failed: {0}")]
    Request(String),

    /// The server closed the WebSocket while the session was active.
    #[error("session closed: {0}")]
    SessionClosed(String),

    /// Input rejected locally, before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("create failed: {0}")]
    Create(String),

    #[error("edit failed: {0}")]
    Edit(String),

    #[error("update failed: {0}")]
    Update(String),

    #[error("set failed: {0}")]
    Set(String),

    #[error("delete failed: {0}")]
    Delete(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = Error::Authentication("maybe your token is invalid?".into());
        assert_eq!(
            err.to_string(),
            "authentication failed: maybe your token is invalid?"
        );

        let err = Error::InvalidArgument("name too short".into());
        assert_eq!(err.to_string(), "invalid argument: name too short");
    }
}
