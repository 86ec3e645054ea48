//! Unofficial asynchronous client for the Character.AI API.
//!
//! The crate exposes account, persona, and voice management over HTTPS and
//! a persistent WebSocket channel for real-time chat request/response
//! exchanges. Many logical conversations are multiplexed over a small
//! number of long-lived sockets, keyed by credential and an auxiliary
//! identifier, with idle-timeout lifecycle management and demultiplexing by
//! correlation id (see [`ws`]).
//!
//! ```no_run
//! use serde_json::json;
//!
//! # async fn run() -> characterai::Result<()> {
//! let client = characterai::Client::new("my-token")?;
//!
//! let me = client.account().fetch_me().await?;
//! println!("logged in as {}", me["username"]);
//!
//! let mut responses = client
//!     .send_and_receive(
//!         &json!({"command": "create_chat", "request_id": "r1"}),
//!         "",
//!     )
//!     .await?;
//! while let Some(frame) = responses.next().await {
//!     println!("{}", frame?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod methods;
pub mod ws;

mod client;

pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
