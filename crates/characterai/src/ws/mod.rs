//! Real-time WebSocket session management.
//!
//! One physical socket serves arbitrarily many concurrent logical
//! conversations, so this module multiplexes request/response exchanges over
//! a small number of long-lived connections. It is structured into
//! submodules:
//!
//! - `registry`: process-scoped map from `(credential, auxiliary id)` to a
//!   live [`Session`], with get-or-create semantics.
//! - `session`: one multiplexed connection scope; owns the socket, the
//!   background router task that reads and routes inbound frames, and the
//!   idle-timeout teardown.
//! - `stream`: the consumer-facing pull sequence of response frames for one
//!   outgoing request, demultiplexed by correlation id (`request_id`).
//! - `proxy`: HTTP CONNECT tunneling for proxied connections.

use std::time::Duration;

mod proxy;
pub mod registry;
pub mod session;
pub mod stream;

pub use registry::{SessionKey, SessionRegistry};
pub use session::Session;
pub use stream::ResponseStream;

/// The fixed real-time endpoint of the service.
pub const DEFAULT_ENDPOINT: &str = "wss://neo.character.ai/ws/";

/// Connection parameters shared by every session a registry creates.
#[derive(Clone, Debug)]
pub struct WsConfig {
    /// WebSocket endpoint URL. Overridable for tests; defaults to the
    /// production endpoint.
    pub endpoint: String,
    /// Optional HTTP proxy URL, tunneled through with CONNECT.
    pub proxy: Option<String>,
    /// Inactivity duration after which a session tears itself down.
    pub idle_timeout: Duration,
    /// How long a consumer waits on the shared inbound queue before
    /// rechecking its own per-correlation buffer.
    pub poll_slice: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            proxy: None,
            idle_timeout: Duration::from_secs(60),
            poll_slice: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_production_endpoint() {
        let config = WsConfig::default();
        assert_eq!(config.endpoint, "wss://neo.character.ai/ws/");
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_slice, Duration::from_secs(5));
        assert!(config.proxy.is_none());
    }
}
