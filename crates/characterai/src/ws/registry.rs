//! Session registry: get-or-create lookup keyed by credential and an
//! auxiliary identifier.
//!
//! The registry is an explicit dependency constructed once per [`Client`]
//! rather than process-global state. The map itself is the owner of live
//! sessions; a [`Session`] only holds a weak handle back to it so it can
//! deregister itself on teardown.
//!
//! [`Client`]: crate::Client

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::session::Session;
use super::WsConfig;
use crate::error::Result;

/// Identity of one multiplexed connection scope.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub token: String,
    pub auxiliary_id: String,
}

impl SessionKey {
    pub fn new(token: impl Into<String>, auxiliary_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            auxiliary_id: auxiliary_id.into(),
        }
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("token", &"<redacted>")
            .field("auxiliary_id", &self.auxiliary_id)
            .finish()
    }
}

pub(crate) type SessionMap = Mutex<HashMap<SessionKey, Arc<Session>>>;

/// Process-scoped map from [`SessionKey`] to live [`Session`].
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    config: WsConfig,
}

impl SessionRegistry {
    pub fn new(config: WsConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Returns the session registered under the key, creating and connecting
    /// a new one on a miss.
    ///
    /// An existing entry is returned unconditionally, even if it has not
    /// finished (or has failed) connecting; connection happens lazily on the
    /// next `send`. On a miss the new session is inserted into the map before
    /// any suspension point, so concurrent calls for the same key always
    /// yield the same instance. If the initial connect fails the entry stays
    /// registered and the error propagates; a later `send` retries.
    pub async fn get_or_create(&self, token: &str, auxiliary_id: &str) -> Result<Arc<Session>> {
        let key = SessionKey::new(token, auxiliary_id);
        let (session, created) = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(&key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let session = Session::new(
                        key.clone(),
                        self.config.clone(),
                        Arc::downgrade(&self.sessions),
                    );
                    sessions.insert(key.clone(), Arc::clone(&session));
                    (session, true)
                }
            }
        };

        if created {
            debug!(?key, "registered new session");
            session.connect().await?;
        }
        Ok(session)
    }

    /// Tears down and removes the session for `key`, if any.
    pub async fn close(&self, key: &SessionKey) {
        let session = self.sessions.lock().await.get(key).cloned();
        if let Some(session) = session {
            session.teardown().await;
        }
    }

    /// Tears down and removes every registered session.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.values().cloned().collect();
        for session in sessions {
            session.teardown().await;
        }
    }

    /// Whether a session is currently registered under `key`.
    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_debug_redacts_token() {
        let key = SessionKey::new("super-secret-token", "chat42");
        let debug = format!("{key:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("chat42"));
    }

    #[test]
    fn session_keys_compare_by_both_fields() {
        let a = SessionKey::new("tok", "x");
        let b = SessionKey::new("tok", "x");
        let c = SessionKey::new("tok", "y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn registry_starts_empty() {
        let registry = SessionRegistry::new(WsConfig::default());
        assert!(registry.is_empty().await);
        // Closing a key that was never registered is a no-op.
        registry.close(&SessionKey::new("tok", "nope")).await;
        registry.close_all().await;
    }
}
