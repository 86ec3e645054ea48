//! Client entry point: owns the credential, the HTTPS requester, and the
//! WebSocket session registry.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::{Method, Requester, Response};
use crate::methods::account::AccountMethods;
use crate::methods::{NEO_BASE, PLUS_BASE};
use crate::methods::persona::PersonaMethods;
use crate::methods::voice::VoiceMethods;
use crate::ws::{ResponseStream, Session, SessionKey, SessionRegistry, WsConfig};

/// Environment variable read by [`Client::from_env`].
const TOKEN_ENV_VAR: &str = "CHARACTERAI_TOKEN";

/// Asynchronous client for the Character.AI API.
///
/// REST operations are grouped behind [`Client::account`],
/// [`Client::personas`] and [`Client::voices`]; real-time chat exchanges go
/// through the WebSocket session layer ([`Client::send_and_receive`] and
/// friends). The client holds no global state: every session lives in this
/// instance's registry and dies with its idle timer.
pub struct Client {
    token: SecretString,
    requester: Requester,
    registry: SessionRegistry,
    plus_base: String,
    neo_base: String,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("token", &"<redacted>")
            .field("plus_base", &self.plus_base)
            .field("neo_base", &self.neo_base)
            .finish_non_exhaustive()
    }
}

/// Configures and builds a [`Client`].
pub struct ClientBuilder {
    token: SecretString,
    proxy: Option<String>,
    ws_config: WsConfig,
    plus_base: String,
    neo_base: String,
}

impl ClientBuilder {
    fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            proxy: None,
            ws_config: WsConfig::default(),
            plus_base: PLUS_BASE.to_string(),
            neo_base: NEO_BASE.to_string(),
        }
    }

    /// Routes both HTTPS and WebSocket traffic through an HTTP proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Inactivity duration after which a session tears itself down.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.ws_config.idle_timeout = idle_timeout;
        self
    }

    /// Bounded-poll slice used by response streams waiting on the shared
    /// inbound queue.
    pub fn poll_slice(mut self, poll_slice: Duration) -> Self {
        self.ws_config.poll_slice = poll_slice;
        self
    }

    /// Overrides the WebSocket endpoint (tests).
    pub fn ws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ws_config.endpoint = endpoint.into();
        self
    }

    /// Overrides the main chat API base URL (tests).
    pub fn plus_base(mut self, base: impl Into<String>) -> Self {
        self.plus_base = base.into();
        self
    }

    /// Overrides the multimodal API base URL (tests).
    pub fn neo_base(mut self, base: impl Into<String>) -> Self {
        self.neo_base = base.into();
        self
    }

    pub fn build(self) -> Result<Client> {
        let requester = Requester::new(self.proxy.as_deref())?;
        let mut ws_config = self.ws_config;
        ws_config.proxy = self.proxy;
        Ok(Client {
            token: self.token,
            requester,
            registry: SessionRegistry::new(ws_config),
            plus_base: self.plus_base,
            neo_base: self.neo_base,
        })
    }
}

impl Client {
    /// Builds a client with default settings for `token`.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    pub fn builder(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(token)
    }

    /// Builds a client from the `CHARACTERAI_TOKEN` environment variable,
    /// loading `.env` first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let token = std::env::var(TOKEN_ENV_VAR)
            .map_err(|_| Error::InvalidArgument(format!("{TOKEN_ENV_VAR} is not set")))?;
        Self::new(token)
    }

    // ── REST operation groups ──

    pub fn account(&self) -> AccountMethods<'_> {
        AccountMethods::new(self)
    }

    pub fn personas(&self) -> PersonaMethods<'_> {
        PersonaMethods::new(self)
    }

    pub fn voices(&self) -> VoiceMethods<'_> {
        VoiceMethods::new(self)
    }

    // ── WebSocket session layer ──

    /// The session registry backing this client.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The registry key for `auxiliary_id` under this client's credential.
    pub fn session_key(&self, auxiliary_id: &str) -> SessionKey {
        SessionKey::new(self.token.expose_secret(), auxiliary_id)
    }

    /// Returns the session for `auxiliary_id`, creating and connecting one
    /// if none is registered.
    pub async fn get_or_create_session(&self, auxiliary_id: &str) -> Result<Arc<Session>> {
        self.registry
            .get_or_create(self.token.expose_secret(), auxiliary_id)
            .await
    }

    /// Sends `message` over the session for `auxiliary_id` and returns the
    /// stream of correlated responses.
    pub async fn send_and_receive(
        &self,
        message: &Value,
        auxiliary_id: &str,
    ) -> Result<ResponseStream> {
        let session = self.get_or_create_session(auxiliary_id).await?;
        session.send_and_receive(message).await
    }

    /// Tears down the session for `auxiliary_id`, if any.
    pub async fn close_session(&self, auxiliary_id: &str) {
        self.registry.close(&self.session_key(auxiliary_id)).await;
    }

    /// Tears down every session this client opened.
    pub async fn close_all_sessions(&self) {
        self.registry.close_all().await;
    }

    // ── Shared request plumbing ──

    pub(crate) fn plus_base(&self) -> &str {
        &self.plus_base
    }

    pub(crate) fn neo_base(&self) -> &str {
        &self.neo_base
    }

    pub(crate) fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let authorization = format!("Token {}", self.token.expose_secret())
            .parse()
            .map_err(|_| Error::InvalidArgument("token is not header-safe".into()))?;
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub(crate) async fn get(&self, url: &str) -> Result<Response> {
        self.requester
            .request(Method::GET, url, self.auth_headers()?, None)
            .await
    }

    pub(crate) async fn post(&self, url: &str, body: &Value) -> Result<Response> {
        self.requester
            .request(Method::POST, url, self.auth_headers()?, Some(body))
            .await
    }

    pub(crate) async fn post_empty(&self, url: &str) -> Result<Response> {
        self.requester
            .request(Method::POST, url, self.auth_headers()?, None)
            .await
    }
}
