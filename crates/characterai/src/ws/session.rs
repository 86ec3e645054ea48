//! One multiplexed WebSocket session: connection lifecycle, the background
//! router task, and idle-timeout teardown.
//!
//! A session pairs one physical socket with an unbounded inbound queue and a
//! table of per-correlation buffers. The router task reads frames off the
//! socket and pushes them on the queue; consumers classify them from the
//! queue into the buffers (see [`ResponseStream`]). The router starts on the
//! first `send` and stops on teardown or when the server closes the socket.
//!
//! Every `send` and every consumed response resets the idle timer; after
//! `idle_timeout` without activity the session tears itself down and
//! deregisters, so abandoned conversations cannot accumulate sockets.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, USER_AGENT};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{
    client_async_tls_with_config, connect_async_tls_with_config, Connector, MaybeTlsStream,
    WebSocketStream,
};
use tracing::{debug, info, warn};

use super::proxy;
use super::registry::{SessionKey, SessionMap};
use super::stream::ResponseStream;
use super::WsConfig;
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Browser user-agent presented during the handshake; the service rejects
/// non-browser agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Result of one bounded poll on the shared inbound queue.
pub(crate) enum InboundPoll {
    /// A frame was pulled off the queue.
    Frame(Value),
    /// The poll slice elapsed with nothing to pull.
    TimedOut,
    /// The queue is gone: the session was torn down or never connected.
    Closed,
}

/// One multiplexed logical connection scope, keyed by credential and an
/// auxiliary identifier.
pub struct Session {
    key: SessionKey,
    config: WsConfig,
    registry: Weak<SessionMap>,
    writer: AsyncMutex<Option<SplitSink<WsStream, Message>>>,
    /// Read half parked between `connect` and the router taking it.
    reader: AsyncMutex<Option<SplitStream<WsStream>>>,
    inbound_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<Value>>>,
    inbound_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<Value>>>,
    /// Already-classified frames, keyed by the frame's own correlation id.
    buffers: parking_lot::Mutex<HashMap<String, VecDeque<Value>>>,
    receiving: AtomicBool,
    in_use: AtomicBool,
    router_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    idle_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(key: SessionKey, config: WsConfig, registry: Weak<SessionMap>) -> Arc<Self> {
        Arc::new(Self {
            key,
            config,
            registry,
            writer: AsyncMutex::new(None),
            reader: AsyncMutex::new(None),
            inbound_tx: parking_lot::Mutex::new(None),
            inbound_rx: AsyncMutex::new(None),
            buffers: parking_lot::Mutex::new(HashMap::new()),
            receiving: AtomicBool::new(false),
            in_use: AtomicBool::new(false),
            router_task: parking_lot::Mutex::new(None),
            idle_task: parking_lot::Mutex::new(None),
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Whether the socket is currently open.
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Opens the socket to the service endpoint.
    ///
    /// An already-connected session drops its previous connection first, so
    /// a session never holds more than one socket. A refused handshake maps
    /// to [`Error::Authentication`]: the usual cause is an invalid token.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.is_connected().await {
            self.disconnect().await;
        }

        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| Error::InvalidArgument(format!("invalid websocket endpoint: {e}")))?;
        let cookie = format!("HTTP_AUTHORIZATION=\"Token {}\"", self.key.token);
        request.headers_mut().insert(
            USER_AGENT,
            BROWSER_USER_AGENT
                .parse()
                .map_err(|e| Error::Request(format!("invalid user-agent header: {e}")))?,
        );
        request.headers_mut().insert(
            COOKIE,
            cookie
                .parse()
                .map_err(|e| Error::InvalidArgument(format!("token is not header-safe: {e}")))?,
        );

        // The service fronts the endpoint with hosts whose certificates do
        // not always validate; verification stays off, matching the browser
        // clients the endpoint expects.
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Request(format!("cannot build tls connector: {e}")))?;
        let connector = Connector::NativeTls(tls);

        let ws = match &self.config.proxy {
            Some(proxy_url) => {
                let uri = request.uri();
                let host = uri
                    .host()
                    .ok_or_else(|| Error::InvalidArgument("endpoint has no host".into()))?
                    .to_string();
                let port = uri.port_u16().unwrap_or_else(|| {
                    if uri.scheme_str() == Some("wss") {
                        443
                    } else {
                        80
                    }
                });
                let tcp = proxy::tunnel(proxy_url, &host, port).await?;
                let (ws, _) = client_async_tls_with_config(request, tcp, None, Some(connector))
                    .await
                    .map_err(map_handshake_error)?;
                ws
            }
            None => {
                let (ws, _) = connect_async_tls_with_config(request, None, false, Some(connector))
                    .await
                    .map_err(map_handshake_error)?;
                ws
            }
        };

        let (write, read) = ws.split();
        *self.writer.lock().await = Some(write);
        *self.reader.lock().await = Some(read);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound_tx.lock() = Some(tx);
        *self.inbound_rx.lock().await = Some(rx);

        self.reset_idle_timer();
        info!(key = ?self.key, "websocket session connected");
        Ok(())
    }

    /// Sends one message, lazily connecting and starting the router if
    /// needed. Resets the idle timer.
    pub async fn send(self: &Arc<Self>, message: &Value) -> Result<()> {
        self.reset_idle_timer();

        if !self.is_connected().await {
            self.connect().await?;
        }
        self.ensure_router();

        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(Error::Request("session is not connected".into()));
        };
        writer
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| Error::Request(format!("connection reset during send: {e}")))
    }

    /// Returns a [`ResponseStream`] pulling frames correlated to
    /// `request_id`, or un-correlated frames when `None`.
    pub fn receive(self: &Arc<Self>, request_id: Option<String>) -> ResponseStream {
        ResponseStream::new(Arc::clone(self), request_id)
    }

    /// Sends `message` and returns the stream of responses correlated to its
    /// `request_id` field (un-correlated delivery when the field is absent).
    pub async fn send_and_receive(self: &Arc<Self>, message: &Value) -> Result<ResponseStream> {
        let request_id = message
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.send(message).await?;
        Ok(self.receive(request_id))
    }

    /// Stops the router, closes the socket, cancels the idle timer, and
    /// removes this session from the registry. Idempotent.
    pub async fn teardown(&self) {
        self.receiving.store(false, Ordering::SeqCst);
        // Dropping the sender ends every consumer's queue poll.
        self.inbound_tx.lock().take();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }
        *self.reader.lock().await = None;
        if let Some(sessions) = self.registry.upgrade() {
            sessions.lock().await.remove(&self.key);
        }
        // Aborts go last: teardown may be running on the router or idle task
        // itself, and an abort cancels that task at its next await point.
        if let Some(task) = self.router_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.idle_task.lock().take() {
            task.abort();
        }
        debug!(key = ?self.key, "session torn down");
    }

    /// Drops the current connection without deregistering, so the session
    /// can be reconnected under the same registry entry.
    async fn disconnect(&self) {
        self.receiving.store(false, Ordering::SeqCst);
        self.inbound_tx.lock().take();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }
        *self.reader.lock().await = None;
        if let Some(task) = self.router_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.idle_task.lock().take() {
            task.abort();
        }
    }

    /// Cancels and reschedules the idle teardown. `in_use` goes true
    /// immediately and false once the countdown starts; a reset during the
    /// countdown replaces the timer, so an active session never expires.
    pub(crate) fn reset_idle_timer(self: &Arc<Self>) {
        self.in_use.store(true, Ordering::SeqCst);
        if let Some(task) = self.idle_task.lock().take() {
            task.abort();
        }

        let session = Arc::downgrade(self);
        let idle_timeout = self.config.idle_timeout;
        let task = tokio::spawn(async move {
            let Some(strong) = session.upgrade() else {
                return;
            };
            strong.in_use.store(false, Ordering::SeqCst);
            drop(strong);

            tokio::time::sleep(idle_timeout).await;

            let Some(strong) = session.upgrade() else {
                return;
            };
            if !strong.in_use.load(Ordering::SeqCst) {
                debug!(key = ?strong.key, "idle timeout elapsed, tearing session down");
                strong.teardown().await;
            }
        });
        *self.idle_task.lock() = Some(task);
    }

    /// Starts the router task if it is not running.
    fn ensure_router(self: &Arc<Self>) {
        let mut slot = self.router_task.lock();
        if slot.is_some() {
            return;
        }
        self.receiving.store(true, Ordering::SeqCst);

        let session = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let result = session.router_loop().await;
            // Completion observer: a cancelled router never reaches this
            // point (teardown already reset the state); anything else marks
            // the receiver stopped so consumers can detect the broken state.
            session.receiving.store(false, Ordering::SeqCst);
            session.router_task.lock().take();
            match result {
                Ok(()) => debug!(key = ?session.key, "router stopped"),
                Err(e) => warn!(key = ?session.key, error = %e, "router terminated"),
            }
        }));
    }

    /// Reads frames off the socket while `receiving` is set, pushing parsed
    /// text frames on the shared inbound queue. A malformed frame, close
    /// frame, reader error, or EOF tears the session down so the next
    /// attempt starts clean. The router owns the read half; once it exits
    /// abnormally the connection is unusable, so every abnormal exit runs
    /// the full teardown.
    async fn router_loop(self: &Arc<Self>) -> Result<()> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Request("session is not connected".into()))?;

        while self.receiving.load(Ordering::SeqCst) {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(message) => {
                        let tx = self.inbound_tx.lock().clone();
                        if let Some(tx) = tx {
                            let _ = tx.send(message);
                        }
                    }
                    Err(e) => {
                        self.teardown().await;
                        return Err(Error::Request(format!("malformed frame: {e}")));
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.teardown().await;
                    return Err(Error::SessionClosed(
                        "connection was closed by server".into(),
                    ));
                }
                // Ping/pong/binary: nothing to route.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.teardown().await;
                    return Err(Error::Request(format!("receive failed: {e}")));
                }
            }
        }
        Ok(())
    }

    /// Whether the router task is still reading frames.
    pub(crate) fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::SeqCst)
    }

    /// One bounded wait on the shared inbound queue.
    ///
    /// Bounding the wait lets many concurrently-waiting consumers share the
    /// single queue receiver fairly: each gives the lock back after at most
    /// one poll slice and rechecks its own buffer.
    pub(crate) async fn poll_inbound(&self) -> InboundPoll {
        let recv = async {
            let mut guard = self.inbound_rx.lock().await;
            match guard.as_mut() {
                None => InboundPoll::Closed,
                Some(rx) => match rx.recv().await {
                    Some(frame) => InboundPoll::Frame(frame),
                    None => InboundPoll::Closed,
                },
            }
        };
        match tokio::time::timeout(self.config.poll_slice, recv).await {
            Ok(poll) => poll,
            Err(_) => InboundPoll::TimedOut,
        }
    }

    /// Pops the oldest buffered frame for `request_id`, if any.
    pub(crate) fn pop_buffered(&self, request_id: &str) -> Option<Value> {
        self.buffers.lock().get_mut(request_id)?.pop_front()
    }

    /// Files a classified frame under its own correlation id.
    pub(crate) fn push_buffered(&self, request_id: &str, frame: Value) {
        self.buffers
            .lock()
            .entry(request_id.to_string())
            .or_default()
            .push_back(frame);
    }

    /// Discards the buffer entry for `request_id`, bounding memory once its
    /// consumer loses interest.
    pub(crate) fn discard_buffer(&self, request_id: &str) {
        self.buffers.lock().remove(request_id);
    }
}

fn map_handshake_error(err: WsError) -> Error {
    match err {
        WsError::Http(response) => Error::Authentication(format!(
            "websocket handshake rejected with status {}; maybe your token is invalid?",
            response.status()
        )),
        other => Error::Request(format!("websocket connection failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::WsConfig;

    fn detached_session() -> Arc<Session> {
        Session::new(
            SessionKey::new("tok", "aux"),
            WsConfig::default(),
            Weak::new(),
        )
    }

    #[tokio::test]
    async fn new_session_is_disconnected_and_not_receiving() {
        let session = detached_session();
        assert!(!session.is_connected().await);
        assert!(!session.is_receiving());
    }

    #[tokio::test]
    async fn teardown_is_idempotent_on_unconnected_session() {
        let session = detached_session();
        session.teardown().await;
        session.teardown().await;
        assert!(!session.is_connected().await);
    }

    #[test]
    fn buffers_preserve_fifo_per_correlation_id() {
        let session = detached_session();
        session.push_buffered("r1", serde_json::json!({"seq": 1}));
        session.push_buffered("r1", serde_json::json!({"seq": 2}));
        session.push_buffered("r2", serde_json::json!({"seq": 9}));

        assert_eq!(session.pop_buffered("r1").unwrap()["seq"], 1);
        assert_eq!(session.pop_buffered("r2").unwrap()["seq"], 9);
        assert_eq!(session.pop_buffered("r1").unwrap()["seq"], 2);
        assert!(session.pop_buffered("r1").is_none());
    }

    #[test]
    fn discard_buffer_drops_pending_frames() {
        let session = detached_session();
        session.push_buffered("r1", serde_json::json!({"seq": 1}));
        session.discard_buffer("r1");
        assert!(session.pop_buffered("r1").is_none());
    }

    #[test]
    fn handshake_rejection_maps_to_authentication() {
        let response = tokio_tungstenite::tungstenite::http::Response::builder()
            .status(401)
            .body(None)
            .unwrap();
        let err = map_handshake_error(WsError::Http(response));
        assert!(matches!(err, Error::Authentication(_)));
    }
}
