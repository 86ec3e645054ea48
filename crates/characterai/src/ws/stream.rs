//! The consumer-facing sequence of response frames for one outgoing request.
//!
//! Frames for many logical conversations arrive interleaved on one socket;
//! a [`ResponseStream`] reconstructs only the subsequence correlated to its
//! own `request_id`, in arrival order, without blocking other consumers.
//!
//! The demultiplexing protocol, per pull:
//!
//! 1. Drain the session's per-correlation buffer for our id (FIFO) before
//!    touching the shared queue.
//! 2. Otherwise poll the shared inbound queue with a bounded slice, so the
//!    single queue receiver rotates between concurrent waiters.
//! 3. A polled untagged success frame (`command` absent, null, or `"ok"`)
//!    is delivered one-shot to an un-correlated stream; every other frame
//!    is filed into the buffer keyed by the frame's own `request_id`.
//!
//! The sequence is lazy, unbounded, and non-restartable. Dropping the
//! stream discards its buffer entry. A stream on a torn-down session ends
//! (`None`) once its buffer and the queue are drained; a stream on a
//! session whose router stopped without teardown yields an error after one
//! poll slice instead of hanging.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::session::{InboundPoll, Session};
use crate::error::{Error, Result};

/// Lazily-produced sequence of response frames for one logical request.
pub struct ResponseStream {
    session: Arc<Session>,
    request_id: Option<String>,
    done: bool,
}

impl ResponseStream {
    pub(crate) fn new(session: Arc<Session>, request_id: Option<String>) -> Self {
        Self {
            session,
            request_id,
            done: false,
        }
    }

    /// The correlation id this stream pulls for, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Pulls the next correlated frame.
    ///
    /// Returns `None` once the stream is exhausted: after the one-shot
    /// delivery for an un-correlated stream, or when the session is torn
    /// down and nothing buffered remains.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        if self.done {
            return None;
        }

        loop {
            if let Some(id) = &self.request_id {
                if let Some(frame) = self.session.pop_buffered(id) {
                    self.session.reset_idle_timer();
                    return Some(Ok(frame));
                }
            }

            match self.session.poll_inbound().await {
                InboundPoll::Frame(frame) => {
                    if self.request_id.is_none() && is_untagged_success(&frame) {
                        // One-shot contract for untagged requests.
                        self.done = true;
                        self.session.reset_idle_timer();
                        return Some(Ok(frame));
                    }
                    match frame_request_id(&frame).map(str::to_owned) {
                        Some(id) => self.session.push_buffered(&id, frame),
                        None => {
                            debug!("dropping frame with no correlation id and no waiter");
                        }
                    }
                }
                InboundPoll::TimedOut => {
                    if !self.session.is_receiving() {
                        self.done = true;
                        return Some(Err(Error::Request(
                            "session receiver is not running".into(),
                        )));
                    }
                }
                InboundPoll::Closed => {
                    // Another consumer may have classified frames for us
                    // while we were waiting on the queue.
                    if let Some(id) = &self.request_id {
                        if let Some(frame) = self.session.pop_buffered(id) {
                            return Some(Ok(frame));
                        }
                    }
                    self.done = true;
                    return None;
                }
            }
        }
    }

    /// Adapts this stream to [`futures_util::Stream`].
    pub fn into_stream(self) -> impl futures_util::Stream<Item = Result<Value>> {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if let Some(id) = &self.request_id {
            self.session.discard_buffer(id);
        }
    }
}

/// Whether a frame is an untagged success: `command` absent, `null`, or the
/// literal `"ok"`.
fn is_untagged_success(frame: &Value) -> bool {
    match frame.get("command") {
        None | Some(Value::Null) => true,
        Some(Value::String(command)) => command == "ok",
        Some(_) => false,
    }
}

/// The frame's own correlation id, when present.
fn frame_request_id(frame: &Value) -> Option<&str> {
    frame.get("request_id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_success_when_command_is_absent() {
        assert!(is_untagged_success(&json!({"payload": 1})));
    }

    #[test]
    fn untagged_success_when_command_is_null_or_ok() {
        assert!(is_untagged_success(&json!({"command": null})));
        assert!(is_untagged_success(&json!({"command": "ok"})));
    }

    #[test]
    fn tagged_when_command_is_anything_else() {
        assert!(!is_untagged_success(&json!({"command": "neo_error"})));
        assert!(!is_untagged_success(&json!({"command": 3})));
    }

    #[test]
    fn correlation_id_is_read_from_the_frame() {
        assert_eq!(
            frame_request_id(&json!({"request_id": "r1", "command": "reply"})),
            Some("r1")
        );
        assert_eq!(frame_request_id(&json!({"command": "reply"})), None);
        // Non-string ids are not correlation keys.
        assert_eq!(frame_request_id(&json!({"request_id": 7})), None);
    }
}
