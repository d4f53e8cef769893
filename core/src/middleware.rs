//! Response middleware: notifications and envelope unwrapping.
//!
//! # Design
//! [`Notifying`] wraps any inner [`Service`] and runs the same three steps
//! for every response, with no per-endpoint opt-out:
//!
//! 1. On error, emit one error notification (`"Error: <text>"`, see
//!    [`ApiError::notification_text`]) and return the error unchanged.
//! 2. On success of a non-GET request whose payload carries a `message`,
//!    emit one success notification with that message.
//! 3. Unwrap a `{ "data": X }` envelope to `X`; other payloads pass through.
//!
//! Notifications are fire-and-forget. A panicking notifier is contained so it
//! can never turn a successful response into a failure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::transport::Service;

/// A user-facing toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Error(String),
}

/// Surface for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Logs notifications instead of displaying them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Success(message) => tracing::info!(%message, "success"),
            Notification::Error(message) => tracing::warn!(%message, "error"),
        }
    }
}

/// Forwards notifications to a UI task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // Receiver may have been dropped
        let _ = self.tx.send(notification);
    }
}

/// Pipeline stage applying the response rules to an inner service.
#[derive(Debug, Clone)]
pub struct Notifying<S, N> {
    inner: S,
    notifier: N,
}

impl<S: Service, N: Notifier> Notifying<S, N> {
    pub fn new(inner: S, notifier: N) -> Self {
        Self { inner, notifier }
    }

    fn emit(&self, notification: Notification) {
        let shown = catch_unwind(AssertUnwindSafe(|| self.notifier.notify(notification)));
        if shown.is_err() {
            tracing::warn!("notifier panicked; notification dropped");
        }
    }

    /// Steps 1 to 3 applied to one outcome.
    pub fn process(&self, method: HttpMethod, outcome: Result<Value, ApiError>) -> Result<Value, ApiError> {
        match outcome {
            Err(err) => {
                self.emit(Notification::Error(format!("Error: {}", err.notification_text())));
                Err(err)
            }
            Ok(payload) => {
                if let Some(message) = success_message(method, &payload) {
                    self.emit(Notification::Success(message.to_string()));
                }
                Ok(unwrap_envelope(payload))
            }
        }
    }
}

impl<S: Service, N: Notifier> Service for Notifying<S, N> {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<Value, ApiError>> {
        let method = request.method;
        async move {
            let outcome = self.inner.call(request).await;
            self.process(method, outcome)
        }
        .boxed()
    }
}

/// The `message` to show for a successful write, if any.
pub fn success_message(method: HttpMethod, payload: &Value) -> Option<&str> {
    if method.is_read() {
        return None;
    }
    payload
        .as_object()?
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
}

/// Strip one `{ "data": X }` envelope level.
pub fn unwrap_envelope(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        fn notify(&self, notification: Notification) {
            self.0.lock().push(notification);
        }
    }

    struct Panicking;

    impl Notifier for Panicking {
        fn notify(&self, _: Notification) {
            panic!("toast container unmounted");
        }
    }

    /// Inner service returning a fixed outcome.
    struct Fixed(Result<Value, ApiError>);

    impl Service for Fixed {
        fn call(&self, _: HttpRequest) -> BoxFuture<'_, Result<Value, ApiError>> {
            futures::future::ready(self.0.clone()).boxed()
        }
    }

    fn run(
        method: HttpMethod,
        outcome: Result<Value, ApiError>,
    ) -> (Result<Value, ApiError>, Vec<Notification>) {
        let recorder = Arc::new(Recorder::default());
        let stage = Notifying::new(Fixed(outcome), recorder.clone());
        let result = futures::executor::block_on(stage.call(HttpRequest::new(method, "x")));
        let seen = recorder.0.lock().clone();
        (result, seen)
    }

    #[test]
    fn write_with_message_emits_one_success() {
        let (result, seen) = run(HttpMethod::Delete, Ok(json!({ "message": "deleted" })));
        assert_eq!(seen, vec![Notification::Success("deleted".into())]);
        assert_eq!(result.unwrap(), json!({ "message": "deleted" }));
    }

    #[test]
    fn read_with_message_emits_nothing() {
        let (result, seen) = run(
            HttpMethod::Get,
            Ok(json!({ "message": "Courses retrieved", "data": [1] })),
        );
        assert!(seen.is_empty());
        assert_eq!(result.unwrap(), json!([1]));
    }

    #[test]
    fn write_without_message_emits_nothing() {
        let (_, seen) = run(HttpMethod::Post, Ok(json!({ "data": { "id": 1 } })));
        assert!(seen.is_empty());
    }

    #[test]
    fn errors_emit_one_notification_with_precedence() {
        let (result, seen) = run(
            HttpMethod::Put,
            Err(ApiError::Status {
                status: 400,
                body: Some(json!({ "message": "Invalid sections" })),
            }),
        );
        assert_eq!(seen, vec![Notification::Error("Error: Invalid sections".into())]);
        assert!(matches!(result, Err(ApiError::Status { status: 400, .. })));

        let (_, seen) = run(HttpMethod::Get, Err(ApiError::Status { status: 500, body: None }));
        assert_eq!(seen, vec![Notification::Error("Error: 500".into())]);

        let (_, seen) = run(HttpMethod::Get, Err(ApiError::Transport("refused".into())));
        assert_eq!(seen, vec![Notification::Error("Error: An error occurred".into())]);
    }

    #[test]
    fn envelope_unwraps_one_level() {
        assert_eq!(
            unwrap_envelope(json!({ "data": { "data": 1 }, "message": "ok" })),
            json!({ "data": 1 })
        );
        assert_eq!(unwrap_envelope(json!({ "data": null })), Value::Null);
        assert_eq!(unwrap_envelope(json!({ "id": "c1" })), json!({ "id": "c1" }));
        assert_eq!(unwrap_envelope(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn panicking_notifier_does_not_fail_request() {
        let stage = Notifying::new(Fixed(Ok(json!({ "message": "saved", "data": 7 }))), Panicking);
        let result = futures::executor::block_on(stage.call(HttpRequest::new(HttpMethod::Put, "x")));
        assert_eq!(result.unwrap(), json!(7));
    }

    #[test]
    fn channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notification::Success("ignored".into()));
    }
}
