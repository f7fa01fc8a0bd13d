//! Correlation table: outstanding requests and inbound dispatch.
//!
//! Each outstanding request is a single-resolution oneshot waiter keyed by
//! its correlation id. Responses resolve the waiter at most once; inbound
//! notifications and server-initiated requests go to per-method handlers.
use std::collections::HashMap;

use tokio::sync::oneshot;

use lsprobe_wire::{Message, RequestId, RpcError};

/// Handler invoked for an inbound notification or server request.
pub type InboundHandler = Box<dyn Fn(&str, &serde_json::Value) + Send + Sync>;

/// What a resolved waiter receives.
#[derive(Debug)]
pub enum Outcome {
    /// Successful response with the result value.
    Result(serde_json::Value),
    /// Error response from the server.
    Error(RpcError),
}

/// Tracks in-flight requests and routes inbound messages.
pub struct CorrelationTable {
    /// Outstanding correlation ids and their waiters.
    pending: HashMap<RequestId, oneshot::Sender<Outcome>>,
    /// Per-method handlers for inbound notifications and server requests.
    handlers: HashMap<String, InboundHandler>,
}

impl CorrelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a waiter for `id` and return the receiving end.
    pub fn register(&mut self, id: RequestId) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        if self.pending.insert(id.clone(), tx).is_some() {
            // Caller-chosen ids must be unique among in-flight requests.
            tracing::warn!(%id, "replaced waiter for duplicate in-flight request id");
        }
        rx
    }

    /// Remove the waiter for `id`, if still outstanding. Used on timeout.
    pub fn remove(&mut self, id: &RequestId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// How many requests are outstanding.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Register a handler for an inbound method.
    pub fn set_handler(&mut self, method: impl Into<String>, handler: InboundHandler) {
        self.handlers.insert(method.into(), handler);
    }

    /// Route an inbound message.
    ///
    /// - A response resolves its waiter; a response for an unknown or
    ///   already-resolved id is discarded with a warning (never delivered
    ///   twice, never fatal).
    /// - Notifications and server requests go to the matching handler;
    ///   unhandled methods are logged and ignored.
    pub fn dispatch(&mut self, message: Message) {
        match message {
            Message::Response { id, result, error } => {
                let Some(sender) = self.pending.remove(&id) else {
                    tracing::warn!(%id, "discarding response for unknown or timed-out request");
                    return;
                };
                let outcome = match error {
                    Some(err) => Outcome::Error(err),
                    None => Outcome::Result(result.unwrap_or(serde_json::Value::Null)),
                };
                // The waiter may have given up; a dropped receiver is fine.
                let _ = sender.send(outcome);
            }
            Message::Notification { method, params } => {
                if let Some(handler) = self.handlers.get(&method) {
                    handler(&method, &params);
                } else {
                    tracing::debug!(%method, "unhandled notification");
                }
            }
            Message::Request { method, params, id } => {
                if let Some(handler) = self.handlers.get(&method) {
                    handler(&method, &params);
                } else {
                    tracing::debug!(%method, %id, "unhandled server request");
                }
            }
        }
    }

    /// Drop every outstanding waiter.
    ///
    /// Each dropped sender fails its receiver exactly once, which the
    /// session surfaces as `TransportClosed`.
    pub fn fail_all(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                count = self.pending.len(),
                "failing all outstanding requests"
            );
        }
        self.pending.clear();
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.pending.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_resolve() {
        let mut table = CorrelationTable::new();
        let rx = table.register(RequestId::Number(1));
        assert_eq!(table.pending_count(), 1);

        table.dispatch(Message::response(1, serde_json::json!({"key": "value"})));
        assert_eq!(table.pending_count(), 0);

        match rx.await.unwrap() {
            Outcome::Result(val) => assert_eq!(val["key"], "value"),
            Outcome::Error(_) => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn resolve_error_outcome() {
        let mut table = CorrelationTable::new();
        let rx = table.register(RequestId::Number(1));

        table.dispatch(Message::error_response(1, -32600, "invalid request"));
        match rx.await.unwrap() {
            Outcome::Error(err) => {
                assert_eq!(err.code, -32600);
                assert_eq!(err.message, "invalid request");
            }
            Outcome::Result(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn string_ids_correlate() {
        let mut table = CorrelationTable::new();
        let rx = table.register(RequestId::Text("req-a".into()));
        table.dispatch(Message::response("req-a", serde_json::json!(1)));
        match rx.await.unwrap() {
            Outcome::Result(val) => assert_eq!(val, 1),
            Outcome::Error(_) => panic!("expected success"),
        }
    }

    #[test]
    fn unknown_id_discarded() {
        let mut table = CorrelationTable::new();
        // Must not panic, must not create a waiter.
        table.dispatch(Message::response(999, serde_json::Value::Null));
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn second_response_for_same_id_discarded() {
        let mut table = CorrelationTable::new();
        let rx = table.register(RequestId::Number(5));

        table.dispatch(Message::response(5, serde_json::json!("first")));
        // The second response finds no waiter; it is dropped, not re-delivered.
        table.dispatch(Message::response(5, serde_json::json!("second")));

        match rx.await.unwrap() {
            Outcome::Result(val) => assert_eq!(val, "first"),
            Outcome::Error(_) => panic!("expected success"),
        }
    }

    #[test]
    fn notification_routed_to_handler() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut table = CorrelationTable::new();
        table.set_handler(
            "textDocument/publishDiagnostics",
            Box::new(move |method, params| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((method.to_string(), params.clone()));
            }),
        );

        table.dispatch(Message::notification(
            "textDocument/publishDiagnostics",
            serde_json::json!({"uri": "file:///t.rs"}),
        ));

        let captured = seen.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0, "textDocument/publishDiagnostics");
    }

    #[test]
    fn unhandled_notification_ignored() {
        let mut table = CorrelationTable::new();
        table.dispatch(Message::notification("$/progress", serde_json::json!({})));
    }

    #[test]
    fn server_request_routed_or_ignored() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(0usize));
        let seen_clone = seen.clone();

        let mut table = CorrelationTable::new();
        table.set_handler(
            "workspace/configuration",
            Box::new(move |_, _| {
                *seen_clone.lock().unwrap() += 1;
            }),
        );

        table.dispatch(Message::request(9, "workspace/configuration", serde_json::json!({})));
        table.dispatch(Message::request(10, "window/showMessageRequest", serde_json::json!({})));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_prevents_delivery() {
        let mut table = CorrelationTable::new();
        let rx = table.register(RequestId::Number(3));
        assert!(table.remove(&RequestId::Number(3)));
        assert!(!table.remove(&RequestId::Number(3)));

        table.dispatch(Message::response(3, serde_json::json!("late")));
        // The sender was dropped on remove, so the receiver errors.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn fail_all_errors_every_waiter() {
        let mut table = CorrelationTable::new();
        let rx1 = table.register(RequestId::Number(1));
        let rx2 = table.register(RequestId::Text("two".into()));
        table.fail_all();
        assert_eq!(table.pending_count(), 0);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[tokio::test]
    async fn out_of_order_resolution() {
        let mut table = CorrelationTable::new();
        let rx1 = table.register(RequestId::Number(1));
        let rx2 = table.register(RequestId::Number(2));
        let rx3 = table.register(RequestId::Number(3));

        table.dispatch(Message::response(3, serde_json::json!("third")));
        table.dispatch(Message::response(1, serde_json::json!("first")));
        table.dispatch(Message::response(2, serde_json::json!("second")));

        match rx1.await.unwrap() {
            Outcome::Result(val) => assert_eq!(val, "first"),
            _ => panic!("expected success"),
        }
        match rx2.await.unwrap() {
            Outcome::Result(val) => assert_eq!(val, "second"),
            _ => panic!("expected success"),
        }
        match rx3.await.unwrap() {
            Outcome::Result(val) => assert_eq!(val, "third"),
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic() {
        let mut table = CorrelationTable::new();
        let rx = table.register(RequestId::Number(1));
        drop(rx);
        table.dispatch(Message::response(1, serde_json::Value::Null));
    }

    #[test]
    fn table_debug() {
        let table = CorrelationTable::new();
        let debug = format!("{:?}", table);
        assert!(debug.contains("CorrelationTable"));
    }
}
