//! The session engine: JSON-RPC lifecycle over one transport.
//!
//! A session owns the handshake, the correlation table, timeout and
//! cancellation handling, and shutdown. Reads, writes, and waiter
//! resolution interleave cooperatively on the session's tasks; the only
//! externally triggered event is transport closure, which tears down every
//! outstanding waiter exactly once.
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex};

use lsprobe_wire::{encode, Direction, FrameDecoder, Message, RequestId};

use crate::capabilities::{ClientIdentity, NegotiatedCapabilities};
use crate::capture::{DiagnosticCapture, WindowMessageLog};
use crate::correlate::{CorrelationTable, Outcome};
use crate::error::SessionError;
use crate::transport::{ServerConfig, Transport};

/// JSON-RPC error code a server returns when it honors `$/cancelRequest`.
pub const REQUEST_CANCELLED: i64 = -32800;

/// Default timeout for the initialize and shutdown requests.
const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A message observed by the session's tap, tagged with its direction.
pub type TapEvent = (Direction, Message);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created, transport not yet started.
    Unstarted = 0,
    /// Initialize request sent, awaiting the server's response.
    Initializing = 1,
    /// Server capabilities recorded; initialized not yet announced.
    Negotiated = 2,
    /// Open for arbitrary requests and notifications.
    Active = 3,
    /// Shutdown request sent; in-flight requests may still complete.
    ShuttingDown = 4,
    /// Conversation over; nothing further may be written.
    Closed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> SessionState {
        match value {
            0 => SessionState::Unstarted,
            1 => SessionState::Initializing,
            2 => SessionState::Negotiated,
            3 => SessionState::Active,
            4 => SessionState::ShuttingDown,
            _ => SessionState::Closed,
        }
    }
}

/// Lock-free state cell shared with the reader task.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: SessionState) -> SessionState {
        SessionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

/// Identifier tying recorded events and log lines to one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Wrap an explicit identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique identifier.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let count = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("session-{}-{}", millis, count))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live JSON-RPC session with a language server under test.
pub struct Session {
    id: SessionId,
    identity: ClientIdentity,
    root_uri: Option<String>,
    lifecycle_timeout: Duration,
    state: Arc<StateCell>,
    transport_failed: Arc<AtomicBool>,
    table: Arc<Mutex<CorrelationTable>>,
    negotiated: Arc<Mutex<Option<NegotiatedCapabilities>>>,
    diagnostics: Arc<Mutex<DiagnosticCapture>>,
    window_messages: Arc<Mutex<WindowMessageLog>>,
    tap: Arc<Mutex<Option<mpsc::UnboundedSender<TapEvent>>>>,
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    child: Option<Child>,
    next_id: AtomicI64,
}

impl Session {
    /// Create a session for the given client identity.
    pub fn new(identity: ClientIdentity) -> Self {
        Self::with_id(SessionId::generate(), identity)
    }

    /// Create a session with an explicit identifier.
    pub fn with_id(id: SessionId, identity: ClientIdentity) -> Self {
        Self {
            id,
            identity,
            root_uri: None,
            lifecycle_timeout: LIFECYCLE_TIMEOUT,
            state: Arc::new(StateCell::new(SessionState::Unstarted)),
            transport_failed: Arc::new(AtomicBool::new(false)),
            table: Arc::new(Mutex::new(CorrelationTable::new())),
            negotiated: Arc::new(Mutex::new(None)),
            diagnostics: Arc::new(Mutex::new(DiagnosticCapture::new())),
            window_messages: Arc::new(Mutex::new(WindowMessageLog::new())),
            tap: Arc::new(Mutex::new(None)),
            writer_tx: None,
            child: None,
            next_id: AtomicI64::new(1),
        }
    }

    /// Set the workspace root advertised at initialize.
    pub fn root_uri(mut self, uri: impl Into<String>) -> Self {
        self.root_uri = Some(uri.into());
        self
    }

    /// Override the timeout used for initialize and shutdown.
    pub fn lifecycle_timeout(mut self, timeout: Duration) -> Self {
        self.lifecycle_timeout = timeout;
        self
    }

    /// The session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// The negotiated capability sets, once the handshake completed.
    pub async fn capabilities(&self) -> Option<NegotiatedCapabilities> {
        self.negotiated.lock().await.clone()
    }

    /// Shared handle to captured diagnostics.
    pub fn diagnostics(&self) -> Arc<Mutex<DiagnosticCapture>> {
        self.diagnostics.clone()
    }

    /// Shared handle to captured window/log messages.
    pub fn window_messages(&self) -> Arc<Mutex<WindowMessageLog>> {
        self.window_messages.clone()
    }

    /// Tap every message this session sends or receives.
    ///
    /// The tap is a pure observer: it never delays or mutates the protocol
    /// stream. Call before `start` so the handshake itself is observed.
    pub async fn message_tap(&self) -> mpsc::UnboundedReceiver<TapEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tap.lock().await = Some(tx);
        rx
    }

    /// Register a handler for an inbound notification or server request.
    ///
    /// Methods without a handler are logged and ignored, never fatal.
    pub async fn on_notification<F>(&self, method: &str, handler: F)
    where
        F: Fn(&str, &serde_json::Value) + Send + Sync + 'static,
    {
        self.table.lock().await.set_handler(method, Box::new(handler));
    }

    /// Spawn a server process and run the session over its stdio pipes.
    pub async fn start_stdio(&mut self, config: &ServerConfig) -> Result<(), SessionError> {
        if self.root_uri.is_none() {
            self.root_uri = config.root_uri.clone();
        }
        let transport = Transport::spawn(config)?;
        self.start(transport).await
    }

    /// Connect to a server over TCP and run the session.
    pub async fn start_tcp(&mut self, addr: &str) -> Result<(), SessionError> {
        let transport = Transport::connect(addr).await?;
        self.start(transport).await
    }

    /// Run the session over an already-connected transport.
    ///
    /// Performs the initialize handshake and the initialized announcement;
    /// on success the session is `Active`.
    pub async fn start(&mut self, transport: Transport) -> Result<(), SessionError> {
        if self.state.get() != SessionState::Unstarted {
            return Err(SessionError::SessionClosing);
        }
        self.state.set(SessionState::Initializing);

        let (reader, writer, child) = transport.into_parts();
        self.child = child;

        // Writer task: serialized frames out. A write failure is transport
        // failure like any other: it lands the session in Closed and fails
        // every waiter, even while the read half is still open.
        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        let writer_session = self.id.clone();
        let writer_state = self.state.clone();
        let writer_failed = self.transport_failed.clone();
        let writer_table = self.table.clone();
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(bytes) = writer_rx.recv().await {
                if writer.write_all(&bytes).await.is_err() || writer.flush().await.is_err() {
                    let prior = writer_state.set(SessionState::Closed);
                    if prior != SessionState::Closed && prior != SessionState::ShuttingDown {
                        writer_failed.store(true, Ordering::Release);
                        tracing::error!(session = %writer_session, "transport write failed");
                    }
                    writer_table.lock().await.fail_all();
                    break;
                }
            }
        });
        self.writer_tx = Some(writer_tx);

        // Reader task: decode frames, feed the tap and captures, dispatch.
        let session_id = self.id.clone();
        let state = self.state.clone();
        let transport_failed = self.transport_failed.clone();
        let table = self.table.clone();
        let tap = self.tap.clone();
        let diagnostics = self.diagnostics.clone();
        let window_messages = self.window_messages.clone();
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new(reader);
            loop {
                match decoder.read_frame().await {
                    Ok(Some(message)) => {
                        if let Some(tx) = tap.lock().await.as_ref() {
                            let _ = tx.send((Direction::Received, message.clone()));
                        }
                        if let Message::Notification { method, params } = &message {
                            match method.as_str() {
                                "textDocument/publishDiagnostics" => {
                                    if let (Some(uri), Some(diags)) =
                                        (params["uri"].as_str(), params["diagnostics"].as_array())
                                    {
                                        diagnostics
                                            .lock()
                                            .await
                                            .publish(uri.to_string(), diags.clone());
                                    }
                                }
                                "window/logMessage" | "window/showMessage" => {
                                    window_messages.lock().await.record(method, params);
                                }
                                _ => {}
                            }
                        }
                        table.lock().await.dispatch(message);
                    }
                    Ok(None) => break,
                    Err(e) if e.is_recoverable() => {
                        tracing::warn!(session = %session_id, "skipping bad frame: {}", e);
                    }
                    Err(e) => {
                        tracing::error!(session = %session_id, "transport read failed: {}", e);
                        break;
                    }
                }
            }
            // Transport gone. Land in Closed and fail every waiter once.
            let prior = state.set(SessionState::Closed);
            if prior != SessionState::Closed && prior != SessionState::ShuttingDown {
                transport_failed.store(true, Ordering::Release);
                tracing::error!(session = %session_id, "transport closed unexpectedly");
            }
            table.lock().await.fail_all();
        });

        match self.handshake().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state.set(SessionState::Closed);
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        let params = serde_json::json!({
            "processId": std::process::id(),
            "clientInfo": {
                "name": self.identity.name,
                "version": self.identity.version,
            },
            "rootUri": self.root_uri,
            "capabilities": self.identity.capabilities,
        });

        let id = self.fresh_id();
        let result = self
            .request_inner(id, "initialize", params, self.lifecycle_timeout)
            .await
            .map_err(|e| match e {
                SessionError::Rpc { message, .. } => SessionError::HandshakeFailed(message),
                other => other,
            })?;

        // The server's advertised set is stored verbatim, never interpreted.
        let server = result.get("capabilities").cloned().unwrap_or_default();
        *self.negotiated.lock().await = Some(NegotiatedCapabilities {
            client: self.identity.capabilities.clone(),
            server,
        });
        self.state.set(SessionState::Negotiated);

        self.notify_inner("initialized", serde_json::json!({})).await?;
        self.state.set(SessionState::Active);
        Ok(())
    }

    /// Send a request and wait for its correlated response.
    ///
    /// Allocates a fresh id. Many requests may be outstanding at once;
    /// responses are matched by id, never by arrival order. On timeout the
    /// waiter is removed and a late response is discarded with a warning.
    pub async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, SessionError> {
        self.ensure_open_for_requests()?;
        let id = self.fresh_id();
        self.request_inner(id, method, params, timeout).await
    }

    /// Send a request under a caller-chosen correlation id.
    ///
    /// Useful when the caller needs the id up front, e.g. to cancel the
    /// request while it is in flight.
    pub async fn send_request_with_id(
        &self,
        id: RequestId,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, SessionError> {
        self.ensure_open_for_requests()?;
        self.request_inner(id, method, params, timeout).await
    }

    /// Send a notification; fire-and-forget, no waiter.
    pub async fn send_notification(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), SessionError> {
        self.ensure_open_for_notifications()?;
        self.notify_inner(method, params).await
    }

    /// Ask the server to cancel an in-flight request.
    ///
    /// Cancellation is advisory: the original `send_request` call remains
    /// the sole source of truth for the outcome. It resolves with a normal
    /// response, or with `Cancelled` if the server honors the cancellation.
    pub async fn cancel_request(&self, id: &RequestId) -> Result<(), SessionError> {
        self.ensure_open_for_notifications()?;
        self.notify_inner("$/cancelRequest", serde_json::json!({"id": id.to_value()}))
            .await
    }

    /// Shut the session down: shutdown request, exit notification, teardown.
    ///
    /// Idempotent; safe to call from test teardown regardless of how the
    /// session ended.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Unstarted => {
                self.state.set(SessionState::Closed);
                return Ok(());
            }
            SessionState::Closed => {
                self.teardown().await;
                return Ok(());
            }
            _ => {}
        }

        // From here on, new requests fail with SessionClosing while
        // in-flight ones may still complete.
        self.state.set(SessionState::ShuttingDown);

        let id = self.fresh_id();
        match self
            .request_inner(id, "shutdown", serde_json::Value::Null, self.lifecycle_timeout)
            .await
        {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session = %self.id, "shutdown request failed: {}", e);
            }
        }
        if let Err(e) = self.notify_inner("exit", serde_json::Value::Null).await {
            tracing::debug!(session = %self.id, "exit notification not sent: {}", e);
        }

        self.state.set(SessionState::Closed);
        self.teardown().await;
        Ok(())
    }

    fn fresh_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn closed_error(&self) -> SessionError {
        if self.transport_failed.load(Ordering::Acquire) {
            SessionError::TransportClosed
        } else {
            SessionError::SessionClosing
        }
    }

    fn ensure_open_for_requests(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(self.closed_error()),
            // Requests are only legal once the handshake made the session
            // Active; everything else counts as "not accepting requests".
            _ => Err(SessionError::SessionClosing),
        }
    }

    fn ensure_open_for_notifications(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Active | SessionState::ShuttingDown => Ok(()),
            SessionState::Closed => Err(self.closed_error()),
            _ => Err(SessionError::SessionClosing),
        }
    }

    async fn request_inner(
        &self,
        id: RequestId,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, SessionError> {
        let rx = self.table.lock().await.register(id.clone());
        let message = Message::Request {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.write_message(&message).await {
            self.table.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                // Give up the waiter; a late response for this id will be
                // discarded by the correlation table with a warning.
                self.table.lock().await.remove(&id);
                Err(SessionError::RequestTimeout(timeout.as_millis() as u64))
            }
            // The waiter was dropped wholesale: transport teardown.
            Ok(Err(_)) => Err(SessionError::TransportClosed),
            Ok(Ok(Outcome::Result(value))) => Ok(value),
            Ok(Ok(Outcome::Error(err))) if err.code == REQUEST_CANCELLED => {
                Err(SessionError::Cancelled)
            }
            Ok(Ok(Outcome::Error(err))) => Err(SessionError::Rpc {
                code: err.code,
                message: err.message,
            }),
        }
    }

    async fn notify_inner(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), SessionError> {
        let message = Message::notification(method, params);
        self.write_message(&message).await
    }

    async fn write_message(&self, message: &Message) -> Result<(), SessionError> {
        if self.state.get() == SessionState::Closed {
            return Err(self.closed_error());
        }
        let writer_tx = self
            .writer_tx
            .as_ref()
            .ok_or(SessionError::TransportClosed)?;

        if let Some(tx) = self.tap.lock().await.as_ref() {
            let _ = tx.send((Direction::Sent, message.clone()));
        }

        writer_tx
            .send(encode(message))
            .await
            .map_err(|_| SessionError::TransportClosed)
    }

    async fn teardown(&mut self) {
        // Dropping the writer channel ends the writer task; no further
        // writes can reach the transport.
        self.writer_tx = None;

        // The spawned server is an owned resource: reap it, escalating to
        // kill if it ignores the exit notification.
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(session = %self.id, "server ignored exit; killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        self.table.lock().await.fail_all();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("client", &self.identity.name)
            .field("state", &self.state.get())
            .finish()
    }
}
