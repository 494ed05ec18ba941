//! TCP connection to an IntelliCenter controller.
//!
//! A [`Connection`] owns one socket and three background tasks:
//!
//! - **writer**: drains the outbound channel into the framed socket;
//! - **reader**: decodes frames, releases flow control on responses,
//!   resolves awaited requests and forwards everything else as
//!   [`ConnectionEvent`]s;
//! - **health**: keepalive, stall recovery and idle detection
//!   (see [`crate::health`]).
//!
//! Closing is idempotent: the first [`Connection::close`] records the
//! reason, cancels every task, fails pending waiters, and emits exactly one
//! [`ConnectionEvent::Closed`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::{DEFAULT_MAX_LINE_LENGTH, FrameCodec};
use crate::error::Error;
use crate::flow::FlowController;
use crate::health::{self, HealthConfig};
use crate::message::{Message, encode_request};

/// TCP port the controller listens on for the JSON protocol.
pub const DEFAULT_PORT: u16 = 6681;

// ── Configuration ────────────────────────────────────────────────────

/// Everything needed to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Upper bound for [`Connection::send_command_and_wait`].
    pub request_timeout: Duration,
    pub max_line_length: usize,
    pub health: HealthConfig,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            health: HealthConfig::default(),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The controller closed the socket.
    Eof,
    /// Read or write failed.
    Io(String),
    /// Nothing was received for the configured idle timeout.
    IdleTimeout { idle_for: Duration },
    /// The controller sent something the protocol does not allow.
    Protocol(String),
    /// Closed locally on request.
    Requested,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => f.write_str("connection closed by peer"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::IdleTimeout { idle_for } => {
                write!(f, "no data received for {}s", idle_for.as_secs())
            }
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Requested => f.write_str("closed on request"),
        }
    }
}

/// Inbound traffic not consumed by an awaited request.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Message(Message),
    /// Always the last event of a connection.
    Closed(DisconnectReason),
}

/// Point-in-time request counters for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetrics {
    pub requests_sent: u64,
    pub requests_completed: u64,
    pub requests_failed: u64,
    pub average_response_time: Option<Duration>,
}

// ── Connection ───────────────────────────────────────────────────────

type Waiter = oneshot::Sender<Result<Message, Error>>;

struct PendingRequest {
    command: String,
    tx: Waiter,
}

struct ConnectionInner {
    peer: String,
    request_timeout: Duration,
    next_id: AtomicU64,
    flow: tokio::sync::Mutex<FlowController>,
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    last_received: Mutex<Instant>,
    close_reason: Mutex<Option<DisconnectReason>>,
    cancel: CancellationToken,
    sent: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Handle to one live (or closed) connection. Cheaply cloneable.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a TCP connection and spawn its reader, writer and health tasks.
    ///
    /// Returns the handle and the receiver for inbound events. Message ids
    /// start at 1 on every connection.
    pub async fn connect(
        config: &ConnectionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>), Error> {
        let addr = config.addr();
        tracing::info!(addr = %addr, "connecting");

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
        .map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, FrameCodec::with_max_length(config.max_line_length));
        let writer = FramedWrite::new(write_half, FrameCodec::with_max_length(config.max_line_length));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let conn = Self {
            inner: Arc::new(ConnectionInner {
                peer: addr,
                request_timeout: config.request_timeout,
                next_id: AtomicU64::new(1),
                flow: tokio::sync::Mutex::new(FlowController::new()),
                outbound: outbound_tx,
                events: event_tx,
                pending: Mutex::new(HashMap::new()),
                last_received: Mutex::new(Instant::now()),
                close_reason: Mutex::new(None),
                cancel: CancellationToken::new(),
                sent: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        };

        tokio::spawn(writer_task(conn.clone(), writer, outbound_rx));
        tokio::spawn(reader_task(conn.clone(), reader));
        tokio::spawn(health::run(conn.clone(), config.health.clone()));

        tracing::info!(peer = %conn.peer(), "connected");
        Ok((conn, event_rx))
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// `true` if both handles refer to the same underlying connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The reason recorded by the first close, if closed.
    pub fn close_reason(&self) -> Option<DisconnectReason> {
        lock(&self.inner.close_reason).clone()
    }

    /// Token cancelled when the connection closes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Queue a command for transmission and return its message id.
    ///
    /// Never waits on the wire: the request goes out when flow control
    /// allows.
    pub async fn send_command(
        &self,
        command: &str,
        payload: Map<String, Value>,
    ) -> Result<String, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let id = self.next_message_id();
        let line = encode_request(&id, command, payload)?;
        self.transmit(line).await?;
        tracing::debug!(message_id = %id, command, "request queued");
        Ok(id)
    }

    /// Send a command and wait for the response echoing its message id.
    ///
    /// Resolves with [`Error::CommandFailed`] for a non-success response
    /// code and [`Error::Timeout`] when no matching response arrives within
    /// the configured request timeout.
    pub async fn send_command_and_wait(
        &self,
        command: &str,
        payload: Map<String, Value>,
    ) -> Result<Message, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let id = self.next_message_id();
        let line = encode_request(&id, command, payload)?;

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(
            id.clone(),
            PendingRequest {
                command: command.to_owned(),
                tx,
            },
        );

        if let Err(e) = self.transmit(line).await {
            lock(&self.inner.pending).remove(&id);
            return Err(e);
        }
        tracing::debug!(message_id = %id, command, "request queued, awaiting response");

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                lock(&self.inner.pending).remove(&id);
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(message_id = %id, command, "request timed out");
                Err(Error::Timeout(self.inner.request_timeout))
            }
        }
    }

    /// Close the connection. Only the first call has any effect.
    ///
    /// Returns `true` if this call closed the connection.
    pub fn close(&self, reason: DisconnectReason) -> bool {
        {
            let mut slot = lock(&self.inner.close_reason);
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.clone());
        }
        self.inner.cancel.cancel();

        let waiters: Vec<PendingRequest> = lock(&self.inner.pending).drain().map(|(_, p)| p).collect();
        for waiter in waiters {
            let _ = waiter.tx.send(Err(Error::Closed));
        }

        tracing::info!(peer = %self.inner.peer, reason = %reason, "connection closed");
        let _ = self.inner.events.send(ConnectionEvent::Closed(reason));
        true
    }

    /// Flow controller shared by the send path, the reader and the health
    /// monitor.
    pub fn flow(&self) -> &tokio::sync::Mutex<FlowController> {
        &self.inner.flow
    }

    /// When the last frame was received.
    pub fn last_received(&self) -> Instant {
        *lock(&self.inner.last_received)
    }

    pub async fn metrics(&self) -> RequestMetrics {
        let average_response_time = self.inner.flow.lock().await.average_response_time();
        RequestMetrics {
            requests_sent: self.inner.sent.load(Ordering::Relaxed),
            requests_completed: self.inner.completed.load(Ordering::Relaxed),
            requests_failed: self.inner.failed.load(Ordering::Relaxed),
            average_response_time,
        }
    }

    pub(crate) fn record_dropped(&self, dropped: usize) {
        let dropped = u64::try_from(dropped).unwrap_or(u64::MAX);
        self.inner.failed.fetch_add(dropped, Ordering::Relaxed);
    }

    fn next_message_id(&self) -> String {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Hand a line to flow control and push it to the writer if allowed.
    ///
    /// The flow lock is held across the channel push so lines reach the
    /// writer in the order flow control released them.
    async fn transmit(&self, line: String) -> Result<(), Error> {
        let mut flow = self.inner.flow.lock().await;
        if let Some(line) = flow.send(line) {
            self.inner.outbound.send(line).map_err(|_| Error::Closed)?;
        }
        self.inner.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn handle_frame(&self, line: &str) -> Result<(), Error> {
        *lock(&self.inner.last_received) = Instant::now();

        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) if e.is_recoverable_message_error() => {
                tracing::warn!(error = %e, "dropping unparseable message");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        tracing::trace!(
            message_id = %msg.message_id,
            command = %msg.command,
            response = ?msg.response,
            "message received"
        );

        if msg.is_response() {
            self.inner.completed.fetch_add(1, Ordering::Relaxed);
            let mut flow = self.inner.flow.lock().await;
            if let Some(next) = flow.response_received() {
                self.inner.outbound.send(next).map_err(|_| Error::Closed)?;
            }
        }

        let waiter = lock(&self.inner.pending).remove(&msg.message_id);
        if let Some(waiter) = waiter {
            let result = if msg.is_response() && !msg.is_success() {
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                Err(Error::CommandFailed {
                    command: waiter.command,
                    code: msg.response.clone().unwrap_or_default(),
                })
            } else {
                Ok(msg)
            };
            let _ = waiter.tx.send(result);
            return Ok(());
        }

        if msg.is_response() && !msg.is_success() {
            self.inner.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                message_id = %msg.message_id,
                command = %msg.command,
                response = ?msg.response,
                "request rejected by controller"
            );
        }

        let _ = self.inner.events.send(ConnectionEvent::Message(msg));
        Ok(())
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Background tasks ─────────────────────────────────────────────────

async fn writer_task(
    conn: Connection,
    mut writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let cancel = conn.cancel_token();
    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            line = outbound.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        tracing::trace!(peer = %conn.peer(), line = %line, "sending");
        if let Err(e) = writer.send(line).await {
            tracing::warn!(error = %e, "write failed");
            conn.close(DisconnectReason::Io(e.to_string()));
            break;
        }
    }
    let _ = writer.close().await;
}

async fn reader_task(conn: Connection, mut reader: FramedRead<OwnedReadHalf, FrameCodec>) {
    let cancel = conn.cancel_token();
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = reader.next() => frame,
        };
        match frame {
            None => {
                conn.close(DisconnectReason::Eof);
                break;
            }
            Some(Err(Error::Io(e))) => {
                conn.close(DisconnectReason::Io(e.to_string()));
                break;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "framing error");
                conn.close(DisconnectReason::Protocol(e.to_string()));
                break;
            }
            Some(Ok(line)) => {
                if let Err(e) = conn.handle_frame(&line).await {
                    tracing::error!(error = %e, "protocol violation, closing connection");
                    conn.close(DisconnectReason::Protocol(e.to_string()));
                    break;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
