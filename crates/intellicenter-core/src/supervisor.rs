// ── Reconnect supervisor ──
//
// Keeps a controller session alive: reconnects with exponential backoff
// after the connection drops and forwards lifecycle notifications to an
// application handler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use intellicenter_api::DisconnectReason;

use crate::config::ReconnectConfig;
use crate::controller::{Controller, ControllerEvent};
use crate::error::CoreError;
use crate::model::ModelChanges;

// ── LifecycleHandler ─────────────────────────────────────────────

/// Application callbacks driven by the supervisor.
///
/// All methods default to no-ops. They run on the supervisor task, so
/// long-running work should be handed off rather than done inline.
pub trait LifecycleHandler: Send + Sync + 'static {
    /// The first connection succeeded.
    fn on_started(&self, _controller: &Controller) {}

    /// A connection was re-established after a disconnect.
    fn on_reconnected(&self, _controller: &Controller) {}

    /// The connection dropped; called once per lost session.
    fn on_disconnected(&self, _controller: &Controller, _reason: &DisconnectReason) {}

    /// The model changed; `changes` holds exactly the changed attributes.
    fn on_model_updated(&self, _controller: &Controller, _changes: &ModelChanges) {}
}

/// Handler that ignores every notification.
pub struct NoopHandler;

impl LifecycleHandler for NoopHandler {}

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

// ── Supervisor ───────────────────────────────────────────────────

/// Owns a [`Controller`] and keeps it connected.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    controller: Controller,
    handler: Arc<dyn LifecycleHandler>,
    state: watch::Sender<ConnectionState>,
    cancel: Mutex<CancellationToken>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(controller: Controller) -> Self {
        Self::with_handler(controller, NoopHandler)
    }

    pub fn with_handler(controller: Controller, handler: impl LifecycleHandler) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SupervisorInner {
                controller,
                handler: Arc::new(handler),
                state,
                cancel: Mutex::new(CancellationToken::new()),
                task: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.inner.controller
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Connect once, then supervise the session in the background.
    ///
    /// The first connection attempt is not retried: its error is returned
    /// to the caller. Once started, later disconnects are retried per the
    /// controller's [`ReconnectConfig`].
    pub async fn start(&self) -> Result<(), CoreError> {
        self.stop().await;

        let controller = &self.inner.controller;
        let events = controller.events();

        self.inner.state.send_replace(ConnectionState::Connecting);
        if let Err(e) = controller.connect().await {
            self.inner.state.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }
        self.inner.state.send_replace(ConnectionState::Connected);
        self.inner.handler.on_started(controller);

        let cancel = CancellationToken::new();
        *lock(&self.inner.cancel) = cancel.clone();
        let handle = tokio::spawn(supervise(Arc::clone(&self.inner), events, cancel));
        *self.inner.task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop supervising and close the connection. Cancels any pending
    /// reconnect wait.
    pub async fn stop(&self) {
        lock(&self.inner.cancel).cancel();

        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.inner.controller.disconnect().await;
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }
}

// ── Background task ──────────────────────────────────────────────

/// Forward model updates until the session drops, then reconnect.
async fn supervise(
    inner: Arc<SupervisorInner>,
    mut events: broadcast::Receiver<ControllerEvent>,
    cancel: CancellationToken,
) {
    let controller = &inner.controller;

    loop {
        let reason = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => {
                match event {
                    Ok(ControllerEvent::Updated(changes)) => {
                        inner.handler.on_model_updated(controller, &changes);
                    }
                    Ok(ControllerEvent::Disconnected(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lifecycle handler fell behind model updates");
                    }
                    Err(RecvError::Closed) => break,
                }
                continue;
            }
            reason = controller.wait_disconnected() => reason,
        };

        info!(reason = %reason, "controller disconnected");
        inner.handler.on_disconnected(controller, &reason);

        if !reconnect(&inner, &cancel).await {
            break;
        }
        inner.handler.on_reconnected(controller);
    }

    debug!("supervisor exiting");
}

/// Retry until connected. Returns `false` when cancelled or out of retries.
async fn reconnect(inner: &SupervisorInner, cancel: &CancellationToken) -> bool {
    let controller = &inner.controller;
    let config = &controller.config().reconnect;
    let mut attempt: u32 = 0;

    loop {
        if let Some(max) = config.max_retries {
            if attempt >= max {
                error!(max_retries = max, "reconnection limit reached, giving up");
                inner.state.send_replace(ConnectionState::Failed);
                return false;
            }
        }

        attempt += 1;
        inner.state.send_replace(ConnectionState::Reconnecting { attempt });
        controller.record_reconnect_attempt();

        let delay = calculate_backoff(attempt - 1, config);
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(delay) => {}
        }

        // Not raced against cancellation: connect() is bounded by its own
        // timeouts, and stop() waits for this task before disconnecting.
        match controller.connect().await {
            Ok(()) => {
                info!(attempt, "reconnected");
                inner.state.send_replace(ConnectionState::Connected);
                return true;
            }
            Err(e) => warn!(error = %e, attempt, "reconnect failed"),
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25%, seeded from the attempt number.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────
