//! Connection health monitoring.
//!
//! A periodic task per connection that keeps the session alive, unsticks
//! flow control when a response never arrives, and drops connections that
//! have gone silent.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::connection::{Connection, DisconnectReason};
use crate::flow::FlowController;
use crate::message::{self, ParamQuery, SYSTEM_QUERY_OBJNAM, command};

/// Idle time after which a debug note is logged on every check.
const IDLE_NOTICE_AFTER: Duration = Duration::from_secs(60);

/// Timing knobs for the health monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// How often checks run. Default: 30s.
    pub check_interval: Duration,
    /// Send a keepalive query when none was sent for this long. Default: 90s.
    pub keepalive_interval: Duration,
    /// Requests outstanding with no flow activity for this long are
    /// considered lost. Default: 45s.
    pub flow_control_timeout: Duration,
    /// Close the connection when nothing was received for this long.
    /// Default: 300s.
    pub idle_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(90),
            flow_control_timeout: Duration::from_secs(45),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// What a single check decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Flow control was reset; holds the number of queued requests dropped.
    pub flow_reset: Option<usize>,
    /// The connection should be closed; holds how long it has been idle.
    pub idle_for: Option<Duration>,
    /// A keepalive should be sent now.
    pub send_keepalive: bool,
}

/// Health check state that outlives a single tick.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    last_keepalive: Instant,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            last_keepalive: Instant::now(),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Run one check against the flow controller.
    ///
    /// Resets `flow` in place when it is stalled. An idle connection takes
    /// precedence over the keepalive: nothing is sent on a connection that
    /// is about to be closed.
    pub fn tick(
        &mut self,
        now: Instant,
        flow: &mut FlowController,
        last_received: Instant,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if flow.is_stalled(now, self.config.flow_control_timeout) {
            let in_flight = flow.in_flight();
            let dropped = flow.reset();
            tracing::warn!(
                in_flight,
                dropped,
                timeout_secs = self.config.flow_control_timeout.as_secs(),
                "flow control stalled, resetting"
            );
            outcome.flow_reset = Some(dropped);
        }

        let idle_for = now.saturating_duration_since(last_received);
        if idle_for > self.config.idle_timeout {
            outcome.idle_for = Some(idle_for);
            return outcome;
        }
        if idle_for > IDLE_NOTICE_AFTER {
            tracing::debug!(idle_secs = idle_for.as_secs(), "no data received recently");
        }

        if now.saturating_duration_since(self.last_keepalive) >= self.config.keepalive_interval {
            self.last_keepalive = now;
            outcome.send_keepalive = true;
        }

        outcome
    }
}

/// Read-only query for the system object's mode, used as a keepalive.
pub fn keepalive_payload() -> serde_json::Map<String, serde_json::Value> {
    message::get_param_list(
        "",
        &[ParamQuery {
            objnam: SYSTEM_QUERY_OBJNAM.into(),
            keys: vec!["MODE".into()],
        }],
    )
}

/// Health loop for one connection. Exits when the connection closes.
pub(crate) async fn run(conn: Connection, config: HealthConfig) {
    let cancel = conn.cancel_token();
    let period = config.check_interval;
    let mut monitor = HealthMonitor::new(config);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if conn.is_closed() {
            break;
        }

        let now = Instant::now();
        let outcome = {
            let mut flow = conn.flow().lock().await;
            monitor.tick(now, &mut flow, conn.last_received())
        };

        if let Some(dropped) = outcome.flow_reset {
            conn.record_dropped(dropped);
        }

        if let Some(idle_for) = outcome.idle_for {
            tracing::warn!(
                peer = %conn.peer(),
                idle_secs = idle_for.as_secs(),
                "connection idle, closing"
            );
            conn.close(DisconnectReason::IdleTimeout { idle_for });
            break;
        }

        if outcome.send_keepalive {
            if let Err(e) = conn
                .send_command(command::GET_PARAM_LIST, keepalive_payload())
                .await
            {
                tracing::debug!(error = %e, "keepalive send failed");
            }
        }
    }

    tracing::debug!(peer = %conn.peer(), "health monitor exiting");
}

// ── Tests ────────────────────────────────────────────────────────────
