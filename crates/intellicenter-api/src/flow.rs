//! One-outstanding-request flow control.
//!
//! The controller mishandles pipelined requests, so only one request is on
//! the wire at a time. Further requests wait in a FIFO queue and go out as
//! responses arrive. The flow controller itself does no I/O: `send` and
//! `response_received` hand back the line that should be transmitted now.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct FlowController {
    /// Requests submitted and not yet answered, including queued ones.
    in_flight: usize,
    queue: VecDeque<String>,
    last_activity: Instant,
    /// When the request currently on the wire was transmitted.
    on_wire_since: Option<Instant>,
    responses: u64,
    total_response_time: Duration,
}

impl FlowController {
    pub fn new() -> Self {
        Self {
            in_flight: 0,
            queue: VecDeque::new(),
            last_activity: Instant::now(),
            on_wire_since: None,
            responses: 0,
            total_response_time: Duration::ZERO,
        }
    }

    /// Submit a serialized request.
    ///
    /// Returns the request back if it should be transmitted immediately;
    /// otherwise it is queued behind the one already on the wire.
    pub fn send(&mut self, request: String) -> Option<String> {
        let now = Instant::now();
        let transmit = if self.in_flight == 0 {
            self.on_wire_since = Some(now);
            Some(request)
        } else {
            self.queue.push_back(request);
            None
        };
        self.in_flight += 1;
        self.last_activity = now;
        transmit
    }

    /// Record a response. Returns the next queued request to transmit, if any.
    pub fn response_received(&mut self) -> Option<String> {
        let now = Instant::now();
        if let Some(sent) = self.on_wire_since.take() {
            self.responses += 1;
            self.total_response_time += now.saturating_duration_since(sent);
        }

        let next = self.queue.pop_front();
        if next.is_some() {
            self.on_wire_since = Some(now);
        }
        if self.in_flight > 0 {
            self.in_flight -= 1;
        }
        self.last_activity = now;
        next
    }

    /// Forget everything in flight and drop the queue.
    ///
    /// Returns how many queued requests were discarded. They are not retried.
    pub fn reset(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.in_flight = 0;
        self.on_wire_since = None;
        self.last_activity = Instant::now();
        dropped
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// `true` when requests are outstanding and nothing has moved for longer
    /// than `timeout`.
    pub fn is_stalled(&self, now: Instant, timeout: Duration) -> bool {
        self.in_flight > 0 && now.saturating_duration_since(self.last_activity) > timeout
    }

    /// Mean time between transmitting a request and seeing a response.
    pub fn average_response_time(&self) -> Option<Duration> {
        if self.responses == 0 {
            return None;
        }
        let count = u32::try_from(self.responses).unwrap_or(u32::MAX);
        Some(self.total_response_time / count)
    }

    pub fn responses_observed(&self) -> u64 {
        self.responses
    }
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn req(n: usize) -> String {
        format!(r#"{{"messageID":"{n}","command":"GetParamList"}}"#)
    }

    #[test]
    fn only_first_of_many_goes_out() {
        let mut flow = FlowController::new();
        let mut wire = Vec::new();
        for n in 1..=5 {
            wire.extend(flow.send(req(n)));
        }
        assert_eq!(wire, vec![req(1)]);
        assert_eq!(flow.in_flight(), 5);
        assert_eq!(flow.queued(), 4);
    }

    #[test]
    fn responses_drain_queue_in_order() {
        let mut flow = FlowController::new();
        let mut wire = Vec::new();
        for n in 1..=5 {
            wire.extend(flow.send(req(n)));
        }
        for _ in 0..5 {
            wire.extend(flow.response_received());
        }
        assert_eq!(wire, (1..=5).map(req).collect::<Vec<_>>());
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.queued(), 0);
    }

    #[test]
    fn unsolicited_response_does_not_underflow() {
        let mut flow = FlowController::new();
        assert!(flow.response_received().is_none());
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.send(req(1)), Some(req(1)));
    }

    #[test]
    fn reset_drops_queue() {
        let mut flow = FlowController::new();
        for n in 1..=3 {
            flow.send(req(n));
        }
        assert_eq!(flow.reset(), 2);
        assert_eq!(flow.in_flight(), 0);
        assert_eq!(flow.queued(), 0);
        assert_eq!(flow.send(req(4)), Some(req(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn stall_detection_and_response_time() {
        let mut flow = FlowController::new();
        flow.send(req(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!flow.is_stalled(Instant::now(), Duration::from_secs(45)));

        flow.response_received();
        assert_eq!(flow.average_response_time(), Some(Duration::from_secs(2)));

        flow.send(req(2));
        tokio::time::advance(Duration::from_secs(46)).await;
        assert!(flow.is_stalled(Instant::now(), Duration::from_secs(45)));
    }

    #[tokio::test(start_paused = true)]
    async fn stall_needs_strictly_longer_than_timeout() {
        let mut flow = FlowController::new();
        flow.send(req(1));
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!flow.is_stalled(Instant::now(), Duration::from_secs(45)));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(flow.is_stalled(Instant::now(), Duration::from_secs(45)));
    }

    #[test]
    fn idle_controller_is_never_stalled() {
        let flow = FlowController::new();
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(!flow.is_stalled(later, Duration::from_secs(45)));
        assert_eq!(flow.average_response_time(), None);
    }
}
