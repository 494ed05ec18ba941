// Reconnect supervision against the fake controller.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use common::{FakeController, eventually};
use intellicenter_core::{
    ConnectionState, Controller, ControllerConfig, DisconnectReason, HealthConfig,
    LifecycleHandler, ModelChanges, ReconnectConfig, Supervisor,
};

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    reconnected: AtomicUsize,
    disconnected: Mutex<Vec<DisconnectReason>>,
    updates: Mutex<Vec<ModelChanges>>,
}

struct Handler(Arc<Recorder>);

impl LifecycleHandler for Handler {
    fn on_started(&self, _controller: &Controller) {
        self.0.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_reconnected(&self, _controller: &Controller) {
        self.0.reconnected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnected(&self, _controller: &Controller, reason: &DisconnectReason) {
        self.0.disconnected.lock().unwrap().push(reason.clone());
    }

    fn on_model_updated(&self, _controller: &Controller, changes: &ModelChanges) {
        self.0.updates.lock().unwrap().push(changes.clone());
    }
}

fn supervised(config: ControllerConfig) -> (Supervisor, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let supervisor = Supervisor::with_handler(Controller::new(config), Handler(Arc::clone(&recorder)));
    (supervisor, recorder)
}

fn quick_reconnect(mut config: ControllerConfig) -> ControllerConfig {
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        max_retries: None,
    };
    config
}

async fn wait_state(
    rx: &mut watch::Receiver<ConnectionState>,
    predicate: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("state not reached")
        .unwrap()
        .clone()
}

#[tokio::test]
async fn test_start_connects_and_notifies() {
    let fake = FakeController::start().await;
    let (supervisor, recorder) = supervised(fake.config());

    supervisor.start().await.unwrap();

    assert_eq!(supervisor.current_state(), ConnectionState::Connected);
    assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
    assert!(supervisor.controller().is_connected());

    supervisor.stop().await;
    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
    assert!(recorder.disconnected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_first_connect_failure_is_returned() {
    let fake = FakeController::start().await;
    let config = fake.config();
    drop(fake);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (supervisor, recorder) = supervised(config);

    assert!(supervisor.start().await.is_err());
    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
    assert_eq!(recorder.started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_model_updates_reach_handler() {
    let fake = FakeController::start().await;
    let (supervisor, recorder) = supervised(fake.config());
    supervisor.start().await.unwrap();

    fake.push(json!([{ "objnam": "PUMP1", "params": { "STATUS": "4" } }]));

    eventually(|| {
        recorder
            .updates
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.get("PUMP1").and_then(|a| a.get("STATUS")).map(String::as_str) == Some("4"))
    })
    .await;
    supervisor.stop().await;
}

#[tokio::test]
async fn test_reconnects_after_peer_drop() {
    let fake = FakeController::start().await;
    let (supervisor, recorder) = supervised(quick_reconnect(fake.config()));
    let mut state = supervisor.state();
    supervisor.start().await.unwrap();

    fake.drop_clients();

    wait_state(&mut state, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
    wait_state(&mut state, |s| *s == ConnectionState::Connected).await;

    assert_eq!(fake.connections(), 2);
    assert_eq!(recorder.reconnected.load(Ordering::SeqCst), 1);
    assert_eq!(
        *recorder.disconnected.lock().unwrap(),
        vec![DisconnectReason::Eof]
    );

    // The new session is fully loaded and receives pushes.
    fake.push(json!([{ "objnam": "LIGHT1", "params": { "STATUS": "ON" } }]));
    eventually(|| supervisor.controller().model()["LIGHT1"].is_on()).await;

    let metrics = supervisor.controller().metrics().await;
    assert_eq!(metrics.successful_connects, 2);
    assert_eq!(metrics.reconnect_attempts, 1);

    supervisor.stop().await;
}

#[tokio::test]
async fn test_idle_connection_is_dropped_once_and_stop_cancels_backoff() {
    let fake = FakeController::start().await;
    let mut config = fake.config();
    config.health = HealthConfig {
        check_interval: Duration::from_millis(20),
        keepalive_interval: Duration::from_secs(60),
        flow_control_timeout: Duration::from_secs(30),
        idle_timeout: Duration::from_millis(150),
    };
    config.reconnect.initial_delay = Duration::from_secs(10);
    let (supervisor, recorder) = supervised(config);
    let mut state = supervisor.state();
    supervisor.start().await.unwrap();

    let reached = wait_state(&mut state, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
    assert_eq!(reached, ConnectionState::Reconnecting { attempt: 1 });

    // Give any duplicate notification a chance to show up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    {
        let disconnected = recorder.disconnected.lock().unwrap();
        assert_eq!(disconnected.len(), 1);
        assert!(matches!(disconnected[0], DisconnectReason::IdleTimeout { .. }));
    }

    // Stopping mid-backoff returns promptly instead of after 10s.
    tokio::time::timeout(Duration::from_secs(2), supervisor.stop())
        .await
        .unwrap();
    assert_eq!(supervisor.current_state(), ConnectionState::Disconnected);
    assert_eq!(fake.connections(), 1);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let fake = FakeController::start().await;
    let mut config = quick_reconnect(fake.config());
    config.reconnect.max_retries = Some(2);
    let (supervisor, recorder) = supervised(config);
    let mut state = supervisor.state();
    supervisor.start().await.unwrap();

    fake.stop_accepting();
    tokio::time::sleep(Duration::from_millis(20)).await;
    fake.drop_clients();

    wait_state(&mut state, |s| *s == ConnectionState::Failed).await;
    assert_eq!(recorder.reconnected.load(Ordering::SeqCst), 0);
    assert_eq!(supervisor.controller().metrics().await.reconnect_attempts, 2);

    supervisor.stop().await;
}
