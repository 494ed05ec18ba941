// ── Controller abstraction ──
//
// Session management for one IntelliCenter controller: the connect
// handshake (system info, hardware definition, subscription), applying
// pushed updates to the object model, and change requests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use intellicenter_api::message::{self, SYSTEM_QUERY_OBJNAM, command};
use intellicenter_api::{
    Connection, ConnectionEvent, DisconnectReason, Message, ObjectEntry, ParamQuery,
};

use crate::command::{self as model_command, Command};
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::model::attributes::{MODE, PROPNAME, SNAME, VER};
use crate::model::{Attributes, ModelChanges, PoolModel, attributes_from_params};
use crate::stream::ModelStream;
use crate::system_info::SystemInfo;

const EVENT_CHANNEL_SIZE: usize = 256;

const HARDWARE_DEFINITION_QUERY: &str = "GetHardwareDefinition";

// ── Events and metrics ───────────────────────────────────────────

/// Notifications broadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// The model changed; holds exactly the attributes that changed.
    Updated(Arc<ModelChanges>),
    /// The connection ended.
    Disconnected(DisconnectReason),
}

/// Request and connection counters across the controller's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetrics {
    pub requests_sent: u64,
    pub requests_completed: u64,
    pub requests_failed: u64,
    pub average_response_time: Option<Duration>,
    pub successful_connects: u64,
    pub reconnect_attempts: u64,
    pub connected_since: Option<DateTime<Utc>>,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Owns at most one live
/// connection at a time; [`connect()`](Self::connect) replaces any
/// previous one. The model is published as immutable snapshots, so
/// readers never block the task applying updates.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    model: watch::Sender<Arc<PoolModel>>,
    system_info: watch::Sender<Option<SystemInfo>>,
    /// `None` while connected; the last disconnect reason otherwise.
    disconnected: watch::Sender<Option<DisconnectReason>>,
    event_tx: broadcast::Sender<ControllerEvent>,
    connection: Mutex<Option<Connection>>,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    metrics: Mutex<ConnectionMetrics>,
}

impl Controller {
    /// Create a new Controller from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to open a session.
    pub fn new(config: ControllerConfig) -> Self {
        let model = PoolModel::new(config.tracked_attributes.clone());
        let (model, _) = watch::channel(Arc::new(model));
        let (system_info, _) = watch::channel(None);
        let (disconnected, _) = watch::channel(Some(DisconnectReason::Requested));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                model,
                system_info,
                disconnected,
                event_tx,
                connection: Mutex::new(None),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
                metrics: Mutex::new(ConnectionMetrics::default()),
            }),
        }
    }

    /// Access the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect and run the handshake.
    ///
    /// Reads the system info, loads the hardware definition into a fresh
    /// model, subscribes to the tracked attributes, then spawns the task
    /// that applies pushed updates. Any previous session is closed first.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.disconnect().await;

        let (conn, events) = Connection::connect(&self.inner.config.connection()).await?;

        let (info, model) = match self.handshake(&conn).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "handshake failed");
                conn.close(DisconnectReason::Requested);
                return Err(e);
            }
        };

        info!(
            peer = %conn.peer(),
            prop_name = %info.prop_name,
            version = %info.sw_version,
            objects = model.len(),
            "connected to controller"
        );

        self.inner.disconnected.send_replace(None);
        self.inner.model.send_replace(Arc::new(model));
        self.inner.system_info.send_replace(Some(info));
        *lock(&self.inner.connection) = Some(conn.clone());
        {
            let mut metrics = lock(&self.inner.metrics);
            metrics.successful_connects += 1;
            metrics.connected_since = Some(Utc::now());
        }

        let handle = tokio::spawn(message_task(self.clone(), conn, events));
        self.inner.task_handles.lock().await.push(handle);
        Ok(())
    }

    async fn handshake(&self, conn: &Connection) -> Result<(SystemInfo, PoolModel), CoreError> {
        // 1. System identity
        let query = ParamQuery {
            objnam: SYSTEM_QUERY_OBJNAM.to_owned(),
            keys: [PROPNAME, VER, MODE, SNAME].map(str::to_owned).to_vec(),
        };
        let reply = conn
            .send_command_and_wait(
                command::GET_PARAM_LIST,
                message::get_param_list("OBJTYP=SYSTEM", &[query]),
            )
            .await?;
        let system = reply
            .object_list()?
            .and_then(|entries| entries.into_iter().next())
            .ok_or_else(|| protocol("system query returned no objects"))?;
        let info = SystemInfo::from_attributes(&system.objnam, &attributes_from_params(&system.params));
        debug!(objnam = %info.objnam, "system info received");

        // 2. Object tree
        let reply = conn
            .send_command_and_wait(
                command::GET_QUERY,
                message::get_query(HARDWARE_DEFINITION_QUERY, ""),
            )
            .await?;
        let answer: Vec<ObjectEntry> = reply
            .field("answer")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| protocol(format!("bad hardware definition: {e}")))?
            .ok_or_else(|| protocol("hardware definition has no answer"))?;

        let mut model = PoolModel::new(self.inner.config.tracked_attributes.clone());
        model.load_definition(&answer)?;
        debug!(objects = model.len(), "hardware definition loaded");

        // 3. Subscription
        let queries = model.attributes_to_track();
        if !queries.is_empty() {
            let reply = conn
                .send_command_and_wait(
                    command::REQUEST_PARAM_LIST,
                    message::request_param_list(&queries),
                )
                .await?;
            if let Some(entries) = reply.object_list()? {
                model.apply_updates(&entries);
            }
            debug!(objects = queries.len(), "subscribed to updates");
        }

        Ok((info, model))
    }

    /// Disconnect from the controller.
    ///
    /// Closes the connection and waits for the session task to finish.
    /// The last model snapshot stays readable.
    pub async fn disconnect(&self) {
        let conn = lock(&self.inner.connection).take();
        if let Some(conn) = conn {
            conn.close(DisconnectReason::Requested);
        }

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.disconnected.borrow().is_none()
    }

    /// Resolve once the current session ends, with its reason.
    ///
    /// Resolves immediately when not connected.
    pub async fn wait_disconnected(&self) -> DisconnectReason {
        let mut rx = self.inner.disconnected.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(DisconnectReason::Requested),
            Err(_) => DisconnectReason::Requested,
        }
    }

    /// One-shot: connect, run closure, disconnect.
    pub async fn oneshot<F, Fut, T>(config: ControllerConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let controller = Controller::new(config);
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    /// Current model snapshot.
    pub fn model(&self) -> Arc<PoolModel> {
        self.inner.model.borrow().clone()
    }

    /// Subscribe to model snapshots.
    pub fn model_stream(&self) -> ModelStream {
        ModelStream::new(self.inner.model.subscribe())
    }

    /// System info for the current session; `None` when not connected.
    pub fn system_info(&self) -> Option<SystemInfo> {
        self.inner.system_info.borrow().clone()
    }

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.event_tx.subscribe()
    }

    pub async fn metrics(&self) -> ConnectionMetrics {
        let conn = lock(&self.inner.connection).clone();
        let mut metrics = lock(&self.inner.metrics).clone();
        if let Some(conn) = conn {
            let live = conn.metrics().await;
            metrics.requests_sent += live.requests_sent;
            metrics.requests_completed += live.requests_completed;
            metrics.requests_failed += live.requests_failed;
            if live.average_response_time.is_some() {
                metrics.average_response_time = live.average_response_time;
            }
        }
        metrics
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        lock(&self.inner.metrics).reconnect_attempts += 1;
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Queue a raw command and return its message id.
    pub async fn send_command(
        &self,
        name: &str,
        payload: Map<String, Value>,
    ) -> Result<String, CoreError> {
        Ok(self.connection()?.send_command(name, payload).await?)
    }

    /// Send a raw command and wait for its response.
    pub async fn send_command_and_wait(
        &self,
        name: &str,
        payload: Map<String, Value>,
    ) -> Result<Message, CoreError> {
        Ok(self.connection()?.send_command_and_wait(name, payload).await?)
    }

    /// Ask the controller to change attributes of one object.
    ///
    /// The model is not touched here: the controller confirms changes with
    /// a push, which updates the model like any other. With `wait`, returns
    /// once the controller acknowledged the request.
    pub async fn request_changes(
        &self,
        objnam: &str,
        changes: &Attributes,
        wait: bool,
    ) -> Result<(), CoreError> {
        let params: Map<String, Value> = changes
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        let payload = message::set_param_list(objnam, params);
        debug!(objnam, ?changes, wait, "requesting changes");

        if wait {
            self.send_command_and_wait(command::SET_PARAM_LIST, payload).await?;
        } else {
            self.send_command(command::SET_PARAM_LIST, payload).await?;
        }
        Ok(())
    }

    /// Validate a command against the current model and send it.
    pub async fn execute(&self, cmd: Command, wait: bool) -> Result<(), CoreError> {
        self.connection()?;
        let system_objnam = self.system_info().map(|info| info.objnam);
        let request = cmd.resolve(&self.model(), system_objnam.as_deref())?;
        self.request_changes(&request.objnam, &request.changes, wait).await
    }

    // ── Convenience setters ──────────────────────────────────────

    pub async fn turn_on(&self, objnam: &str) -> Result<(), CoreError> {
        self.execute(Command::TurnOn { objnam: objnam.into() }, false).await
    }

    pub async fn turn_off(&self, objnam: &str) -> Result<(), CoreError> {
        self.execute(Command::TurnOff { objnam: objnam.into() }, false).await
    }

    /// Set a body's heating setpoint (`LOTMP`).
    pub async fn set_setpoint(&self, body: &str, temperature: i32) -> Result<(), CoreError> {
        let cmd = Command::SetSetpoint {
            body: body.into(),
            temperature,
        };
        self.execute(cmd, false).await
    }

    /// Set a body's cooling / maximum setpoint (`HITMP`).
    pub async fn set_max_setpoint(&self, body: &str, temperature: i32) -> Result<(), CoreError> {
        let cmd = Command::SetMaxSetpoint {
            body: body.into(),
            temperature,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_heater(&self, body: &str, heater: &str) -> Result<(), CoreError> {
        let cmd = Command::SetHeater {
            body: body.into(),
            heater: heater.into(),
        };
        self.execute(cmd, false).await
    }

    pub async fn clear_heater(&self, body: &str) -> Result<(), CoreError> {
        self.execute(Command::ClearHeater { body: body.into() }, false).await
    }

    pub async fn set_ph_setpoint(&self, chem: &str, ph: f64) -> Result<(), CoreError> {
        let cmd = Command::SetPhSetpoint {
            chem: chem.into(),
            ph,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_orp_setpoint(&self, chem: &str, millivolts: u32) -> Result<(), CoreError> {
        let cmd = Command::SetOrpSetpoint {
            chem: chem.into(),
            millivolts,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_chlorinator_output(
        &self,
        chem: &str,
        primary: u8,
        secondary: Option<u8>,
    ) -> Result<(), CoreError> {
        let cmd = Command::SetChlorinatorOutput {
            chem: chem.into(),
            primary,
            secondary,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_alkalinity(&self, chem: &str, ppm: u32) -> Result<(), CoreError> {
        let cmd = Command::SetAlkalinity {
            chem: chem.into(),
            ppm,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_calcium_hardness(&self, chem: &str, ppm: u32) -> Result<(), CoreError> {
        let cmd = Command::SetCalciumHardness {
            chem: chem.into(),
            ppm,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_cyanuric_acid(&self, chem: &str, ppm: u32) -> Result<(), CoreError> {
        let cmd = Command::SetCyanuricAcid {
            chem: chem.into(),
            ppm,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_light_effect(&self, circuit: &str, effect: &str) -> Result<(), CoreError> {
        let cmd = Command::SetLightEffect {
            objnam: circuit.into(),
            effect: effect.into(),
        };
        self.execute(cmd, false).await
    }

    pub async fn set_valve_state(&self, valve: &str, on: bool) -> Result<(), CoreError> {
        let cmd = Command::SetValveState {
            objnam: valve.into(),
            on,
        };
        self.execute(cmd, false).await
    }

    pub async fn set_vacation_mode(&self, on: bool) -> Result<(), CoreError> {
        self.execute(Command::SetVacationMode { on }, false).await
    }

    // ── Readers ──────────────────────────────────────────────────

    pub fn chlorinator_output(&self, chem: &str) -> Option<(u8, u8)> {
        model_command::chlorinator_output(&self.model(), chem)
    }

    pub fn is_vacation_mode(&self) -> bool {
        model_command::is_vacation_mode(&self.model())
    }

    // ── Internals ────────────────────────────────────────────────

    fn connection(&self) -> Result<Connection, CoreError> {
        lock(&self.inner.connection)
            .clone()
            .ok_or(CoreError::NotConnected)
    }

    /// Apply model data carried by a push or an unawaited response.
    fn apply_message(&self, msg: &Message) -> Result<(), CoreError> {
        if msg.command != command::NOTIFY_LIST && !msg.is_response() {
            trace!(command = %msg.command, "ignoring message");
            return Ok(());
        }
        let Some(entries) = msg.object_list()? else {
            return Ok(());
        };
        self.apply_entries(&entries);
        Ok(())
    }

    fn apply_entries(&self, entries: &[ObjectEntry]) {
        self.update_system_info(entries);

        let mut changes = ModelChanges::new();
        self.inner.model.send_if_modified(|model| {
            changes = Arc::make_mut(model).apply_updates(entries);
            !changes.is_empty()
        });

        if !changes.is_empty() {
            debug!(objects = changes.len(), "model updated");
            let _ = self
                .inner
                .event_tx
                .send(ControllerEvent::Updated(Arc::new(changes)));
        }
    }

    /// Keep units and version current when the system object changes.
    fn update_system_info(&self, entries: &[ObjectEntry]) {
        let system_objnam = self
            .inner
            .model
            .borrow()
            .system_object()
            .map(|obj| obj.objnam().to_owned());

        self.inner.system_info.send_if_modified(|info| {
            let Some(info) = info.as_mut() else {
                return false;
            };
            let before = info.clone();
            for entry in entries {
                let is_system = entry.objnam == info.objnam
                    || entry.objnam == SYSTEM_QUERY_OBJNAM
                    || system_objnam.as_deref() == Some(entry.objnam.as_str());
                if is_system {
                    info.apply(&attributes_from_params(&entry.params));
                }
            }
            *info != before
        });
    }

    async fn connection_lost(&self, conn: &Connection, reason: DisconnectReason) {
        let finished = conn.metrics().await;
        {
            let mut current = lock(&self.inner.connection);
            if current.as_ref().is_some_and(|c| c.same_connection(conn)) {
                *current = None;
            }
        }
        {
            let mut metrics = lock(&self.inner.metrics);
            metrics.requests_sent += finished.requests_sent;
            metrics.requests_completed += finished.requests_completed;
            metrics.requests_failed += finished.requests_failed;
            if finished.average_response_time.is_some() {
                metrics.average_response_time = finished.average_response_time;
            }
            metrics.connected_since = None;
        }

        if reason == DisconnectReason::Requested {
            info!("disconnected");
        } else {
            warn!(reason = %reason, "connection to controller lost");
        }

        self.inner.system_info.send_replace(None);
        self.inner.disconnected.send_replace(Some(reason.clone()));
        let _ = self.inner.event_tx.send(ControllerEvent::Disconnected(reason));
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Apply inbound messages in arrival order until the connection closes.
async fn message_task(
    controller: Controller,
    conn: Connection,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    let reason = loop {
        match events.recv().await {
            Some(ConnectionEvent::Message(msg)) => {
                if let Err(e) = controller.apply_message(&msg) {
                    error!(error = %e, command = %msg.command, "invalid message, closing connection");
                    conn.close(DisconnectReason::Protocol(e.to_string()));
                }
            }
            Some(ConnectionEvent::Closed(reason)) => break reason,
            None => break conn.close_reason().unwrap_or(DisconnectReason::Requested),
        }
    };
    controller.connection_lost(&conn, reason).await;
}

// ── Helpers ──────────────────────────────────────────────────────

fn protocol(message: impl Into<String>) -> CoreError {
    CoreError::Protocol {
        message: message.into(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
