// In-process stand-in for an IntelliCenter controller.
//
// Answers the handshake queries with a small fixed installation, echoes
// `SetParamList` writes back as `NotifyList` pushes, and lets tests push
// arbitrary lines or drop every client.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use intellicenter_core::{ControllerConfig, HealthConfig};

enum Outbound {
    Line(String),
    Close,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<Value>>,
    clients: Mutex<Vec<mpsc::UnboundedSender<Outbound>>>,
    connections: AtomicUsize,
    pushes: AtomicUsize,
}

pub struct FakeController {
    port: u16,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl FakeController {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared::default());

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
            }
        });

        Self {
            port,
            shared,
            accept_task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Controller settings pointing at this fake, with short timeouts.
    pub fn config(&self) -> ControllerConfig {
        let mut config = ControllerConfig::new("127.0.0.1");
        config.port = self.port;
        config.connect_timeout = Duration::from_secs(2);
        config.request_timeout = Duration::from_secs(2);
        config.health = HealthConfig {
            check_interval: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(60),
            flow_control_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
        };
        config
    }

    /// Number of accepted connections so far.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Send a `NotifyList` to the most recent client.
    pub fn push(&self, object_list: Value) {
        let n = self.shared.pushes.fetch_add(1, Ordering::SeqCst);
        let line = json!({
            "command": "NotifyList",
            "messageID": format!("push-{n}"),
            "objectList": object_list,
        });
        self.push_raw(&line.to_string());
    }

    /// Send one raw line (terminator added) to the most recent client.
    pub fn push_raw(&self, line: &str) {
        if let Some(client) = self.shared.clients.lock().unwrap().last() {
            let _ = client.send(Outbound::Line(line.to_owned()));
        }
    }

    /// Close every open client connection.
    pub fn drop_clients(&self) {
        for client in self.shared.clients.lock().unwrap().drain(..) {
            let _ = client.send(Outbound::Close);
        }
    }

    /// Stop accepting new connections.
    pub fn stop_accepting(&self) {
        self.accept_task.abort();
    }

    pub fn received(&self) -> Vec<Value> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn received_commands(&self, command: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|request| request["command"] == command)
            .collect()
    }

    /// Wait until at least `count` requests of `command` have arrived.
    pub async fn wait_for_command(&self, command: &str, count: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let seen = self.received_commands(command);
                if seen.len() >= count {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} x {command}"))
    }
}

impl Drop for FakeController {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let (read, mut write) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    shared.clients.lock().unwrap().push(tx);
    let mut lines = BufReader::new(read).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if line.is_empty() {
                    continue;
                }
                let request: Value = serde_json::from_str(&line).unwrap();
                shared.received.lock().unwrap().push(request.clone());
                for reply in respond(&request) {
                    if write.write_all(format!("{reply}\r\n").as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
            out = rx.recv() => match out {
                Some(Outbound::Line(line)) => {
                    if write.write_all(format!("{line}\r\n").as_bytes()).await.is_err() {
                        return;
                    }
                }
                Some(Outbound::Close) | None => break,
            },
        }
    }
}

fn respond(request: &Value) -> Vec<Value> {
    let id = request["messageID"].clone();
    let ack = json!({
        "messageID": id,
        "command": "SendParamList",
        "response": "200",
        "objectList": [],
    });

    match request["command"].as_str() {
        Some("GetParamList") if request["condition"] == "OBJTYP=SYSTEM" => vec![json!({
            "messageID": id,
            "command": "SendParamList",
            "response": "200",
            "objectList": [{
                "objnam": "SYS01",
                "params": {
                    "PROPNAME": "Backyard",
                    "VER": "1.064",
                    "MODE": "ENGLISH",
                    "SNAME": "Backyard",
                },
            }],
        })],
        Some("GetQuery") => vec![json!({
            "messageID": id,
            "command": "SendQuery",
            "queryName": "GetHardwareDefinition",
            "response": "200",
            "answer": hardware_definition(),
        })],
        Some("RequestParamList") => vec![json!({
            "messageID": id,
            "command": "SendParamList",
            "response": "200",
            "objectList": current_values(&request["objectList"]),
        })],
        Some("SetParamList") => vec![
            ack,
            json!({
                "messageID": format!("echo-{}", id.as_str().unwrap_or_default()),
                "command": "NotifyList",
                "objectList": request["objectList"],
            }),
        ],
        _ => vec![ack],
    }
}

/// A small installation: one pool body, one pump nested under a panel
/// and module, a light, a heater, a chlorinator and a valve.
pub fn hardware_definition() -> Value {
    json!([
        { "objnam": "SYS01", "params": {
            "OBJTYP": "SYSTEM", "PROPNAME": "Backyard", "VER": "1.064",
            "MODE": "ENGLISH", "SNAME": "Backyard", "VACFLO": "OFF",
        }},
        { "objnam": "POOL1", "params": {
            "OBJTYP": "BODY", "SUBTYP": "POOL", "SNAME": "Pool", "STATUS": "ON",
            "LOTMP": "78", "HITMP": "92", "LSTTMP": "76", "HEATER": "HTR01",
        }},
        { "objnam": "PNL01", "params": {
            "OBJTYP": "PANEL", "SNAME": "Panel",
            "OBJLIST": [{ "objnam": "M0101", "params": {
                "OBJTYP": "MODULE", "SNAME": "Module",
                "OBJLIST": [{ "objnam": "PUMP1", "params": {
                    "OBJTYP": "PUMP", "SUBTYP": "SPEED", "SNAME": "Pool Pump",
                    "STATUS": "10", "RPM": "2400",
                }}],
            }}],
        }},
        { "objnam": "LIGHT1", "params": {
            "OBJTYP": "CIRCUIT", "SUBTYP": "INTELLI", "SNAME": "Pool Light",
            "STATUS": "OFF", "USE": "WHITER",
        }},
        { "objnam": "HTR01", "params": {
            "OBJTYP": "HEATER", "SUBTYP": "GENERIC", "SNAME": "Gas Heater",
        }},
        { "objnam": "CHEM1", "params": {
            "OBJTYP": "CHEM", "SUBTYP": "ICHLOR", "SNAME": "Chlorinator",
            "PRIM": "50", "SEC": "15", "SALT": "3200",
        }},
        { "objnam": "VAL01", "params": {
            "OBJTYP": "VALVE", "SNAME": "Valve A", "STATUS": "OFF",
        }},
    ])
}

/// Values reported in the subscription reply. Differs from the
/// definition only for the pool's water temperature.
fn current_values(queries: &Value) -> Value {
    let requested: Vec<&str> = queries
        .as_array()
        .map(|list| list.iter().filter_map(|q| q["objnam"].as_str()).collect())
        .unwrap_or_default();
    let values: Vec<Value> = requested
        .into_iter()
        .filter(|objnam| *objnam == "POOL1")
        .map(|objnam| json!({ "objnam": objnam, "params": { "LSTTMP": "77" } }))
        .collect();
    Value::Array(values)
}

/// Wait until `condition` holds, polling.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
