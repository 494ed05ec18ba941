// intellicenter-api: Async Rust client for the Pentair IntelliCenter TCP protocol

pub mod codec;
pub mod connection;
pub mod error;
pub mod flow;
pub mod health;
pub mod message;

pub use codec::FrameCodec;
pub use connection::{
    Connection, ConnectionConfig, ConnectionEvent, DEFAULT_PORT, DisconnectReason, RequestMetrics,
};
pub use error::Error;
pub use flow::FlowController;
pub use health::{HealthConfig, HealthMonitor};
pub use message::{Message, ObjectEntry, ParamQuery};
