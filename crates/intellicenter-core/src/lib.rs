//! Session layer between `intellicenter-api` and application consumers.
//!
//! This crate owns the object model and connection lifecycle for a Pentair
//! IntelliCenter controller:
//!
//! - **[`Controller`]**: one session at a time.
//!   [`connect()`](Controller::connect) reads the system info, loads the
//!   hardware definition and subscribes to the tracked attributes. After
//!   that, pushed updates are applied to the [`PoolModel`] in arrival order
//!   and broadcast as [`ControllerEvent`]s carrying exactly what changed.
//!   [`Controller::oneshot()`](Controller::oneshot) covers single CLI
//!   invocations.
//!
//! - **[`Supervisor`]**: keeps a controller connected, reconnecting with
//!   exponential backoff, and drives a [`LifecycleHandler`].
//!
//! - **[`ModelStream`]**: subscription to immutable model snapshots.
//!
//! - **[`Command`]**: validated change requests (setpoints, chemistry,
//!   lights, valves, vacation mode) resolved against the model.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod optimistic;
pub mod stream;
pub mod supervisor;
pub mod system_info;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{ChangeRequest, Command, LIGHT_EFFECTS};
pub use config::{ControllerConfig, ReconnectConfig};
pub use controller::{ConnectionMetrics, Controller, ControllerEvent};
pub use error::CoreError;
pub use optimistic::OptimisticValue;
pub use stream::{ModelStream, ModelWatchStream};
pub use supervisor::{ConnectionState, LifecycleHandler, NoopHandler, Supervisor};
pub use system_info::SystemInfo;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AttributeMap, Attributes, ModelChanges, ObjectType, PoolModel, PoolObject,
    default_attribute_map,
};

// Protocol types that appear in this crate's public API.
pub use intellicenter_api::{DEFAULT_PORT, DisconnectReason, HealthConfig, Message};
