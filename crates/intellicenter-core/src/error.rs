// ── Core error types ──
//
// User-facing errors from intellicenter-core. Consumers never see framing
// or JSON decoding failures directly. The `From<intellicenter_api::Error>`
// impl translates wire-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Not connected to a controller")]
    NotConnected,

    #[error("Controller disconnected")]
    ControllerDisconnected,

    #[error("Controller did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Object not found: {objnam}")]
    ObjectNotFound { objnam: String },

    #[error("{objnam} is a {actual}, expected {expected}")]
    WrongObjectType {
        objnam: String,
        expected: String,
        actual: String,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Request rejected by controller: {command} returned {code}")]
    Rejected { command: String, code: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the operation after a reconnect may help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::NotConnected
                | Self::ControllerDisconnected
                | Self::Timeout { .. }
        )
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<intellicenter_api::Error> for CoreError {
    fn from(err: intellicenter_api::Error) -> Self {
        use intellicenter_api::Error as Api;

        match err {
            Api::Connect { addr, source } => CoreError::ConnectionFailed {
                addr,
                reason: source.to_string(),
            },
            Api::Io(e) => CoreError::ConnectionFailed {
                addr: String::new(),
                reason: e.to_string(),
            },
            Api::Timeout(after) => CoreError::Timeout {
                timeout_secs: after.as_secs(),
            },
            Api::Closed => CoreError::ControllerDisconnected,
            Api::CommandFailed { command, code } => CoreError::Rejected { command, code },
            Api::FrameTooLong { .. }
            | Api::MalformedJson { .. }
            | Api::MissingField(_)
            | Api::ProtocolViolation(_) => CoreError::Protocol {
                message: err.to_string(),
            },
            Api::Serialization(e) => CoreError::Internal(format!("Serialization error: {e}")),
        }
    }
}
