use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `intellicenter-api` crate.
///
/// Covers every failure mode of the wire layer: connecting, framing,
/// message decoding, and command responses.
/// `intellicenter-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// TCP connect failed (refused, unreachable, DNS failure, etc.)
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Read or write on an established socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect or request deadline exceeded.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is closed (or closed while the request was pending).
    #[error("Connection closed")]
    Closed,

    // ── Framing ─────────────────────────────────────────────────────
    /// A line grew past the configured limit without a terminator.
    #[error("Frame too long: {len} bytes (max {max})")]
    FrameTooLong { len: usize, max: usize },

    // ── Messages ────────────────────────────────────────────────────
    /// The frame is not valid JSON. The message is dropped.
    #[error("Malformed JSON: {message}")]
    MalformedJson { message: String, line: String },

    /// A required envelope field is absent. The message is dropped.
    #[error("Message missing required field '{0}'")]
    MissingField(&'static str),

    /// The message is JSON but violates the protocol's shape.
    /// The connection is closed when this happens.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The controller answered a request with a non-success code.
    #[error("Command '{command}' failed with response {code}")]
    CommandFailed { command: String, code: String },

    /// Encoding an outbound request failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Io(_) | Self::Timeout(_) | Self::Closed
        )
    }

    /// Returns `true` if the offending message should simply be dropped
    /// while the connection stays up.
    pub fn is_recoverable_message_error(&self) -> bool {
        matches!(self, Self::MalformedJson { .. } | Self::MissingField(_))
    }
}
