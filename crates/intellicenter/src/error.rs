//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use intellicenter_config::ConfigError;
use intellicenter_core::CoreError;

/// Process exit codes.
#[allow(dead_code)]
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(dead_code, unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to controller at {addr}")]
    #[diagnostic(
        code(intellicenter::connection_failed),
        help(
            "Check that the controller is powered and reachable on port 6681.\n\
             Address: {addr}\n\
             Try: intellicenter --host <ip> info"
        )
    )]
    ConnectionFailed {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Connection to the controller was lost")]
    #[diagnostic(
        code(intellicenter::connection_lost),
        help("Retry the command; use `watch --reconnect` for long-running sessions.")
    )]
    ConnectionLost,

    #[error("Controller sent an unexpected message: {message}")]
    #[diagnostic(code(intellicenter::protocol))]
    Protocol { message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Object '{objnam}' not found")]
    #[diagnostic(
        code(intellicenter::not_found),
        help("Run: intellicenter objects list to see available objects")
    )]
    NotFound { objnam: String },

    #[error("Controller rejected {command} with code {code}")]
    #[diagnostic(code(intellicenter::rejected))]
    Rejected { command: String, code: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(intellicenter::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(intellicenter::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: intellicenter config init --host <ip> --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(intellicenter::no_config),
        help(
            "Pass --host, set INTELLICENTER_HOST, or create a profile with:\n\
             intellicenter config init --host <ip>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(intellicenter::config))]
    Config(Box<figment::Error>),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(intellicenter::timeout),
        help("Increase timeout with --timeout or check controller responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Internal ─────────────────────────────────────────────────────

    #[error("Internal error: {0}")]
    #[diagnostic(code(intellicenter::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to write config: {0}")]
    #[diagnostic(code(intellicenter::config_write))]
    ConfigWrite(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost | Self::Protocol { .. } => {
                exit_code::CONNECTION
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { addr, reason } => CliError::ConnectionFailed {
                addr,
                source: reason.into(),
            },

            CoreError::NotConnected | CoreError::ControllerDisconnected => {
                CliError::ConnectionLost
            }

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::ObjectNotFound { objnam } => CliError::NotFound { objnam },

            CoreError::WrongObjectType {
                objnam,
                expected,
                actual,
            } => CliError::Validation {
                field: objnam,
                reason: format!("expected a {expected} object, found {actual}"),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Rejected { command, code } => CliError::Rejected { command, code },

            CoreError::Protocol { message } => CliError::Protocol { message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Serialization(e) => CliError::ConfigWrite(e.to_string()),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::ObjectNotFound {
                    objnam: "C0001".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (CoreError::Timeout { timeout_secs: 30 }, exit_code::TIMEOUT),
            (CoreError::NotConnected, exit_code::CONNECTION),
            (
                CoreError::ValidationFailed {
                    message: "pH out of range".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Rejected {
                    command: "SetParamList".into(),
                    code: "400".into(),
                },
                exit_code::REJECTED,
            ),
            (CoreError::Internal("boom".into()), exit_code::GENERAL),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn wrong_type_names_the_object() {
        let err = CliError::from(CoreError::WrongObjectType {
            objnam: "C0001".into(),
            expected: "BODY".into(),
            actual: "CIRCUIT".into(),
        });
        assert_eq!(
            err.to_string(),
            "Invalid value for C0001: expected a BODY object, found CIRCUIT"
        );
        assert_ne!(exit_code::SUCCESS, err.exit_code());
    }
}
