//! Error types for the rudder-driver crate.

use std::path::PathBuf;

use thiserror::Error;

use rudder_protocol::ProtocolError;
use rudder_types::DriverState;

use crate::channel::ExitReason;

/// Errors that can surface from a driver session.
///
/// Parse failures and agent errors marked recoverable never appear here;
/// they are absorbed and reported as events. Everything below either
/// settles the pending `start()` call or is thrown synchronously to the
/// caller.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver executable could not be launched.
    #[error("failed to spawn driver process {command:?}: {reason}")]
    Spawn { command: PathBuf, reason: String },

    /// A protocol line could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The process reported an error it cannot recover from.
    #[error("driver reported unrecoverable error [{code}]: {message}")]
    Agent { code: String, message: String },

    /// The process terminated without a `finished` or fatal `error` event.
    #[error("driver process exited unexpectedly ({status})")]
    UnexpectedExit { status: ExitReason },

    /// The caller tore the session down before it finished.
    #[error("driver stopped: {reason}")]
    Stopped { reason: String },

    /// The operation is not valid in the session's current state.
    #[error("cannot {operation} while driver is {state}")]
    InvalidState {
        operation: &'static str,
        state: DriverState,
    },

    /// An I/O failure outside the normal write-after-exit path.
    #[error("driver I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_names_code_and_message() {
        let err = DriverError::Agent {
            code: "x".into(),
            message: "boom".into(),
        };
        let text = err.to_string();
        assert!(text.contains("x"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn unexpected_exit_names_the_code() {
        let err = DriverError::UnexpectedExit {
            status: ExitReason::Code(1),
        };
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn invalid_state_names_operation_and_state() {
        let err = DriverError::InvalidState {
            operation: "start",
            state: DriverState::Running,
        };
        let text = err.to_string();
        assert!(text.contains("start"));
        assert!(text.contains("running"));
    }
}
