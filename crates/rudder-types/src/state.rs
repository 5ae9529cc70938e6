//! Driver session state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a driver session.
///
/// `Idle` is the initial state. `Running` and `Paused` interleave freely;
/// the interactive sub-states are entered when the process raises a
/// confirmation or a question and left only through a subsequent
/// `state_change` event from the process. `Finished`, `Error`, and
/// `Stopped` are terminal: once reached, the session is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// No driver process has produced a `state_change` yet.
    Idle,
    /// The driver is actively working on the goal.
    Running,
    /// The driver acknowledged a pause request.
    Paused,
    /// The driver is blocked on a boolean confirmation.
    WaitingConfirmation,
    /// The driver is blocked on a free-text answer.
    WaitingAnswer,
    /// The driver reported completion (success or failure).
    Finished,
    /// The driver reported an unrecoverable error.
    Error,
    /// The caller tore the session down.
    Stopped,
}

impl DriverState {
    /// Whether this state ends the session permanently.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DriverState::Finished | DriverState::Error | DriverState::Stopped
        )
    }

    /// Whether the driver is blocked on a human-in-the-loop response.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            DriverState::WaitingConfirmation | DriverState::WaitingAnswer
        )
    }

    /// Whether a session is in flight (a process is being supervised).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DriverState::Running | DriverState::Paused
        ) || self.is_waiting()
    }

    /// The snake_case wire form carried by `state_change` events.
    pub fn as_str(self) -> &'static str {
        match self {
            DriverState::Idle => "idle",
            DriverState::Running => "running",
            DriverState::Paused => "paused",
            DriverState::WaitingConfirmation => "waiting_confirmation",
            DriverState::WaitingAnswer => "waiting_answer",
            DriverState::Finished => "finished",
            DriverState::Error => "error",
            DriverState::Stopped => "stopped",
        }
    }

    /// Parse the wire form. Returns `None` for states the protocol does
    /// not name.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(DriverState::Idle),
            "running" => Some(DriverState::Running),
            "paused" => Some(DriverState::Paused),
            "waiting_confirmation" => Some(DriverState::WaitingConfirmation),
            "waiting_answer" => Some(DriverState::WaitingAnswer),
            "finished" => Some(DriverState::Finished),
            "error" => Some(DriverState::Error),
            "stopped" => Some(DriverState::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
