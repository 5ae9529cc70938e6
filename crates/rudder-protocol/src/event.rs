//! Events received from the driver process.

use serde_json::Value;

use rudder_types::DriverState;

/// One event from the driver process.
///
/// Every variant carries the driver's `step` counter. Fields the protocol
/// marks optional default per-variant; unknown extra fields on the wire
/// are ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The process is up and waiting for a `start` command.
    Ready { step: u64 },
    /// The process moved to a new lifecycle state.
    StateChange { step: u64, state: DriverState },
    /// Free-text reasoning from the driver.
    Thinking { step: u64, text: String },
    /// Planned OS actions for the caller's executor, passed through
    /// without interpretation.
    Action { step: u64, actions: Vec<Value> },
    /// The driver wants boolean approval before performing an action.
    Confirm {
        step: u64,
        action: Value,
        reason: String,
    },
    /// The driver needs a free-text answer to proceed.
    AskQuestion {
        step: u64,
        question: String,
        question_id: Option<String>,
    },
    /// Terminal: the session is over.
    Finished {
        step: u64,
        success: bool,
        reason: String,
        summary: String,
    },
    /// An error inside the driver. Terminal only when `recoverable` is
    /// false.
    Error {
        step: u64,
        message: String,
        code: Option<String>,
        recoverable: bool,
    },
    /// Telemetry: a screenshot the driver captured.
    ScreenshotCaptured {
        step: u64,
        data: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    /// Telemetry: the driver established its backend session.
    SessionCreated { step: u64, session_id: String },
    /// Telemetry: a transcribed piece of audio.
    AudioTranscript {
        step: u64,
        text: String,
        role: Option<String>,
    },
    /// Telemetry: one encoded video frame.
    VideoFrame { step: u64, data: String },
    /// Telemetry: speech synthesis started.
    SpeechStarted { step: u64 },
    /// Telemetry: speech synthesis finished.
    SpeechFinished { step: u64 },
    /// Telemetry: the driver detected an end-of-turn.
    TurnDetected { step: u64 },
}

impl Event {
    /// The step counter stamped on this event.
    pub fn step(&self) -> u64 {
        match self {
            Event::Ready { step }
            | Event::StateChange { step, .. }
            | Event::Thinking { step, .. }
            | Event::Action { step, .. }
            | Event::Confirm { step, .. }
            | Event::AskQuestion { step, .. }
            | Event::Finished { step, .. }
            | Event::Error { step, .. }
            | Event::ScreenshotCaptured { step, .. }
            | Event::SessionCreated { step, .. }
            | Event::AudioTranscript { step, .. }
            | Event::VideoFrame { step, .. }
            | Event::SpeechStarted { step }
            | Event::SpeechFinished { step }
            | Event::TurnDetected { step } => *step,
        }
    }

    /// The kind discriminator for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Ready { .. } => EventKind::Ready,
            Event::StateChange { .. } => EventKind::StateChange,
            Event::Thinking { .. } => EventKind::Thinking,
            Event::Action { .. } => EventKind::Action,
            Event::Confirm { .. } => EventKind::Confirm,
            Event::AskQuestion { .. } => EventKind::AskQuestion,
            Event::Finished { .. } => EventKind::Finished,
            Event::Error { .. } => EventKind::Error,
            Event::ScreenshotCaptured { .. } => EventKind::ScreenshotCaptured,
            Event::SessionCreated { .. } => EventKind::SessionCreated,
            Event::AudioTranscript { .. } => EventKind::AudioTranscript,
            Event::VideoFrame { .. } => EventKind::VideoFrame,
            Event::SpeechStarted { .. } => EventKind::SpeechStarted,
            Event::SpeechFinished { .. } => EventKind::SpeechFinished,
            Event::TurnDetected { .. } => EventKind::TurnDetected,
        }
    }
}

/// Discriminator for [`Event`] variants, used to key listener registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    StateChange,
    Thinking,
    Action,
    Confirm,
    AskQuestion,
    Finished,
    Error,
    ScreenshotCaptured,
    SessionCreated,
    AudioTranscript,
    VideoFrame,
    SpeechStarted,
    SpeechFinished,
    TurnDetected,
}

impl EventKind {
    /// The snake_case discriminator value on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::StateChange => "state_change",
            EventKind::Thinking => "thinking",
            EventKind::Action => "action",
            EventKind::Confirm => "confirm",
            EventKind::AskQuestion => "ask_question",
            EventKind::Finished => "finished",
            EventKind::Error => "error",
            EventKind::ScreenshotCaptured => "screenshot_captured",
            EventKind::SessionCreated => "session_created",
            EventKind::AudioTranscript => "audio_transcript",
            EventKind::VideoFrame => "video_frame",
            EventKind::SpeechStarted => "speech_started",
            EventKind::SpeechFinished => "speech_finished",
            EventKind::TurnDetected => "turn_detected",
        }
    }

    /// Parse the wire discriminator. Returns `None` for unknown kinds.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(EventKind::Ready),
            "state_change" => Some(EventKind::StateChange),
            "thinking" => Some(EventKind::Thinking),
            "action" => Some(EventKind::Action),
            "confirm" => Some(EventKind::Confirm),
            "ask_question" => Some(EventKind::AskQuestion),
            "finished" => Some(EventKind::Finished),
            "error" => Some(EventKind::Error),
            "screenshot_captured" => Some(EventKind::ScreenshotCaptured),
            "session_created" => Some(EventKind::SessionCreated),
            "audio_transcript" => Some(EventKind::AudioTranscript),
            "video_frame" => Some(EventKind::VideoFrame),
            "speech_started" => Some(EventKind::SpeechStarted),
            "speech_finished" => Some(EventKind::SpeechFinished),
            "turn_detected" => Some(EventKind::TurnDetected),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_accessor_covers_all_variants() {
        let events = vec![
            Event::Ready { step: 1 },
            Event::Thinking {
                step: 2,
                text: "hmm".into(),
            },
            Event::SpeechStarted { step: 3 },
            Event::TurnDetected { step: 4 },
        ];
        let steps: Vec<u64> = events.iter().map(Event::step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4]);
    }

    #[test]
    fn kind_wire_roundtrip() {
        for kind in [
            EventKind::Ready,
            EventKind::StateChange,
            EventKind::Thinking,
            EventKind::Action,
            EventKind::Confirm,
            EventKind::AskQuestion,
            EventKind::Finished,
            EventKind::Error,
            EventKind::ScreenshotCaptured,
            EventKind::SessionCreated,
            EventKind::AudioTranscript,
            EventKind::VideoFrame,
            EventKind::SpeechStarted,
            EventKind::SpeechFinished,
            EventKind::TurnDetected,
        ] {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("telemetry"), None);
    }
}
