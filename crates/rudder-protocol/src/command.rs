//! Commands sent to the driver process.

use serde_json::{json, Map, Value};

use rudder_types::Platform;

/// One command from the supervisor to the driver process.
///
/// `Start` is the richest command; everything else is either a bare verb
/// or a small response payload. Encoding is total: every well-formed
/// command value renders to a single JSON line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Begin working on a goal. Sent once, after the first `ready` event.
    Start {
        session_id: String,
        goal: String,
        screenshot: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        platform: Platform,
        model: Option<String>,
        /// Opaque multimodal configuration forwarded without
        /// interpretation.
        options: Option<Value>,
    },
    /// Push a fresh screenshot to the driver.
    Screenshot {
        data: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    /// Ask the driver to pause after the current step.
    Pause,
    /// Ask a paused driver to continue.
    Resume,
    /// Ask the driver to wind down.
    Stop { reason: Option<String> },
    /// Response to a `confirm` event.
    Confirm {
        approved: bool,
        message: Option<String>,
    },
    /// Response to an `ask_question` event.
    Answer {
        text: String,
        question_id: Option<String>,
    },
    /// Pull-style request for a `screenshot_captured` event.
    RequestScreenshot,
    /// Pull-style request for a `video_frame` event.
    RequestVideoFrame,
}

impl Command {
    /// The wire discriminator for this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Screenshot { .. } => "screenshot",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop { .. } => "stop",
            Command::Confirm { .. } => "confirm",
            Command::Answer { .. } => "answer",
            Command::RequestScreenshot => "request_screenshot",
            Command::RequestVideoFrame => "request_video_frame",
        }
    }

    /// Build the JSON document for this command. Optional fields that are
    /// unset are omitted rather than serialized as null.
    pub fn to_value(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("command".into(), json!(self.kind()));

        match self {
            Command::Start {
                session_id,
                goal,
                screenshot,
                width,
                height,
                platform,
                model,
                options,
            } => {
                doc.insert("session_id".into(), json!(session_id));
                doc.insert("goal".into(), json!(goal));
                if let Some(shot) = screenshot {
                    doc.insert("screenshot".into(), json!(shot));
                }
                if let Some(w) = width {
                    doc.insert("width".into(), json!(w));
                }
                if let Some(h) = height {
                    doc.insert("height".into(), json!(h));
                }
                doc.insert("platform".into(), json!(platform.as_str()));
                if let Some(model) = model {
                    doc.insert("model".into(), json!(model));
                }
                if let Some(options) = options {
                    doc.insert("options".into(), options.clone());
                }
            }
            Command::Screenshot {
                data,
                width,
                height,
            } => {
                doc.insert("data".into(), json!(data));
                if let Some(w) = width {
                    doc.insert("width".into(), json!(w));
                }
                if let Some(h) = height {
                    doc.insert("height".into(), json!(h));
                }
            }
            Command::Stop { reason } => {
                if let Some(reason) = reason {
                    doc.insert("reason".into(), json!(reason));
                }
            }
            Command::Confirm { approved, message } => {
                doc.insert("approved".into(), json!(approved));
                if let Some(message) = message {
                    doc.insert("message".into(), json!(message));
                }
            }
            Command::Answer { text, question_id } => {
                doc.insert("text".into(), json!(text));
                if let Some(id) = question_id {
                    doc.insert("question_id".into(), json!(id));
                }
            }
            Command::Pause
            | Command::Resume
            | Command::RequestScreenshot
            | Command::RequestVideoFrame => {}
        }

        Value::Object(doc)
    }
}
