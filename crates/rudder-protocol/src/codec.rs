//! Line codec: one JSON document per newline-terminated line.
//!
//! Decoding parses the line, classifies it by the `"event"` discriminator,
//! and extracts the fields the named kind requires. Fields a kind does not
//! use are ignored; required fields that are absent or mistyped produce a
//! [`ProtocolError`]. A blank or whitespace-only line decodes to "no
//! message". The codec performs no I/O and holds no state.

use serde_json::Value;

use rudder_types::DriverState;

use crate::command::Command;
use crate::error::ProtocolError;
use crate::event::{Event, EventKind};

/// Decode one line of driver output.
///
/// Returns `Ok(None)` for blank lines, `Ok(Some(event))` for a valid
/// event, and a classified [`ProtocolError`] otherwise.
pub fn decode_event(line: &str) -> Result<Option<Event>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let doc: Value =
        serde_json::from_str(trimmed).map_err(|e| ProtocolError::Malformed {
            detail: e.to_string(),
        })?;

    let kind_str = doc
        .get("event")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingDiscriminator)?;

    let kind = EventKind::from_wire(kind_str).ok_or_else(|| ProtocolError::UnknownKind {
        kind: kind_str.to_string(),
    })?;

    let step = require_u64(&doc, kind, "step")?;

    let event = match kind {
        EventKind::Ready => Event::Ready { step },
        EventKind::StateChange => {
            let raw = require_str(&doc, kind, "state")?;
            let state =
                DriverState::from_wire(raw).ok_or_else(|| ProtocolError::InvalidField {
                    kind: kind.as_str(),
                    field: "state",
                    value: raw.to_string(),
                })?;
            Event::StateChange { step, state }
        }
        EventKind::Thinking => Event::Thinking {
            step,
            text: require_str(&doc, kind, "text")?.to_string(),
        },
        EventKind::Action => {
            let actions = doc
                .get("actions")
                .and_then(Value::as_array)
                .ok_or(ProtocolError::MissingField {
                    kind: kind.as_str(),
                    field: "actions",
                })?
                .clone();
            Event::Action { step, actions }
        }
        EventKind::Confirm => Event::Confirm {
            step,
            action: doc
                .get("action")
                .cloned()
                .ok_or(ProtocolError::MissingField {
                    kind: kind.as_str(),
                    field: "action",
                })?,
            reason: require_str(&doc, kind, "reason")?.to_string(),
        },
        EventKind::AskQuestion => Event::AskQuestion {
            step,
            question: require_str(&doc, kind, "question")?.to_string(),
            question_id: opt_str(&doc, "question_id"),
        },
        EventKind::Finished => Event::Finished {
            step,
            success: require_bool(&doc, kind, "success")?,
            reason: opt_str(&doc, "reason").unwrap_or_default(),
            summary: opt_str(&doc, "summary").unwrap_or_default(),
        },
        EventKind::Error => Event::Error {
            step,
            message: require_str(&doc, kind, "message")?.to_string(),
            code: opt_str(&doc, "code"),
            recoverable: doc
                .get("recoverable")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        EventKind::ScreenshotCaptured => Event::ScreenshotCaptured {
            step,
            data: require_str(&doc, kind, "data")?.to_string(),
            width: opt_u32(&doc, "width"),
            height: opt_u32(&doc, "height"),
        },
        EventKind::SessionCreated => Event::SessionCreated {
            step,
            session_id: require_str(&doc, kind, "session_id")?.to_string(),
        },
        EventKind::AudioTranscript => Event::AudioTranscript {
            step,
            text: require_str(&doc, kind, "text")?.to_string(),
            role: opt_str(&doc, "role"),
        },
        EventKind::VideoFrame => Event::VideoFrame {
            step,
            data: require_str(&doc, kind, "data")?.to_string(),
        },
        EventKind::SpeechStarted => Event::SpeechStarted { step },
        EventKind::SpeechFinished => Event::SpeechFinished { step },
        EventKind::TurnDetected => Event::TurnDetected { step },
    };

    Ok(Some(event))
}

/// Render a command to a single protocol line (no trailing newline).
///
/// Total for every well-formed [`Command`] value: the document is built
/// field by field and `Value` display cannot fail.
pub fn encode_command(command: &Command) -> String {
    command.to_value().to_string()
}

fn require_u64(doc: &Value, kind: EventKind, field: &'static str) -> Result<u64, ProtocolError> {
    doc.get(field)
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::MissingField {
            kind: kind.as_str(),
            field,
        })
}

fn require_str<'a>(
    doc: &'a Value,
    kind: EventKind,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    doc.get(field)
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField {
            kind: kind.as_str(),
            field,
        })
}

fn require_bool(doc: &Value, kind: EventKind, field: &'static str) -> Result<bool, ProtocolError> {
    doc.get(field)
        .and_then(Value::as_bool)
        .ok_or(ProtocolError::MissingField {
            kind: kind.as_str(),
            field,
        })
}

fn opt_str(doc: &Value, field: &str) -> Option<String> {
    doc.get(field).and_then(Value::as_str).map(str::to_string)
}

fn opt_u32(doc: &Value, field: &str) -> Option<u32> {
    doc.get(field)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_lines_decode_to_nothing() {
        assert!(decode_event("").unwrap().is_none());
        assert!(decode_event("   ").unwrap().is_none());
        assert!(decode_event("\t").unwrap().is_none());
    }

    #[test]
    fn crlf_line_is_tolerated() {
        let event = decode_event("{\"event\":\"ready\",\"step\":0}\r").unwrap().unwrap();
        assert_eq!(event, Event::Ready { step: 0 });
    }

    #[test]
    fn ready_fixture() {
        let event = decode_event(r#"{"event":"ready","step":0}"#).unwrap().unwrap();
        assert_eq!(event.kind(), EventKind::Ready);
        assert_eq!(event.step(), 0);
    }

    #[test]
    fn state_change_fixture() {
        let event = decode_event(r#"{"event":"state_change","step":1,"state":"running"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::StateChange {
                step: 1,
                state: DriverState::Running
            }
        );
    }

    #[test]
    fn state_change_unknown_state_is_invalid() {
        let err = decode_event(r#"{"event":"state_change","step":1,"state":"rebooting"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidField { field: "state", .. }
        ));
    }

    #[test]
    fn thinking_fixture() {
        let event = decode_event(r#"{"event":"thinking","step":2,"text":"looking around"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::Thinking {
                step: 2,
                text: "looking around".into()
            }
        );
    }

    #[test]
    fn thinking_without_text_is_missing_field() {
        let err = decode_event(r#"{"event":"thinking","step":2}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField {
                kind: "thinking",
                field: "text"
            }
        ));
    }

    #[test]
    fn action_fixture() {
        let event = decode_event(
            r#"{"event":"action","step":3,"actions":[{"type":"click","x":10,"y":20}]}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            Event::Action { step, actions } => {
                assert_eq!(step, 3);
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0]["type"], "click");
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[test]
    fn confirm_fixture() {
        let event = decode_event(
            r#"{"event":"confirm","step":4,"action":{"type":"type_text"},"reason":"entering a password"}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            Event::Confirm {
                step,
                action,
                reason,
            } => {
                assert_eq!(step, 4);
                assert_eq!(action["type"], "type_text");
                assert_eq!(reason, "entering a password");
            }
            other => panic!("expected confirm, got {other:?}"),
        }
    }

    #[test]
    fn ask_question_with_and_without_id() {
        let event = decode_event(
            r#"{"event":"ask_question","step":5,"question":"which account?","question_id":"q-1"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            Event::AskQuestion {
                step: 5,
                question: "which account?".into(),
                question_id: Some("q-1".into())
            }
        );

        let event = decode_event(r#"{"event":"ask_question","step":5,"question":"which?"}"#)
            .unwrap()
            .unwrap();
        match event {
            Event::AskQuestion { question_id, .. } => assert!(question_id.is_none()),
            other => panic!("expected ask_question, got {other:?}"),
        }
    }

    #[test]
    fn finished_fixture() {
        let event = decode_event(
            r#"{"event":"finished","step":3,"success":true,"reason":"done","summary":"ok"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            Event::Finished {
                step: 3,
                success: true,
                reason: "done".into(),
                summary: "ok".into()
            }
        );
    }

    #[test]
    fn finished_reason_and_summary_default_empty() {
        let event = decode_event(r#"{"event":"finished","step":9,"success":false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::Finished {
                step: 9,
                success: false,
                reason: String::new(),
                summary: String::new()
            }
        );
    }

    #[test]
    fn error_fixture() {
        let event = decode_event(
            r#"{"event":"error","step":1,"message":"boom","code":"x","recoverable":false}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            Event::Error {
                step: 1,
                message: "boom".into(),
                code: Some("x".into()),
                recoverable: false
            }
        );
    }

    #[test]
    fn error_recoverable_defaults_to_false() {
        let event = decode_event(r#"{"event":"error","step":2,"message":"hiccup"}"#)
            .unwrap()
            .unwrap();
        match event {
            Event::Error {
                recoverable, code, ..
            } => {
                assert!(!recoverable);
                assert!(code.is_none());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn telemetry_fixtures() {
        let event = decode_event(
            r#"{"event":"screenshot_captured","step":6,"data":"aGk=","width":800,"height":600}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            Event::ScreenshotCaptured {
                step: 6,
                data: "aGk=".into(),
                width: Some(800),
                height: Some(600)
            }
        );

        let event =
            decode_event(r#"{"event":"session_created","step":0,"session_id":"remote-1"}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            event,
            Event::SessionCreated {
                step: 0,
                session_id: "remote-1".into()
            }
        );

        let event = decode_event(
            r#"{"event":"audio_transcript","step":7,"text":"hello","role":"user"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            Event::AudioTranscript {
                step: 7,
                text: "hello".into(),
                role: Some("user".into())
            }
        );

        let event = decode_event(r#"{"event":"video_frame","step":8,"data":"AAAA"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::VideoFrame {
                step: 8,
                data: "AAAA".into()
            }
        );

        for (line, expected) in [
            (r#"{"event":"speech_started","step":9}"#, Event::SpeechStarted { step: 9 }),
            (r#"{"event":"speech_finished","step":10}"#, Event::SpeechFinished { step: 10 }),
            (r#"{"event":"turn_detected","step":11}"#, Event::TurnDetected { step: 11 }),
        ] {
            assert_eq!(decode_event(line).unwrap().unwrap(), expected);
        }
    }

    #[test]
    fn extra_fields_are_ignored() {
        let event = decode_event(
            r#"{"event":"ready","step":0,"version":"2.1","extra":{"nested":true}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event, Event::Ready { step: 0 });
    }

    #[test]
    fn non_json_is_malformed() {
        let err = decode_event("this is not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn missing_discriminator() {
        let err = decode_event(r#"{"step":1,"text":"hi"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDiscriminator));
    }

    #[test]
    fn unknown_kind() {
        let err = decode_event(r#"{"event":"teleport","step":1}"#).unwrap_err();
        match err {
            ProtocolError::UnknownKind { kind } => assert_eq!(kind, "teleport"),
            other => panic!("expected UnknownKind, got {other:?}"),
        }
    }

    #[test]
    fn missing_step() {
        let err = decode_event(r#"{"event":"ready"}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField {
                kind: "ready",
                field: "step"
            }
        ));
    }

    #[test]
    fn mistyped_step() {
        let err = decode_event(r#"{"event":"ready","step":"zero"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField { field: "step", .. }));
    }

    #[test]
    fn encode_produces_one_line() {
        let line = encode_command(&Command::Confirm {
            approved: true,
            message: None,
        });
        assert!(!line.contains('\n'));
        let doc: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(doc, json!({"command": "confirm", "approved": true}));
    }

    #[test]
    fn encode_start_parses_back() {
        let line = encode_command(&Command::Start {
            session_id: "s-1".into(),
            goal: "open a file".into(),
            screenshot: None,
            width: Some(1280),
            height: Some(720),
            platform: rudder_types::Platform::Linux,
            model: None,
            options: None,
        });
        let doc: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(doc["command"], "start");
        assert_eq!(doc["goal"], "open a file");
        assert_eq!(doc["width"], 1280);
    }
}
