//! Error types for the rudder-protocol crate.

use thiserror::Error;

/// Errors that can occur while decoding one protocol line.
///
/// All decode failures are recoverable from the session's point of view:
/// the supervisor reports them as synthetic `parse_error` events and keeps
/// reading.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not a well-formed JSON document.
    #[error("malformed protocol line: {detail}")]
    Malformed { detail: String },

    /// The document carries no `"event"` discriminator field.
    #[error("protocol line has no \"event\" discriminator")]
    MissingDiscriminator,

    /// The discriminator named a kind this codec does not know.
    #[error("unknown event kind \"{kind}\"")]
    UnknownKind { kind: String },

    /// A field required by the event's kind is absent or mistyped.
    #[error("event \"{kind}\" is missing required field \"{field}\"")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A field is present but its value is outside the protocol's domain.
    #[error("event \"{kind}\" field \"{field}\" has invalid value {value:?}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}
