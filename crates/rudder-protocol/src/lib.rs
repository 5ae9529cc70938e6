//! Line-oriented JSON wire protocol spoken with a driver process.
//!
//! One complete JSON document per newline-terminated line, in each
//! direction. Messages form two disjoint tagged-union families:
//!
//! - [`Event`]: process → supervisor, discriminated by the `"event"`
//!   field, always stamped with a monotonically non-decreasing `step`.
//! - [`Command`]: supervisor → process, discriminated by the `"command"`
//!   field.
//!
//! The codec is pure and stateless: [`decode_event`] turns one line of
//! text into a typed event (or classifies why it could not), and
//! [`encode_command`] renders a command back to a single line. Blank
//! lines decode to "no message" rather than an error.

pub mod codec;
pub mod command;
pub mod error;
pub mod event;

pub use codec::{decode_event, encode_command};
pub use command::Command;
pub use error::ProtocolError;
pub use event::{Event, EventKind};
