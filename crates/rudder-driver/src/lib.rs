//! Supervisor for an autonomous driver process.
//!
//! Spawns an externally-supplied driver executable, speaks a line-oriented
//! JSON protocol with it over piped stdio, maintains the session state
//! machine, and exposes an async, listener-based interface with ordered
//! event delivery and safe shutdown.
//!
//! # Architecture
//!
//! - [`channel::ProcessChannel`]: one spawned child with a pull-based line
//!   stream, a raw stderr stream, and a serialized write handle
//! - [`listeners::ListenerSet`]: per-event-kind observers plus awaited
//!   confirm/ask-question responders
//! - [`supervisor::DriverSupervisor`]: the state machine and public
//!   contract, driven by a single cooperative reader task
//! - [`locator::BinaryLocator`]: seam for resolving the driver executable
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use rudder_driver::DriverSupervisor;
//! use rudder_types::{DriverConfig, StartOptions};
//!
//! let supervisor = DriverSupervisor::new(DriverConfig::new("/opt/driver"));
//! supervisor.on_confirm(|req| async move {
//!     println!("approving: {}", req.reason);
//!     Some(true)
//! });
//! let outcome = supervisor.start("open the settings page", StartOptions::default()).await?;
//! println!("success: {}", outcome.success);
//! ```

pub mod channel;
pub mod error;
pub mod listeners;
pub mod locator;
pub mod supervisor;

pub use channel::{ChannelWriter, DiagnosticStream, ExitReason, LineStream, ProcessChannel};
pub use error::DriverError;
pub use listeners::{ConfirmRequest, ListenerSet, QuestionRequest};
pub use locator::{BinaryLocator, FixedPath};
pub use supervisor::DriverSupervisor;
