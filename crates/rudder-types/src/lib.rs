//! Core types shared across the rudder crates.
//!
//! Defines the driver session state machine, session identifiers, driver
//! configuration, and the start options/outcome exchanged with the
//! supervisor.

pub mod config;
pub mod ids;
pub mod session;
pub mod state;

pub use config::{ConfigError, DriverConfig, Platform};
pub use ids::SessionId;
pub use session::{StartOptions, StartOutcome};
pub use state::DriverState;
