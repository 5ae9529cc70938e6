//! Start options and outcome for one driver session.

use serde::{Deserialize, Serialize};

/// Optional inputs for starting a session: an initial screenshot and the
/// screen geometry the driver should plan against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartOptions {
    /// Base64-encoded initial screenshot.
    #[serde(default)]
    pub screenshot: Option<String>,
    /// Screen width in pixels.
    #[serde(default)]
    pub width: Option<u32>,
    /// Screen height in pixels.
    #[serde(default)]
    pub height: Option<u32>,
}

/// Terminal result of a driver session, taken from the `finished` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    /// Whether the driver considers the goal achieved.
    pub success: bool,
    /// Short machine-oriented reason (e.g. `"done"`, `"max_steps"`).
    pub reason: String,
    /// Human-readable summary of what happened.
    pub summary: String,
    /// Step counter at the moment the session finished.
    pub step: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_options_default_is_empty() {
        let opts = StartOptions::default();
        assert!(opts.screenshot.is_none());
        assert!(opts.width.is_none());
        assert!(opts.height.is_none());
    }

    #[test]
    fn outcome_serde_roundtrip() {
        let outcome = StartOutcome {
            success: true,
            reason: "done".into(),
            summary: "opened the settings page".into(),
            step: 12,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: StartOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
