//! Environment-driven configuration for the record/replay harness

use std::path::PathBuf;

/// Environment variable naming the cassette file; setting it enables recording
pub const CASSETTE_ENV: &str = "RUNBOOK_CASSETTE";

/// Whether a cassette records new events or replays recorded ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Capture boundary crossings into the cassette file
    Record,
    /// Answer boundary crossings from the cassette file
    Replay,
}

impl std::fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayMode::Record => write!(f, "record"),
            ReplayMode::Replay => write!(f, "replay"),
        }
    }
}

/// Cassette path from the environment, if recording was requested
pub fn cassette_path_from_env() -> Option<PathBuf> {
    match std::env::var(CASSETTE_ENV) {
        Ok(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
