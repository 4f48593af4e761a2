//! Record/replay harness at the engine's environment boundaries
//!
//! Recording captures every boundary crossing into a cassette file: inbound
//! caller operations, action executions against the real environment, and
//! the rendered outbound responses. Replay re-runs the real engine with
//! actions answered from the cassette and asserts that every outbound
//! response is byte-identical to what was recorded. A recorded session is a
//! hermetic regression test of the whole engine.
//!
//! Two boundaries are wrapped independently:
//! - [`CassetteBridge`] sits at the environment boundary (shell commands and
//!   host function calls)
//! - [`CassetteSession`] sits at the caller boundary (the operations the
//!   external decision-maker invokes)
//!
//! Both share one [`Cassette`] so events interleave in true wall-clock order.

pub mod bridge;
pub mod cassette;
pub mod config;
pub mod events;
pub mod session;

pub use bridge::CassetteBridge;
pub use cassette::{Cassette, SharedCassette};
pub use config::{cassette_path_from_env, ReplayMode, CASSETTE_ENV};
pub use events::{CassetteFile, Event, InitialState, RecordedOutcome};
pub use session::{CassetteSession, ReplayDriver};

use thiserror::Error;

/// Errors raised by the record/replay harness
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Reading or writing the cassette file failed
    #[error("Cassette I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The cassette file is not valid YAML or has the wrong shape
    #[error("Cassette format error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// A record-mode operation was called in replay mode or vice versa
    #[error("Cassette misuse: {0}")]
    Misconfigured(String),
    /// Replay consumed past the end of the recorded events
    #[error("Replay has no remaining recorded events")]
    Exhausted,
    /// The next recorded event is of a different kind than replay reached
    #[error("Replay event mismatch: expected {expected}, got {actual}")]
    UnexpectedEvent {
        /// Event kind replay needed next
        expected: &'static str,
        /// Event kind actually recorded at this position
        actual: String,
    },
    /// A replayed value diverged from the recorded one
    #[error("Replay {what} mismatch:\nexpected: {expected}\nactual: {actual}")]
    Mismatch {
        /// Which value diverged
        what: &'static str,
        /// The recorded value
        expected: String,
        /// The value produced by this run
        actual: String,
    },
}

/// Result type for replay operations
pub type ReplayResult<T> = Result<T, ReplayError>;
