//! Pull-based runbook execution engine
//!
//! Drives a stack of frames through their deterministic actions and stops at
//! every point that needs the external decision-maker: a judgment step, a
//! manual runbook becoming active, or an escalated action failure. Nothing
//! in this module knows about recording or replay.

pub mod core;

use crate::effect::Judgment;
use crate::loader::LoadError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to the controlling caller
///
/// Action failures never appear here; they are absorbed into the failing
/// frame's escalation state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller invoked the wrong resume operation for the current frame
    #[error("Invalid engine state: {0}")]
    InvalidState(String),
    /// Judgment outputs did not cover every expected key
    #[error("Incomplete judgment outputs, missing: {}", missing.join(", "))]
    IncompleteJudgmentOutputs {
        /// Expected keys absent from the supplied outputs
        missing: Vec<String>,
    },
    /// A top-level push referenced a runbook that could not be loaded
    #[error("Runbook load failed: {0}")]
    Load(#[from] LoadError),
    /// Replay diverged from the recorded cassette
    #[error("Replay failed: {0}")]
    Replay(#[from] crate::replay::ReplayError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Kind of work an [`ExecutedStep`] records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// A deterministic action resolved against the environment
    Action,
    /// Entry into a nested runbook invocation
    InvokeEntry,
    /// Return from a nested runbook invocation
    InvokeExit,
    /// Explicit completion of a manual or escalated frame
    ManualCompletion,
}

/// One immutable log entry for a resolved step
///
/// Accumulated in a transient buffer that is flushed into the next
/// [`RunResult`] and cleared each time control suspends. Carries no
/// timestamps so identical runs produce identical logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    /// Name of the frame the step belongs to
    pub frame_name: String,
    /// Step index within that frame at the time of execution
    pub step_index: usize,
    /// What kind of step this was
    pub kind: StepKind,
    /// Human-readable description of the step
    pub description: String,
    /// Whether the step succeeded
    pub succeeded: bool,
    /// Combined captured output, empty when none
    pub captured_output: String,
}

/// A judgment step awaiting the external decision-maker
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJudgment {
    /// The judgment effect itself
    pub judgment: Judgment,
    /// Frame that yielded it
    pub frame_name: String,
    /// Step index of the judgment within its frame
    pub step_index: usize,
    /// Human-readable stack path, e.g. `release[2] > test/nested[0]`
    pub stack_path: String,
    /// Frame source description; present only at the frame's first judgment
    pub context: Option<String>,
}

/// A manual runbook awaiting wholesale external completion
#[derive(Debug, Clone, PartialEq)]
pub struct PendingManual {
    /// Runbook name
    pub name: String,
    /// Full body, arguments already substituted
    pub body: String,
}

/// An escalated frame awaiting manual recovery
///
/// Entered when a deterministic action failed; the frame's computation is
/// abandoned and the judge works from the frame's source description.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFallback {
    /// Frame that escalated
    pub frame_name: String,
    /// Step index of the failed action
    pub step_index: usize,
    /// Human-readable stack path at the time of failure
    pub stack_path: String,
    /// The failed action's context, verbatim
    pub context: String,
    /// Description of the failed action
    pub description: String,
    /// What went wrong
    pub error: String,
    /// Captured output at the time of failure
    pub output: String,
    /// Prose description of the frame's overall work
    pub source: String,
}

/// The suspension the engine stopped on
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    /// A judgment step needs outputs; resume with `resume_after_judgment`
    Judgment(PendingJudgment),
    /// A manual runbook is active; finish with `complete_manual`
    Manual(PendingManual),
    /// An action failure escalated; finish with `complete_manual`
    Fallback(PendingFallback),
}

/// Result of driving the engine until a suspension point or completion
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Steps executed since control last suspended, in execution order
    pub executed: Vec<ExecutedStep>,
    /// The suspension reached, or `None` when every frame completed
    pub pending: Option<Pending>,
}

impl RunResult {
    /// True when the whole stack finished (nothing pending)
    pub fn completed(&self) -> bool {
        self.pending.is_none()
    }
}

/// What the external judge reports when completing a manual or escalated frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualOutcome {
    /// Optional one-line summary of the work performed
    #[serde(default)]
    pub summary: String,
}

impl ManualOutcome {
    /// Completion with a summary line
    pub fn with_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

pub use self::core::Engine;
