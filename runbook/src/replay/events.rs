//! Typed cassette events, one per boundary crossing
//!
//! Events serialize to YAML maps with a `type` tag. The recorded order is
//! the replay order; no event carries timing or host identity beyond the
//! working directory an action ran in.

use crate::bridge::{BridgeError, BridgeResult};
use crate::effect::{ActionOutcome, CallResult, Operation, ShellResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Execution state captured when recording starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    /// Base working directory of the recorded run
    pub working_dir: String,
}

/// The outcome recorded for one action execution
///
/// Mirrors [`ActionOutcome`] plus a variant for environment errors, which
/// are recorded too so a failing run replays identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedOutcome {
    /// A shell command ran to an exit status
    Shell(ShellResult),
    /// A host function call returned or errored
    Call(CallResult),
    /// The environment itself failed to perform the action
    Error {
        /// Error description, replayed verbatim
        error: String,
    },
}

impl RecordedOutcome {
    /// Reconstruct the bridge-level result this outcome was recorded from
    pub fn into_result(self) -> BridgeResult<ActionOutcome> {
        match self {
            RecordedOutcome::Shell(result) => Ok(ActionOutcome::Shell(result)),
            RecordedOutcome::Call(result) => Ok(ActionOutcome::Call(result)),
            RecordedOutcome::Error { error } => Err(BridgeError::Recorded(error)),
        }
    }
}

impl From<&ActionOutcome> for RecordedOutcome {
    fn from(outcome: &ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Shell(result) => RecordedOutcome::Shell(result.clone()),
            ActionOutcome::Call(result) => RecordedOutcome::Call(result.clone()),
        }
    }
}

/// One recorded boundary crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Inbound: caller pushed a runbook and ran it
    Push {
        /// Runbook name as the caller gave it
        name: String,
        /// Argument text
        #[serde(default)]
        arguments: String,
        /// Optional working directory override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
    },
    /// Inbound: caller resolved a judgment and resumed
    ResumeAfterJudgment {
        /// Judgment outputs supplied by the caller
        #[serde(default)]
        outputs: BTreeMap<String, String>,
    },
    /// Inbound: caller completed a manual or escalated frame
    CompleteManual {
        /// One-line completion summary
        #[serde(default)]
        summary: String,
    },
    /// Inbound: caller asked for the current execution status
    Status,
    /// Outbound: the rendered response handed back to the caller
    CallerOutput {
        /// The full response string, compared byte for byte on replay
        output: String,
    },
    /// Environment boundary: one action execution and its outcome
    Action {
        /// Working directory the action ran in
        working_dir: String,
        /// What was executed
        operation: Operation,
        /// The action's context, verbatim
        context: String,
        /// What the environment returned
        outcome: RecordedOutcome,
    },
}

impl Event {
    /// Short label for the event kind, used in mismatch reports
    pub fn label(&self) -> &'static str {
        match self {
            Event::Push { .. } => "push",
            Event::ResumeAfterJudgment { .. } => "resume_after_judgment",
            Event::CompleteManual { .. } => "complete_manual",
            Event::Status => "status",
            Event::CallerOutput { .. } => "caller_output",
            Event::Action { .. } => "action",
        }
    }

    /// Whether this event is an inbound caller operation
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            Event::Push { .. }
                | Event::ResumeAfterJudgment { .. }
                | Event::CompleteManual { .. }
                | Event::Status
        )
    }
}

/// On-disk cassette shape: the initial state header plus the event list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CassetteFile {
    /// Execution state captured when recording started
    pub initial_state: InitialState,
    /// Recorded events in wall-clock order
    pub events: Vec<Event>,
}
