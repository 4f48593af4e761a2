//! Execution frames: one activation record per runbook on the stack

use crate::effect::{Effect, StepResult};
use crate::logic::{LogicStep, RunbookLogic};

/// Terminal escalation state for a computation frame
///
/// Entered when a deterministic action fails. The computation inside the
/// frame is abandoned at this point; its remaining effects are never
/// resumed. Recovery is whole-frame: the external judge works from the
/// frame's source description and signals completion explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    /// The failed action's context, verbatim
    pub context: String,
    /// Description of the failed action itself
    pub description: String,
    /// What went wrong
    pub error: String,
    /// Captured output at the time of failure
    pub output: String,
}

/// Frame backed by a resumable computation
pub struct ComputationFrame {
    /// Runbook name this frame is executing
    pub name: String,
    /// Working directory for this frame's actions
    pub working_dir: std::path::PathBuf,
    /// Argument text the runbook was invoked with
    pub arguments: String,
    /// Static prose description of the frame's overall work, shown on escalation
    pub source: String,
    logic: Box<dyn RunbookLogic>,
    current: Option<Effect>,
    started: bool,
    step_index: usize,
    source_shown: bool,
    /// Escalation state; terminal once set
    pub fallback: Option<Fallback>,
}

impl ComputationFrame {
    /// Create a frame over a computation handle
    pub fn new(
        name: impl Into<String>,
        working_dir: std::path::PathBuf,
        arguments: impl Into<String>,
        source: impl Into<String>,
        logic: Box<dyn RunbookLogic>,
    ) -> Self {
        Self {
            name: name.into(),
            working_dir,
            arguments: arguments.into(),
            source: source.into(),
            logic,
            current: None,
            started: false,
            step_index: 0,
            source_shown: false,
            fallback: None,
        }
    }

    /// Current step index within the runbook
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// The effect this frame is suspended on, starting the computation lazily
    ///
    /// Returns `None` once the computation has finished.
    pub fn current_effect(&mut self) -> Option<&Effect> {
        if !self.started {
            self.started = true;
            match self.logic.resume(None) {
                LogicStep::Yield(effect) => self.current = Some(effect),
                LogicStep::Finished => self.current = None,
            }
        }
        self.current.as_ref()
    }

    /// Frame source to accompany a judgment, shown once per frame
    ///
    /// Present until the frame's first judgment is resolved, so every
    /// rendering of that judgment carries the same context.
    pub fn source_context(&self) -> Option<&str> {
        if self.source_shown || self.source.is_empty() {
            None
        } else {
            Some(&self.source)
        }
    }

    /// Feed the result of the current effect in and advance to the next
    pub fn advance(&mut self, result: StepResult) {
        if matches!(result, StepResult::Judgment(_)) {
            self.source_shown = true;
        }
        match self.logic.resume(Some(result)) {
            LogicStep::Yield(effect) => {
                self.current = Some(effect);
                self.step_index += 1;
            }
            LogicStep::Finished => self.current = None,
        }
    }
}

impl std::fmt::Debug for ComputationFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputationFrame")
            .field("name", &self.name)
            .field("step_index", &self.step_index)
            .field("current", &self.current)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Frame with no computation behind it
///
/// Its whole body is delegated to the external judge in one piece; the frame
/// completes only through an explicit completion signal and never advances
/// by step count.
#[derive(Debug)]
pub struct ManualFrame {
    /// Runbook name this frame stands for
    pub name: String,
    /// Working directory recorded for the frame
    pub working_dir: std::path::PathBuf,
    /// Argument text the runbook was invoked with
    pub arguments: String,
    /// Full prose body, with arguments already substituted by the loader
    pub body: String,
}

/// One activation record on the execution stack
#[derive(Debug)]
pub enum Frame {
    /// Backed by a resumable computation
    Computation(ComputationFrame),
    /// Atomic, externally resolved
    Manual(ManualFrame),
}

impl Frame {
    /// Runbook name of this frame
    pub fn name(&self) -> &str {
        match self {
            Frame::Computation(f) => &f.name,
            Frame::Manual(f) => &f.name,
        }
    }

    /// Working directory of this frame
    pub fn working_dir(&self) -> &std::path::Path {
        match self {
            Frame::Computation(f) => &f.working_dir,
            Frame::Manual(f) => &f.working_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{Action, ActionOutcome, Effect, ShellResult, StepResult};
    use crate::logic::SequenceLogic;
    use std::path::PathBuf;

    fn frame_with(effects: Vec<Effect>) -> ComputationFrame {
        ComputationFrame::new(
            "demo",
            PathBuf::from("/tmp"),
            "",
            "Demo runbook",
            Box::new(SequenceLogic::new(effects)),
        )
    }

    #[test]
    fn test_lazy_start_and_advance() {
        let mut frame = frame_with(vec![
            Effect::Action(Action::command("echo 1", "first")),
            Effect::Action(Action::command("echo 2", "second")),
        ]);
        assert_eq!(frame.step_index(), 0);

        let first = frame.current_effect().cloned().unwrap();
        assert!(matches!(first, Effect::Action(_)));

        frame.advance(StepResult::Action(ActionOutcome::Shell(ShellResult {
            success: true,
            exit_code: 0,
            output: "1\n".to_string(),
        })));
        assert_eq!(frame.step_index(), 1);
        assert!(frame.current_effect().is_some());
    }

    #[test]
    fn test_exhausted_computation_returns_none() {
        let mut frame = frame_with(vec![]);
        assert!(frame.current_effect().is_none());
        // Repeated peeks stay None without touching the logic again
        assert!(frame.current_effect().is_none());
    }
}
