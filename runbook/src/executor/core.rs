//! Core engine logic: the frame stack and its resume operations

use super::{
    EngineError, EngineResult, ExecutedStep, ManualOutcome, Pending, PendingFallback,
    PendingJudgment, PendingManual, RunResult, StepKind,
};
use crate::bridge::{BridgeError, EnvironmentBridge};
use crate::effect::{
    Action, Effect, Invoke, InvokeOutcome, JudgmentOutputs, StepResult,
};
use crate::frame::{ComputationFrame, Fallback, Frame, ManualFrame};
use crate::loader::{LoadedRunbook, RunbookLoader};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// What the run loop decided to do after inspecting the active frame
enum Decision {
    Complete,
    Suspend(Pending),
    PopCompleted,
    EnterInvoke(Invoke),
    RunAction(Action, PathBuf),
}

/// The execution engine
///
/// Owns the frame stack and the transient executed-step buffer. One engine
/// instance is exclusively owned by one external controller; only one call
/// into the public surface may be in flight at a time, and the engine does
/// not defend against violations with its own synchronization.
pub struct Engine {
    stack: Vec<Frame>,
    loader: Arc<dyn RunbookLoader>,
    bridge: Arc<dyn EnvironmentBridge>,
    working_dir: PathBuf,
    recent: Vec<ExecutedStep>,
}

impl Engine {
    /// Create an engine with the given loader, bridge, and base working directory
    pub fn new(
        loader: Arc<dyn RunbookLoader>,
        bridge: Arc<dyn EnvironmentBridge>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            stack: Vec::new(),
            loader,
            bridge,
            working_dir,
            recent: Vec::new(),
        }
    }

    /// Base working directory actions run in when no override applies
    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    /// Current nesting depth (0 = idle, 1 = root runbook)
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Name of the root runbook, or `None` when idle
    pub fn root_name(&self) -> Option<&str> {
        self.stack.first().map(Frame::name)
    }

    /// Name of the currently active runbook, or `None` when idle
    pub fn current_name(&self) -> Option<&str> {
        self.stack.last().map(Frame::name)
    }

    /// Human-readable path through the frame stack
    ///
    /// Example: `release[2] > test/nested[0] > triage`
    pub fn stack_path(&self) -> String {
        let parts: Vec<String> = self
            .stack
            .iter()
            .map(|frame| match frame {
                Frame::Computation(f) => format!("{}[{}]", f.name, f.step_index()),
                Frame::Manual(f) => f.name.clone(),
            })
            .collect();
        parts.join(" > ")
    }

    /// The suspension the active frame is currently at, if any
    ///
    /// Read-only companion to [`Engine::run_until_suspend`]; does not touch
    /// the executed-step buffer.
    pub fn pending(&mut self) -> Option<Pending> {
        let stack_path = self.stack_path();
        let frame = self.stack.last_mut()?;
        match frame {
            Frame::Manual(manual) => Some(Pending::Manual(PendingManual {
                name: manual.name.clone(),
                body: manual.body.clone(),
            })),
            Frame::Computation(frame) => {
                if let Some(fallback) = &frame.fallback {
                    return Some(Pending::Fallback(pending_fallback(
                        frame, fallback, stack_path,
                    )));
                }
                match frame.current_effect() {
                    Some(Effect::Judgment(judgment)) => {
                        let judgment = judgment.clone();
                        Some(Pending::Judgment(PendingJudgment {
                            judgment,
                            frame_name: frame.name.clone(),
                            step_index: frame.step_index(),
                            stack_path,
                            context: frame.source_context().map(String::from),
                        }))
                    }
                    _ => None,
                }
            }
        }
    }

    /// Load and push a new frame, making it the active top
    ///
    /// Runs nothing by itself. Pushing while a run is already active stacks
    /// the new frame as a nested frame: the suspended parent is revisited
    /// when the child completes and only auto-advances if its own current
    /// effect was an invocation.
    pub fn push(
        &mut self,
        name: &str,
        arguments: &str,
        working_dir: Option<PathBuf>,
    ) -> EngineResult<()> {
        let working_dir = working_dir.unwrap_or_else(|| self.working_dir.clone());
        let loaded = self.loader.load(name, arguments)?;
        self.push_loaded(name, arguments, working_dir, loaded);
        Ok(())
    }

    fn push_loaded(
        &mut self,
        name: &str,
        arguments: &str,
        working_dir: PathBuf,
        loaded: LoadedRunbook,
    ) {
        tracing::info!("Pushing runbook frame: {} (depth {})", name, self.stack.len() + 1);
        match loaded {
            LoadedRunbook::Computation { logic, source } => {
                self.stack.push(Frame::Computation(ComputationFrame::new(
                    name,
                    working_dir,
                    arguments,
                    source,
                    logic,
                )));
            }
            LoadedRunbook::Manual { body } => {
                self.stack.push(Frame::Manual(ManualFrame {
                    name: name.to_string(),
                    working_dir,
                    arguments: arguments.to_string(),
                    body,
                }));
            }
        }
    }

    /// Drive the active frame forward until a suspension point or completion
    ///
    /// Actions resolve synchronously against the environment bridge, one
    /// [`ExecutedStep`] each in yield order. Nested invocations push a child
    /// frame and continue inside it. A judgment, an active manual frame, or
    /// an escalated action failure suspends and returns control.
    pub async fn run_until_suspend(&mut self) -> EngineResult<RunResult> {
        loop {
            let decision = self.next_decision();
            match decision {
                Decision::Complete => {
                    tracing::info!("All runbook frames completed");
                    return Ok(self.build_result(None));
                }
                Decision::Suspend(pending) => {
                    return Ok(self.build_result(Some(pending)));
                }
                Decision::PopCompleted => {
                    self.pop_completed();
                }
                Decision::EnterInvoke(invoke) => {
                    self.enter_invoke(invoke);
                }
                Decision::RunAction(action, working_dir) => {
                    self.run_action(action, working_dir).await?;
                }
            }
        }
    }

    /// Inspect the active frame and decide the next loop step
    fn next_decision(&mut self) -> Decision {
        let stack_path = self.stack_path();
        let Some(frame) = self.stack.last_mut() else {
            return Decision::Complete;
        };
        match frame {
            Frame::Manual(manual) => Decision::Suspend(Pending::Manual(PendingManual {
                name: manual.name.clone(),
                body: manual.body.clone(),
            })),
            Frame::Computation(frame) => {
                if let Some(fallback) = &frame.fallback {
                    return Decision::Suspend(Pending::Fallback(pending_fallback(
                        frame, fallback, stack_path,
                    )));
                }
                let working_dir = frame.working_dir.clone();
                match frame.current_effect() {
                    None => Decision::PopCompleted,
                    Some(Effect::Judgment(judgment)) => {
                        let judgment = judgment.clone();
                        Decision::Suspend(Pending::Judgment(PendingJudgment {
                            judgment,
                            frame_name: frame.name.clone(),
                            step_index: frame.step_index(),
                            stack_path,
                            context: frame.source_context().map(String::from),
                        }))
                    }
                    Some(Effect::Invoke(invoke)) => Decision::EnterInvoke(invoke.clone()),
                    Some(Effect::Action(action)) => {
                        Decision::RunAction(action.clone(), working_dir)
                    }
                }
            }
        }
    }

    /// Execute one deterministic action for the active frame
    ///
    /// A successful outcome is logged and fed back into the computation. An
    /// unsuccessful outcome or an environment error moves the frame into its
    /// escalation state; only a replay divergence propagates as an error.
    async fn run_action(&mut self, action: Action, working_dir: PathBuf) -> EngineResult<()> {
        tracing::debug!("Executing action: {}", action.describe());
        let result = self.bridge.execute(&action, &working_dir).await;

        let Some(Frame::Computation(frame)) = self.stack.last_mut() else {
            // The stack cannot change under us mid-action; the active frame
            // that yielded the action is still on top.
            unreachable!("active computation frame disappeared during action");
        };

        match result {
            Ok(outcome) if outcome.succeeded() => {
                self.recent.push(ExecutedStep {
                    frame_name: frame.name.clone(),
                    step_index: frame.step_index(),
                    kind: StepKind::Action,
                    description: action.describe(),
                    succeeded: true,
                    captured_output: outcome.output().to_string(),
                });
                frame.advance(StepResult::Action(outcome));
            }
            Ok(outcome) => {
                tracing::warn!(
                    "Action failed, escalating frame '{}': {}",
                    frame.name,
                    outcome.failure_reason()
                );
                frame.fallback = Some(Fallback {
                    context: action.context.clone(),
                    description: action.describe(),
                    error: outcome.failure_reason(),
                    output: outcome.output().to_string(),
                });
            }
            Err(BridgeError::Replay(error)) => return Err(EngineError::Replay(error)),
            Err(error) => {
                tracing::warn!(
                    "Environment error, escalating frame '{}': {}",
                    frame.name,
                    error
                );
                frame.fallback = Some(Fallback {
                    context: action.context.clone(),
                    description: action.describe(),
                    error: error.to_string(),
                    output: String::new(),
                });
            }
        }
        Ok(())
    }

    /// Push the child frame for a nested invocation
    ///
    /// A load failure never escalates the parent; it resolves the invocation
    /// with an aborted outcome so the parent can react.
    fn enter_invoke(&mut self, invoke: Invoke) {
        let (parent_name, parent_step, parent_dir) = match self.stack.last() {
            Some(Frame::Computation(f)) => {
                (f.name.clone(), f.step_index(), f.working_dir.clone())
            }
            _ => unreachable!("invoke effect without an active computation frame"),
        };

        self.recent.push(ExecutedStep {
            frame_name: parent_name.clone(),
            step_index: parent_step,
            kind: StepKind::InvokeEntry,
            description: invoke.describe(),
            succeeded: true,
            captured_output: String::new(),
        });

        match self.loader.load(&invoke.name, &invoke.arguments) {
            Ok(loaded) => {
                let child_dir = invoke.working_dir.clone().unwrap_or(parent_dir);
                self.push_loaded(&invoke.name, &invoke.arguments, child_dir, loaded);
            }
            Err(error) => {
                let outcome = InvokeOutcome {
                    success: false,
                    summary: error.to_string(),
                    aborted: true,
                    steps_executed: 0,
                    error: Some(error.to_string()),
                };
                self.recent.push(ExecutedStep {
                    frame_name: parent_name,
                    step_index: parent_step,
                    kind: StepKind::InvokeExit,
                    description: invoke.describe(),
                    succeeded: false,
                    captured_output: String::new(),
                });
                if let Some(Frame::Computation(parent)) = self.stack.last_mut() {
                    parent.advance(StepResult::Invoke(outcome));
                }
            }
        }
    }

    /// Pop a computation frame whose logic ran to completion
    ///
    /// The parent auto-advances only when its own current effect was the
    /// invocation that pushed this child; a frame stacked on top of a
    /// judgment-suspended parent pops silently and the parent stays
    /// suspended on its judgment.
    fn pop_completed(&mut self) {
        let Some(Frame::Computation(completed)) = self.stack.pop() else {
            unreachable!("pop_completed on a non-computation frame");
        };
        let steps_executed = completed.step_index();
        tracing::info!(
            "Runbook '{}' completed in {} steps",
            completed.name,
            steps_executed
        );

        let outcome = InvokeOutcome {
            success: true,
            summary: format!("Completed {} in {} steps", completed.name, steps_executed),
            aborted: false,
            steps_executed,
            error: None,
        };
        self.advance_parent_past_invoke(outcome, true);
    }

    /// If the parent frame is suspended on an invocation, resolve it
    fn advance_parent_past_invoke(&mut self, outcome: InvokeOutcome, succeeded: bool) {
        let Some(Frame::Computation(parent)) = self.stack.last_mut() else {
            return;
        };
        let Some(Effect::Invoke(invoke)) = parent.current_effect().cloned() else {
            return;
        };
        let step = ExecutedStep {
            frame_name: parent.name.clone(),
            step_index: parent.step_index(),
            kind: StepKind::InvokeExit,
            description: invoke.describe(),
            succeeded,
            captured_output: String::new(),
        };
        parent.advance(StepResult::Invoke(outcome));
        self.recent.push(step);
    }

    /// Resume the active frame after the external judge resolved its judgment
    ///
    /// Validates that `outputs` covers every expected key before any data is
    /// fed into the computation, then continues like
    /// [`Engine::run_until_suspend`].
    pub async fn resume_after_judgment(
        &mut self,
        outputs: BTreeMap<String, String>,
    ) -> EngineResult<RunResult> {
        let judgment = {
            let Some(frame) = self.stack.last_mut() else {
                return Err(EngineError::InvalidState(
                    "no runbook is running".to_string(),
                ));
            };
            let Frame::Computation(frame) = frame else {
                return Err(EngineError::InvalidState(
                    "a manual runbook is pending; call complete_manual instead".to_string(),
                ));
            };
            if frame.fallback.is_some() {
                return Err(EngineError::InvalidState(
                    "the runbook escalated to manual recovery; call complete_manual instead"
                        .to_string(),
                ));
            }
            match frame.current_effect() {
                Some(Effect::Judgment(judgment)) => judgment.clone(),
                _ => {
                    return Err(EngineError::InvalidState(
                        "the active runbook is not suspended on a judgment".to_string(),
                    ));
                }
            }
        };

        let missing: Vec<String> = judgment
            .expects
            .keys()
            .filter(|key| !outputs.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::IncompleteJudgmentOutputs { missing });
        }

        if let Some(Frame::Computation(frame)) = self.stack.last_mut() {
            frame.advance(StepResult::Judgment(JudgmentOutputs::new(outputs)));
        }
        self.run_until_suspend().await
    }

    /// Complete the active manual or escalated frame
    ///
    /// Records a completion step, pops the frame, auto-advances the parent
    /// only past an invocation effect, then continues like
    /// [`Engine::run_until_suspend`].
    pub async fn complete_manual(&mut self, outcome: ManualOutcome) -> EngineResult<RunResult> {
        match self.stack.last() {
            Some(Frame::Manual(_)) => self.complete_manual_frame(outcome).await,
            Some(Frame::Computation(frame)) if frame.fallback.is_some() => {
                self.complete_escalated_frame(outcome).await
            }
            Some(Frame::Computation(_)) => Err(EngineError::InvalidState(
                "the active runbook is computation-backed; use resume_after_judgment".to_string(),
            )),
            None => Err(EngineError::InvalidState(
                "no runbook is running".to_string(),
            )),
        }
    }

    async fn complete_manual_frame(&mut self, outcome: ManualOutcome) -> EngineResult<RunResult> {
        let Some(Frame::Manual(manual)) = self.stack.pop() else {
            unreachable!("checked above");
        };
        tracing::info!("Manual runbook '{}' completed", manual.name);

        self.recent.push(ExecutedStep {
            frame_name: manual.name.clone(),
            step_index: 0,
            kind: StepKind::ManualCompletion,
            description: manual.name.clone(),
            succeeded: true,
            captured_output: outcome.summary.clone(),
        });

        let summary = if outcome.summary.is_empty() {
            format!("Completed: {}", manual.name)
        } else {
            outcome.summary
        };
        self.advance_parent_past_invoke(
            InvokeOutcome {
                success: true,
                summary,
                aborted: false,
                steps_executed: 1,
                error: None,
            },
            true,
        );
        self.run_until_suspend().await
    }

    async fn complete_escalated_frame(
        &mut self,
        outcome: ManualOutcome,
    ) -> EngineResult<RunResult> {
        let Some(Frame::Computation(frame)) = self.stack.pop() else {
            unreachable!("checked above");
        };
        let Some(fallback) = frame.fallback.clone() else {
            unreachable!("checked above");
        };
        tracing::info!(
            "Escalated runbook '{}' completed manually after: {}",
            frame.name,
            fallback.error
        );

        self.recent.push(ExecutedStep {
            frame_name: frame.name.clone(),
            step_index: frame.step_index(),
            kind: StepKind::ManualCompletion,
            description: frame.name.clone(),
            succeeded: true,
            captured_output: outcome.summary,
        });

        self.advance_parent_past_invoke(
            InvokeOutcome {
                success: false,
                summary: format!("Completed with fallback: {}", frame.name),
                aborted: false,
                steps_executed: frame.step_index() + 1,
                error: Some(fallback.error.clone()),
            },
            false,
        );
        self.run_until_suspend().await
    }

    /// Build a result, flushing and clearing the transient step buffer
    fn build_result(&mut self, pending: Option<Pending>) -> RunResult {
        RunResult {
            executed: std::mem::take(&mut self.recent),
            pending,
        }
    }
}

fn pending_fallback(
    frame: &ComputationFrame,
    fallback: &Fallback,
    stack_path: String,
) -> PendingFallback {
    PendingFallback {
        frame_name: frame.name.clone(),
        step_index: frame.step_index(),
        stack_path,
        context: fallback.context.clone(),
        description: fallback.description.clone(),
        error: fallback.error.clone(),
        output: fallback.output.clone(),
        source: frame.source.clone(),
    }
}
