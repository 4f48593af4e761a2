//! Resumable computation handles for compiled runbooks
//!
//! Rust has no suspendable generator on stable, so a runbook computation is
//! an explicit state object: each call to [`RunbookLogic::resume`] feeds the
//! result of the previous effect in and gets the next effect (or completion)
//! out. Hand-rolled state machines implement the trait directly;
//! [`SequenceLogic`] covers the common fixed-plan case.

use crate::effect::{Effect, StepResult};
use std::collections::VecDeque;

/// One advancement of a runbook computation
#[derive(Debug)]
pub enum LogicStep {
    /// The computation yielded its next effect and is suspended on it
    Yield(Effect),
    /// The computation ran to completion
    Finished,
}

/// A resumable runbook computation
///
/// Contract: the first `resume` call receives `None`; every later call
/// receives exactly one [`StepResult`] for the previously yielded effect.
/// After `Finished` the handle must not be resumed again.
pub trait RunbookLogic: Send {
    /// Advance the computation by one effect
    fn resume(&mut self, input: Option<StepResult>) -> LogicStep;
}

/// A computation that yields a fixed list of effects in order
///
/// Results fed back between effects are retained but do not influence the
/// plan. Useful for simple runbooks and for tests.
pub struct SequenceLogic {
    effects: VecDeque<Effect>,
    results: Vec<StepResult>,
}

impl SequenceLogic {
    /// Create a sequence over the given effects
    pub fn new(effects: Vec<Effect>) -> Self {
        Self {
            effects: effects.into(),
            results: Vec::new(),
        }
    }

    /// Results received so far, in effect order
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }
}

impl RunbookLogic for SequenceLogic {
    fn resume(&mut self, input: Option<StepResult>) -> LogicStep {
        if let Some(result) = input {
            self.results.push(result);
        }
        match self.effects.pop_front() {
            Some(effect) => LogicStep::Yield(effect),
            None => LogicStep::Finished,
        }
    }
}
