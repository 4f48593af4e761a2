//! Cassette wrapper for the environment boundary
//!
//! Record mode delegates to a real bridge and records every outcome,
//! failures included. Replay mode holds no real bridge at all; outcomes come
//! from the cassette after the action is verified against what was recorded.

use super::cassette::SharedCassette;
use super::config::ReplayMode;
use super::events::{Event, RecordedOutcome};
use super::{ReplayError, ReplayResult};
use crate::bridge::{BridgeError, BridgeResult, EnvironmentBridge};
use crate::effect::{Action, ActionOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Environment bridge that records or replays through a cassette
pub struct CassetteBridge {
    cassette: SharedCassette,
    inner: Option<Arc<dyn EnvironmentBridge>>,
}

impl CassetteBridge {
    /// Recording bridge: delegates to `inner` and records each outcome
    pub fn record(
        cassette: SharedCassette,
        inner: Arc<dyn EnvironmentBridge>,
    ) -> ReplayResult<Self> {
        if cassette.lock().mode() != ReplayMode::Record {
            return Err(ReplayError::Misconfigured(
                "recording bridge requires a record-mode cassette".to_string(),
            ));
        }
        Ok(Self {
            cassette,
            inner: Some(inner),
        })
    }

    /// Replaying bridge: no real environment behind it, ever
    pub fn replay(cassette: SharedCassette) -> ReplayResult<Self> {
        if cassette.lock().mode() != ReplayMode::Replay {
            return Err(ReplayError::Misconfigured(
                "replaying bridge requires a replay-mode cassette".to_string(),
            ));
        }
        Ok(Self {
            cassette,
            inner: None,
        })
    }

    fn replay_outcome(
        &self,
        action: &Action,
        working_dir: &Path,
    ) -> Result<RecordedOutcome, ReplayError> {
        let event = self.cassette.lock().consume()?;
        let Event::Action {
            working_dir: recorded_dir,
            operation,
            context,
            outcome,
        } = event
        else {
            return Err(ReplayError::UnexpectedEvent {
                expected: "action",
                actual: event.label().to_string(),
            });
        };

        if operation != action.operation {
            return Err(ReplayError::Mismatch {
                what: "action operation",
                expected: operation.describe(),
                actual: action.operation.describe(),
            });
        }
        if context != action.context {
            return Err(ReplayError::Mismatch {
                what: "action context",
                expected: context,
                actual: action.context.clone(),
            });
        }
        let actual_dir = working_dir.display().to_string();
        if recorded_dir != actual_dir {
            return Err(ReplayError::Mismatch {
                what: "action working_dir",
                expected: recorded_dir,
                actual: actual_dir,
            });
        }
        Ok(outcome)
    }
}

#[async_trait]
impl EnvironmentBridge for CassetteBridge {
    async fn execute(&self, action: &Action, working_dir: &Path) -> BridgeResult<ActionOutcome> {
        let Some(inner) = &self.inner else {
            return self.replay_outcome(action, working_dir)?.into_result();
        };

        let result = inner.execute(action, working_dir).await;

        let recorded = match &result {
            Ok(outcome) => RecordedOutcome::from(outcome),
            Err(error) => RecordedOutcome::Error {
                error: error.to_string(),
            },
        };
        {
            let mut cassette = self.cassette.lock();
            cassette
                .record_event(Event::Action {
                    working_dir: working_dir.display().to_string(),
                    operation: action.operation.clone(),
                    context: action.context.clone(),
                    outcome: recorded,
                })
                .map_err(BridgeError::Replay)?;
            cassette.save().map_err(BridgeError::Replay)?;
        }
        result
    }
}
