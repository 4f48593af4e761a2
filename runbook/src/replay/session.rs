//! Cassette wrapper for the caller boundary
//!
//! A [`CassetteSession`] exposes the engine's caller operations and records
//! each inbound call plus the rendered response. On replay the same real
//! engine runs (with a replaying [`CassetteBridge`] underneath) and every
//! response is compared byte for byte against the recording. The
//! [`ReplayDriver`] closes the loop by feeding the recorded inbound calls
//! back in until the cassette is exhausted.

use super::bridge::CassetteBridge;
use super::cassette::{initial_state, Cassette, SharedCassette};
use super::config::ReplayMode;
use super::events::Event;
use super::{ReplayError, ReplayResult};
use crate::bridge::EnvironmentBridge;
use crate::display::{render_pending, render_run_result};
use crate::executor::{Engine, EngineError, ManualOutcome, Pending};
use crate::loader::RunbookLoader;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Caller-facing session that records or replays through a cassette
pub struct CassetteSession {
    cassette: SharedCassette,
    engine: Engine,
}

impl CassetteSession {
    /// Recording session over a real environment bridge
    pub fn record(
        path: impl Into<PathBuf>,
        loader: Arc<dyn RunbookLoader>,
        bridge: Arc<dyn EnvironmentBridge>,
        working_dir: PathBuf,
    ) -> ReplayResult<Self> {
        let cassette = SharedCassette::new(Cassette::record(path, initial_state(&working_dir)));
        let bridge = Arc::new(CassetteBridge::record(cassette.clone(), bridge)?);
        let engine = Engine::new(loader, bridge, working_dir);
        Ok(Self { cassette, engine })
    }

    /// Replaying session; never touches a real environment
    ///
    /// The working directory comes from the cassette, not the host.
    pub fn replay(
        path: impl Into<PathBuf>,
        loader: Arc<dyn RunbookLoader>,
    ) -> ReplayResult<Self> {
        let cassette = SharedCassette::new(Cassette::replay(path)?);
        let working_dir = cassette.lock().working_dir();
        let bridge = Arc::new(CassetteBridge::replay(cassette.clone())?);
        let engine = Engine::new(loader, bridge, working_dir);
        Ok(Self { cassette, engine })
    }

    fn mode(&self) -> ReplayMode {
        self.cassette.lock().mode()
    }

    /// In record mode, append and persist an inbound event; a no-op during
    /// replay (the driver consumed the inbound event before calling us).
    ///
    /// Persisting here, not just at the end of the call, keeps the cassette
    /// usable if the run dies mid-call.
    fn record_inbound(&self, event: Event) -> ReplayResult<()> {
        if self.mode() == ReplayMode::Record {
            let mut cassette = self.cassette.lock();
            cassette.record_event(event)?;
            cassette.save()?;
        }
        Ok(())
    }

    /// Record or verify the outbound response, then hand it back
    fn finish_call(&self, response: String) -> crate::Result<String> {
        match self.mode() {
            ReplayMode::Record => {
                let mut cassette = self.cassette.lock();
                cassette.record_event(Event::CallerOutput {
                    output: response.clone(),
                })?;
                cassette.save()?;
                Ok(response)
            }
            ReplayMode::Replay => {
                let event = self.cassette.lock().consume()?;
                let Event::CallerOutput { output } = event else {
                    return Err(ReplayError::UnexpectedEvent {
                        expected: "caller_output",
                        actual: event.label().to_string(),
                    }
                    .into());
                };
                if output != response {
                    return Err(ReplayError::Mismatch {
                        what: "caller output",
                        expected: output,
                        actual: response,
                    }
                    .into());
                }
                Ok(response)
            }
        }
    }

    /// Push a runbook and run it to its first suspension point
    pub async fn start(
        &mut self,
        name: &str,
        arguments: &str,
        working_dir: Option<String>,
    ) -> crate::Result<String> {
        self.record_inbound(Event::Push {
            name: name.to_string(),
            arguments: arguments.to_string(),
            working_dir: working_dir.clone(),
        })?;

        let response = match self
            .engine
            .push(name, arguments, working_dir.map(PathBuf::from))
        {
            Err(EngineError::Load(error)) => format!("Error: {error}"),
            Err(error) => return Err(error.into()),
            Ok(()) => {
                let result = self.engine.run_until_suspend().await?;
                render_run_result(&result)
            }
        };
        self.finish_call(response)
    }

    /// Resolve the pending judgment and continue
    pub async fn resume_after_judgment(
        &mut self,
        outputs: BTreeMap<String, String>,
    ) -> crate::Result<String> {
        self.record_inbound(Event::ResumeAfterJudgment {
            outputs: outputs.clone(),
        })?;

        let response = match self.engine.pending() {
            Some(Pending::Manual(pending)) => format!(
                "Error: Manual runbook `{}` is pending. Call `complete_manual` instead of \
                 `resume_after_judgment` once the work is done.",
                pending.name
            ),
            Some(Pending::Fallback(pending)) => format!(
                "Error: Runbook `{}` needs to be completed manually. Call `complete_manual` \
                 instead of `resume_after_judgment` once the work is done.",
                pending.frame_name
            ),
            None => "Error: No judgment is pending. Nothing to resume.".to_string(),
            Some(Pending::Judgment(_)) => {
                match self.engine.resume_after_judgment(outputs).await {
                    Ok(result) => render_run_result(&result),
                    Err(error @ EngineError::IncompleteJudgmentOutputs { .. }) => {
                        format!("Error: {error}")
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        };
        self.finish_call(response)
    }

    /// Complete the pending manual or escalated frame and continue
    pub async fn complete_manual(&mut self, summary: &str) -> crate::Result<String> {
        self.record_inbound(Event::CompleteManual {
            summary: summary.to_string(),
        })?;

        let response = match self.engine.pending() {
            Some(Pending::Judgment(_)) => "Error: A judgment is pending, not a manual runbook. \
                                           Call `resume_after_judgment` instead."
                .to_string(),
            None => "Error: No manual runbook is pending. Use `start` to begin a runbook."
                .to_string(),
            Some(Pending::Manual(_)) | Some(Pending::Fallback(_)) => {
                let result = self
                    .engine
                    .complete_manual(ManualOutcome::with_summary(summary))
                    .await?;
                render_run_result(&result)
            }
        };
        self.finish_call(response)
    }

    /// Report the current execution state without advancing anything
    pub fn status(&mut self) -> crate::Result<String> {
        self.record_inbound(Event::Status)?;

        let response = if let Some(pending) = self.engine.pending() {
            render_pending(&pending)
        } else if self.engine.stack_depth() == 0 {
            "No runbook is currently running.".to_string()
        } else {
            format!(
                "## Runbook: `{}`\nStack depth: {}\nStack path: `{}`",
                self.engine.current_name().unwrap_or_default(),
                self.engine.stack_depth(),
                self.engine.stack_path()
            )
        };
        self.finish_call(response)
    }
}

/// Drives a replaying session from its own recorded inbound events
///
/// Consumes one inbound event at a time and invokes the matching session
/// operation; the session and bridge consume the interleaved outbound and
/// action events. A clean run ends with the cassette exhausted.
pub struct ReplayDriver {
    session: CassetteSession,
}

impl ReplayDriver {
    /// Wrap a replaying session; rejects a recording one
    pub fn new(session: CassetteSession) -> ReplayResult<Self> {
        if session.mode() != ReplayMode::Replay {
            return Err(ReplayError::Misconfigured(
                "replay driver requires a replay-mode session".to_string(),
            ));
        }
        Ok(Self { session })
    }

    /// Replay every recorded caller operation in order
    pub async fn run(&mut self) -> crate::Result<()> {
        loop {
            let next = {
                let mut cassette = self.session.cassette.lock();
                if !cassette.has_remaining() {
                    break;
                }
                cassette.consume()?
            };
            tracing::debug!("Replaying inbound event: {}", next.label());
            match next {
                Event::Push {
                    name,
                    arguments,
                    working_dir,
                } => {
                    self.session.start(&name, &arguments, working_dir).await?;
                }
                Event::ResumeAfterJudgment { outputs } => {
                    self.session.resume_after_judgment(outputs).await?;
                }
                Event::CompleteManual { summary } => {
                    self.session.complete_manual(&summary).await?;
                }
                Event::Status => {
                    self.session.status()?;
                }
                other => {
                    return Err(ReplayError::UnexpectedEvent {
                        expected: "inbound caller event",
                        actual: other.label().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RealEnvironmentBridge;
    use crate::effect::{Action, Effect};
    use crate::loader::{LogicFactory, RunbookRegistry};
    use crate::logic::SequenceLogic;

    fn echo_registry() -> Arc<RunbookRegistry> {
        let mut registry = RunbookRegistry::new();
        let factory: LogicFactory = Arc::new(|_args| {
            Box::new(SequenceLogic::new(vec![Effect::Action(Action::command(
                "echo hello",
                "Say hello",
            ))]))
        });
        registry.register_compiled("hello", "Says hello", factory);
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_record_session_writes_inbound_and_outbound_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");

        let mut session = CassetteSession::record(
            &path,
            echo_registry(),
            Arc::new(RealEnvironmentBridge::new()),
            std::env::current_dir().unwrap(),
        )
        .unwrap();
        let response = session.start("hello", "", None).await.unwrap();
        assert!(response.contains("## All Steps Completed"));

        let file: crate::replay::CassetteFile =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let labels: Vec<&str> = file.events.iter().map(Event::label).collect();
        assert_eq!(labels, vec!["push", "action", "caller_output"]);
    }

    #[tokio::test]
    async fn test_inbound_event_persists_before_first_action() {
        use crate::bridge::{BridgeResult, EnvironmentBridge};
        use crate::effect::ActionOutcome;
        use async_trait::async_trait;
        use std::path::{Path, PathBuf};

        struct CheckingBridge {
            cassette_path: PathBuf,
            inner: RealEnvironmentBridge,
        }

        #[async_trait]
        impl EnvironmentBridge for CheckingBridge {
            async fn execute(
                &self,
                action: &Action,
                working_dir: &Path,
            ) -> BridgeResult<ActionOutcome> {
                // The inbound push must already be on disk when the first
                // action runs, so a crash here leaves a usable cassette
                let text = std::fs::read_to_string(&self.cassette_path).unwrap();
                assert!(text.contains("type: push"));
                self.inner.execute(action, working_dir).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        let mut session = CassetteSession::record(
            &path,
            echo_registry(),
            Arc::new(CheckingBridge {
                cassette_path: path.clone(),
                inner: RealEnvironmentBridge::new(),
            }),
            std::env::current_dir().unwrap(),
        )
        .unwrap();
        session.start("hello", "", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_of_unknown_runbook_records_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");

        let mut session = CassetteSession::record(
            &path,
            Arc::new(RunbookRegistry::new()),
            Arc::new(RealEnvironmentBridge::new()),
            std::env::current_dir().unwrap(),
        )
        .unwrap();
        let response = session.start("ghost", "", None).await.unwrap();
        assert_eq!(response, "Error: Runbook not found: ghost");
    }

    #[tokio::test]
    async fn test_status_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = CassetteSession::record(
            dir.path().join("session.yaml"),
            echo_registry(),
            Arc::new(RealEnvironmentBridge::new()),
            std::env::current_dir().unwrap(),
        )
        .unwrap();
        let response = session.status().unwrap();
        assert_eq!(response, "No runbook is currently running.");
    }

    #[tokio::test]
    async fn test_driver_rejects_record_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = CassetteSession::record(
            dir.path().join("session.yaml"),
            echo_registry(),
            Arc::new(RealEnvironmentBridge::new()),
            std::env::current_dir().unwrap(),
        )
        .unwrap();
        assert!(ReplayDriver::new(session).is_err());
    }
}
