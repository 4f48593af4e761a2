//! # Runbook
//!
//! A resumable runbook execution engine with deterministic record/replay.
//!
//! ## Features
//!
//! - **Effect Model**: Runbook computations yield actions, judgments, and
//!   nested invocations one effect at a time
//! - **Pull-Based Engine**: A frame stack resolves deterministic actions
//!   synchronously and suspends at every point that needs an external
//!   decision-maker
//! - **Failure Escalation**: A failed action moves its frame into a manual
//!   recovery state instead of crashing the run
//! - **Record/Replay**: Boundary-level cassettes make any recorded session a
//!   hermetic regression test of the whole engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runbook::{
//!     Action, Effect, Engine, LogicFactory, RealEnvironmentBridge, RunbookRegistry,
//!     SequenceLogic,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = RunbookRegistry::new();
//! let factory: LogicFactory = Arc::new(|_args| {
//!     Box::new(SequenceLogic::new(vec![Effect::Action(Action::command(
//!         "cargo test",
//!         "Run the test suite",
//!     ))]))
//! });
//! registry.register_compiled("test", "Run the project tests", factory);
//!
//! let mut engine = Engine::new(
//!     Arc::new(registry),
//!     Arc::new(RealEnvironmentBridge::new()),
//!     std::env::current_dir()?,
//! );
//! engine.push("test", "", None)?;
//! let result = engine.run_until_suspend().await?;
//! println!("completed: {}", result.completed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Effect model: what computations yield and what comes back
pub mod effect;

/// Resumable computation handles
pub mod logic;

/// Execution frames on the engine stack
pub mod frame;

/// Runbook resolution and loading
pub mod loader;

/// Environment bridge for deterministic actions
pub mod bridge;

/// The pull-based execution engine
pub mod executor;

/// Markdown rendering of engine results
pub mod display;

/// Record/replay harness at the environment boundaries
pub mod replay;

/// Crate-level error type
pub mod error;

// Re-export core types
pub use bridge::{
    BridgeError, BridgeResult, EnvironmentBridge, FunctionRegistry, HostFunction,
    RealEnvironmentBridge,
};
pub use effect::{
    Action, ActionOutcome, CallResult, Effect, Invoke, InvokeOutcome, Judgment, JudgmentOutputs,
    Operation, ShellResult, StepResult,
};
pub use error::{Result, RunbookError};
pub use executor::{
    Engine, EngineError, EngineResult, ExecutedStep, ManualOutcome, Pending, PendingFallback,
    PendingJudgment, PendingManual, RunResult, StepKind,
};
pub use frame::{ComputationFrame, Fallback, Frame, ManualFrame};
pub use loader::{LoadError, LoadResult, LoadedRunbook, LogicFactory, RunbookLoader, RunbookRegistry};
pub use logic::{LogicStep, RunbookLogic, SequenceLogic};
pub use replay::{
    Cassette, CassetteBridge, CassetteSession, ReplayDriver, ReplayError, ReplayMode,
    ReplayResult, SharedCassette,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
