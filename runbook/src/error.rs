//! Crate-level error type

use crate::executor::EngineError;
use crate::loader::LoadError;
use crate::replay::ReplayError;
use thiserror::Error;

/// Any error a runbook embedder can hit
#[derive(Debug, Error)]
pub enum RunbookError {
    /// Engine-level failure
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Runbook resolution failure
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Record/replay harness failure
    #[error(transparent)]
    Replay(#[from] ReplayError),
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, RunbookError>;
