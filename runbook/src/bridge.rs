//! Environment bridge: where deterministic actions touch the real world
//!
//! The bridge is stateless; all context (including the working directory) is
//! passed per call.

use crate::effect::{Action, ActionOutcome, CallResult, Operation, ShellResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when the environment itself could not perform an action
///
/// Distinct from an action that ran and failed (non-zero exit, function
/// error) — those are reported inside [`ActionOutcome`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Spawning or waiting on the process failed
    #[error("Failed to execute command: {0}")]
    Io(#[from] std::io::Error),
    /// A recorded failure substituted during replay
    #[error("{0}")]
    Recorded(String),
    /// Replay diverged from the cassette; aborts the run instead of escalating
    #[error(transparent)]
    Replay(#[from] crate::replay::ReplayError),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Executes deterministic actions against the environment
#[async_trait]
pub trait EnvironmentBridge: Send + Sync {
    /// Perform one action in `working_dir` and return its resolved outcome
    async fn execute(&self, action: &Action, working_dir: &Path) -> BridgeResult<ActionOutcome>;
}

/// A host function callable from runbooks with JSON keyword arguments
pub type HostFunction =
    Arc<dyn Fn(&BTreeMap<String, Value>) -> Result<Value, String> + Send + Sync>;

/// Registry of host functions available to function-call actions
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, HostFunction>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function under `name`
    pub fn register(&mut self, name: impl Into<String>, function: HostFunction) {
        self.functions.insert(name.into(), function);
    }

    fn get(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }
}

/// The real bridge: runs commands and host functions in real time
pub struct RealEnvironmentBridge {
    functions: FunctionRegistry,
}

impl RealEnvironmentBridge {
    /// Create a bridge with no host functions
    pub fn new() -> Self {
        Self {
            functions: FunctionRegistry::new(),
        }
    }

    /// Create a bridge with the given host functions
    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    async fn execute_command(&self, command: &str, working_dir: &Path) -> BridgeResult<ShellResult> {
        tracing::debug!("Executing command in {}: {}", working_dir.display(), command);

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let exit_code = output.status.code().unwrap_or(-1);
        Ok(ShellResult {
            success: output.status.success(),
            exit_code,
            output: combined,
        })
    }

    fn execute_call(&self, name: &str, kwargs: &BTreeMap<String, Value>) -> CallResult {
        let Some(function) = self.functions.get(name) else {
            return CallResult {
                success: false,
                value: Value::Null,
                error: Some(format!("Function not registered: {name}")),
                output: String::new(),
            };
        };

        match function(kwargs) {
            Ok(value) => CallResult {
                success: true,
                value,
                error: None,
                output: String::new(),
            },
            Err(error) => CallResult {
                success: false,
                value: Value::Null,
                error: Some(error),
                output: String::new(),
            },
        }
    }
}

impl Default for RealEnvironmentBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvironmentBridge for RealEnvironmentBridge {
    async fn execute(&self, action: &Action, working_dir: &Path) -> BridgeResult<ActionOutcome> {
        match &action.operation {
            Operation::Command { command } => Ok(ActionOutcome::Shell(
                self.execute_command(command, working_dir).await?,
            )),
            Operation::FunctionCall { name, kwargs } => {
                tracing::debug!("Calling host function: {}", name);
                Ok(ActionOutcome::Call(self.execute_call(name, kwargs)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn cwd() -> PathBuf {
        std::env::current_dir().unwrap()
    }

    #[tokio::test]
    async fn test_command_captures_output() {
        let bridge = RealEnvironmentBridge::new();
        let action = Action::command("echo hello", "Say hello");
        let outcome = bridge.execute(&action, &cwd()).await.unwrap();
        match outcome {
            ActionOutcome::Shell(r) => {
                assert!(r.success);
                assert_eq!(r.exit_code, 0);
                assert_eq!(r.output, "hello\n");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failing_command_reports_exit_code() {
        let bridge = RealEnvironmentBridge::new();
        let action = Action::command("exit 3", "Fail on purpose");
        let outcome = bridge.execute(&action, &cwd()).await.unwrap();
        match outcome {
            ActionOutcome::Shell(r) => {
                assert!(!r.success);
                assert_eq!(r.exit_code, 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_respects_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = RealEnvironmentBridge::new();
        let action = Action::command("pwd", "Where are we");
        let outcome = bridge.execute(&action, dir.path()).await.unwrap();
        let output = outcome.output().trim_end().to_string();
        // Canonicalize both sides; macOS tempdirs live behind /private
        assert_eq!(
            std::fs::canonicalize(&output).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_function_call_round_trip() {
        let mut functions = FunctionRegistry::new();
        functions.register(
            "add",
            Arc::new(|kwargs| {
                let a = kwargs.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = kwargs.get("b").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(a + b))
            }),
        );
        let bridge = RealEnvironmentBridge::with_functions(functions);

        let mut kwargs = BTreeMap::new();
        kwargs.insert("a".to_string(), json!(2));
        kwargs.insert("b".to_string(), json!(3));
        let action = Action::function_call("add", kwargs, "Add numbers");

        let outcome = bridge.execute(&action, &cwd()).await.unwrap();
        match outcome {
            ActionOutcome::Call(r) => {
                assert!(r.success);
                assert_eq!(r.value, json!(5));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_function_fails_without_bridge_error() {
        let bridge = RealEnvironmentBridge::new();
        let action = Action::function_call("missing", BTreeMap::new(), "Call nothing");
        let outcome = bridge.execute(&action, &cwd()).await.unwrap();
        assert!(!outcome.succeeded());
        assert!(outcome.failure_reason().contains("missing"));
    }
}
