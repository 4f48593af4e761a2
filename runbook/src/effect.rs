//! Effect model for resumable runbook computations
//!
//! A runbook computation yields exactly one [`Effect`] at a time and receives
//! exactly one [`StepResult`] back before yielding its next effect or
//! finishing. Three effect kinds exist: deterministic actions, judgment
//! requests for an external decision-maker, and nested runbook invocations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A deterministic operation an [`Action`] asks the environment to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Run a shell command
    Command {
        /// The command line, executed through the shell
        command: String,
    },
    /// Call a registered host function with keyword arguments
    FunctionCall {
        /// Registered function name
        name: String,
        /// Keyword arguments passed to the function
        kwargs: BTreeMap<String, serde_json::Value>,
    },
}

impl Operation {
    /// Human-readable description of the operation
    pub fn describe(&self) -> String {
        match self {
            Operation::Command { command } => command.clone(),
            Operation::FunctionCall { name, kwargs } => {
                let args: Vec<String> = kwargs.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{}({})", name, args.join(", "))
            }
        }
    }
}

/// A deterministic automation step
///
/// Fast and predictable; needs no external judgment. The `context` string is
/// a verbatim, human-meaningful statement of why this step runs and must
/// never be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// What to execute
    pub operation: Operation,
    /// Why this step runs, verbatim from the runbook source
    pub context: String,
}

impl Action {
    /// Create a shell command action
    pub fn command(command: impl Into<String>, context: impl Into<String>) -> Self {
        let context = context.into();
        debug_assert!(!context.is_empty(), "action context must not be empty");
        Self {
            operation: Operation::Command {
                command: command.into(),
            },
            context,
        }
    }

    /// Create a host function call action
    pub fn function_call(
        name: impl Into<String>,
        kwargs: BTreeMap<String, serde_json::Value>,
        context: impl Into<String>,
    ) -> Self {
        let context = context.into();
        debug_assert!(!context.is_empty(), "action context must not be empty");
        Self {
            operation: Operation::FunctionCall {
                name: name.into(),
                kwargs,
            },
            context,
        }
    }

    /// Human-readable description of the action
    pub fn describe(&self) -> String {
        self.operation.describe()
    }
}

/// A judgment step handed to the external decision-maker
///
/// The resolver signals completion by supplying every output named in
/// `expects` before the computation may resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    /// Natural language instruction for the judge
    pub prompt: String,
    /// Expected outputs as key -> description; the key set is required
    #[serde(default)]
    pub expects: BTreeMap<String, String>,
}

impl Judgment {
    /// Create a judgment step with no expected outputs
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expects: BTreeMap::new(),
        }
    }

    /// Name an expected output the resolver must supply
    pub fn expecting(mut self, key: impl Into<String>, description: impl Into<String>) -> Self {
        self.expects.insert(key.into(), description.into());
        self
    }
}

/// An invocation of another runbook within the shared engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoke {
    /// Name of the runbook to invoke
    pub name: String,
    /// Argument text passed to the nested runbook
    #[serde(default)]
    pub arguments: String,
    /// Optional working directory override for the nested runbook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Invoke {
    /// Create a nested invocation
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
            working_dir: None,
        }
    }

    /// Override the working directory for the nested runbook
    pub fn with_working_dir(mut self, working_dir: PathBuf) -> Self {
        self.working_dir = Some(working_dir);
        self
    }

    /// Human-readable description, e.g. `/deploy staging`
    pub fn describe(&self) -> String {
        if self.arguments.is_empty() {
            format!("/{}", self.name)
        } else {
            format!("/{} {}", self.name, self.arguments)
        }
    }
}

/// One suspendable request yielded by a runbook computation
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deterministic automation, resolved synchronously by the engine
    Action(Action),
    /// Requires the external decision-maker; suspends the engine
    Judgment(Judgment),
    /// Invoke another runbook as a nested frame
    Invoke(Invoke),
}

impl Effect {
    /// Short label for the effect kind
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Action(_) => "action",
            Effect::Judgment(_) => "judgment",
            Effect::Invoke(_) => "invoke",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Action(a) => write!(f, "action({})", a.describe()),
            Effect::Judgment(j) => write!(f, "judgment({})", j.prompt),
            Effect::Invoke(i) => write!(f, "invoke({})", i.describe()),
        }
    }
}

/// Result of executing a shell command
///
/// `output` holds combined stdout/stderr in the order received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellResult {
    /// Whether the command exited with status zero
    pub success: bool,
    /// Process exit code
    pub exit_code: i32,
    /// Combined stdout/stderr
    pub output: String,
}

/// Result of calling a host function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the call returned without error
    pub success: bool,
    /// Return value of the function
    pub value: serde_json::Value,
    /// Error description when the call failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Combined captured stdout/stderr
    #[serde(default)]
    pub output: String,
}

/// Result of a deterministic action, one variant per operation kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Outcome of a shell command
    Shell(ShellResult),
    /// Outcome of a host function call
    Call(CallResult),
}

impl ActionOutcome {
    /// Whether the action succeeded
    pub fn succeeded(&self) -> bool {
        match self {
            ActionOutcome::Shell(r) => r.success,
            ActionOutcome::Call(r) => r.success,
        }
    }

    /// Combined captured output of the action
    pub fn output(&self) -> &str {
        match self {
            ActionOutcome::Shell(r) => &r.output,
            ActionOutcome::Call(r) => &r.output,
        }
    }

    /// Failure description for an unsuccessful outcome
    pub fn failure_reason(&self) -> String {
        match self {
            ActionOutcome::Shell(r) => format!("exit code {}", r.exit_code),
            ActionOutcome::Call(r) => r
                .error
                .clone()
                .unwrap_or_else(|| "function call failed".to_string()),
        }
    }
}

/// Outputs supplied by the external decision-maker for a judgment step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgmentOutputs {
    /// Key/value outputs, covering every expected key
    pub outputs: BTreeMap<String, String>,
}

impl JudgmentOutputs {
    /// Wrap a map of outputs
    pub fn new(outputs: BTreeMap<String, String>) -> Self {
        Self { outputs }
    }
}

/// Result of a nested runbook invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeOutcome {
    /// Whether the nested runbook completed without escalation
    pub success: bool,
    /// One-line completion summary
    pub summary: String,
    /// True when the invocation never ran (e.g. unknown runbook)
    pub aborted: bool,
    /// Number of steps the nested runbook executed
    pub steps_executed: usize,
    /// Escalation error carried up from the nested runbook, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The one typed value fed back into a computation after each effect
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Result of a deterministic action
    Action(ActionOutcome),
    /// Outputs of a resolved judgment
    Judgment(JudgmentOutputs),
    /// Outcome of a nested invocation
    Invoke(InvokeOutcome),
}
