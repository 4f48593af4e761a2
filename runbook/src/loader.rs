//! Runbook resolution and loading
//!
//! The engine does not know where runbooks come from; it asks a
//! [`RunbookLoader`] for a computation handle or a manual body by name.
//! [`RunbookRegistry`] is the in-memory implementation used by embedders and
//! tests. Argument substitution into manual bodies is the loader's job, not
//! the engine's.

use crate::logic::RunbookLogic;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading a runbook
#[derive(Debug, Error)]
pub enum LoadError {
    /// No runbook is registered under the requested name
    #[error("Runbook not found: {0}")]
    NotFound(String),
    /// The runbook exists but could not be instantiated
    #[error("Failed to load runbook '{name}': {reason}")]
    Invalid {
        /// The runbook name
        name: String,
        /// Why instantiation failed
        reason: String,
    },
}

/// Result type for loader operations
pub type LoadResult<T> = Result<T, LoadError>;

/// A successfully loaded runbook, ready to become a frame
pub enum LoadedRunbook {
    /// A compiled runbook: a fresh computation handle plus its prose source
    Computation {
        /// The resumable computation, instantiated with the arguments
        logic: Box<dyn RunbookLogic>,
        /// Static description of the runbook's overall work
        source: String,
    },
    /// A manual runbook: prose delegated wholesale to the external judge
    Manual {
        /// Body text with arguments already substituted
        body: String,
    },
}

impl std::fmt::Debug for LoadedRunbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadedRunbook::Computation { source, .. } => f
                .debug_struct("LoadedRunbook::Computation")
                .field("source", source)
                .finish_non_exhaustive(),
            LoadedRunbook::Manual { body } => f
                .debug_struct("LoadedRunbook::Manual")
                .field("body", body)
                .finish(),
        }
    }
}

/// Resolves runbook names to loadable sources
pub trait RunbookLoader: Send + Sync {
    /// Load the runbook registered under `name`, instantiated with `arguments`
    fn load(&self, name: &str, arguments: &str) -> LoadResult<LoadedRunbook>;
}

/// Factory producing a fresh computation handle per invocation
pub type LogicFactory = Arc<dyn Fn(&str) -> Box<dyn RunbookLogic> + Send + Sync>;

struct CompiledEntry {
    factory: LogicFactory,
    source: String,
}

/// In-memory runbook registry
///
/// Compiled runbooks register a factory (one fresh computation per load);
/// manual runbooks register a prose body with an `$ARGUMENTS` placeholder.
#[derive(Default)]
pub struct RunbookRegistry {
    compiled: HashMap<String, CompiledEntry>,
    manual: HashMap<String, String>,
}

impl RunbookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled runbook under `name`
    pub fn register_compiled(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        factory: LogicFactory,
    ) {
        self.compiled.insert(
            normalize_name(&name.into()),
            CompiledEntry {
                factory,
                source: source.into(),
            },
        );
    }

    /// Register a manual runbook body under `name`
    pub fn register_manual(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.manual.insert(normalize_name(&name.into()), body.into());
    }
}

/// Normalize a runbook name: callers may use `:` as a path separator
fn normalize_name(name: &str) -> String {
    name.replace(':', "/")
}

impl RunbookLoader for RunbookRegistry {
    fn load(&self, name: &str, arguments: &str) -> LoadResult<LoadedRunbook> {
        let name = normalize_name(name);
        if let Some(entry) = self.compiled.get(&name) {
            tracing::debug!("Loading compiled runbook: {}", name);
            return Ok(LoadedRunbook::Computation {
                logic: (entry.factory)(arguments),
                source: entry.source.clone(),
            });
        }
        if let Some(body) = self.manual.get(&name) {
            tracing::debug!("Loading manual runbook: {}", name);
            return Ok(LoadedRunbook::Manual {
                body: body.replace("$ARGUMENTS", arguments),
            });
        }
        Err(LoadError::NotFound(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::SequenceLogic;

    fn empty_factory() -> LogicFactory {
        Arc::new(|_args| Box::new(SequenceLogic::new(vec![])))
    }

    #[test]
    fn test_resolves_compiled_over_nothing() {
        let mut registry = RunbookRegistry::new();
        registry.register_compiled("deploy", "Deploy the service", empty_factory());

        match registry.load("deploy", "staging").unwrap() {
            LoadedRunbook::Computation { source, .. } => assert_eq!(source, "Deploy the service"),
            other => panic!("unexpected load: {other:?}"),
        }
    }

    #[test]
    fn test_manual_body_substitutes_arguments() {
        let mut registry = RunbookRegistry::new();
        registry.register_manual("triage", "Triage the incident: $ARGUMENTS");

        match registry.load("triage", "disk full").unwrap() {
            LoadedRunbook::Manual { body } => {
                assert_eq!(body, "Triage the incident: disk full");
            }
            other => panic!("unexpected load: {other:?}"),
        }
    }

    #[test]
    fn test_colon_names_normalize_to_slashes() {
        let mut registry = RunbookRegistry::new();
        registry.register_compiled("test/nested", "Nested", empty_factory());
        assert!(registry.load("test:nested", "").is_ok());
    }

    #[test]
    fn test_unknown_name_errors() {
        let registry = RunbookRegistry::new();
        let err = registry.load("missing", "").unwrap_err();
        assert!(matches!(err, LoadError::NotFound(name) if name == "missing"));
    }
}
