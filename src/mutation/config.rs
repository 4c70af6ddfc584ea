//! Mutation session configuration and mutant-definitions files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::registry::{MutantKey, TestSelector};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Definitions file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Definitions file is not valid JSON of the expected shape.
    #[error("invalid mutant definitions: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Mutant-definitions file: which registered mutants to run, and optionally
/// which tests to link them to.
///
/// ```json
/// {
///   "mutants": [{ "target": "Bag.add", "id": "UPDATE_NOTHING" }],
///   "tests": "tests/bag.rs"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutantSelection {
    /// Mutants to run. Empty means all registered mutants.
    #[serde(default)]
    pub mutants: Vec<MutantKey>,
    /// Selector to link every target to, in [`TestSelector::parse`] syntax.
    #[serde(default)]
    pub tests: Option<String>,
}

impl MutantSelection {
    /// Load a definitions file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Parsed test selector, if the file names one.
    pub fn test_selector(&self) -> Option<TestSelector> {
        self.tests.as_deref().map(TestSelector::parse)
    }

    /// True if `key` should run under this selection.
    pub fn includes(&self, key: &MutantKey) -> bool {
        self.mutants.is_empty() || self.mutants.contains(key)
    }
}

/// Configuration for a mutation session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationConfig {
    /// Optional substring filter over mutant target and id.
    pub filter: Option<String>,
    /// Optional explicit mutant selection.
    pub selection: Option<MutantSelection>,
    /// Install a Ctrl-C handler that stops the session between mutants.
    pub handle_interrupts: bool,
}

impl MutationConfig {
    /// Set selector filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set explicit mutant selection.
    pub fn with_selection(mut self, selection: MutantSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Enable or disable the Ctrl-C handler.
    pub fn with_interrupt_handler(mut self, enabled: bool) -> Self {
        self.handle_interrupts = enabled;
        self
    }

    /// True if `key` passes both the filter and the selection.
    pub fn admits(&self, key: &MutantKey) -> bool {
        let filtered = self.filter.as_deref().is_none_or(|filter| {
            key.target.as_str().contains(filter) || key.id.as_str().contains(filter)
        });
        filtered
            && self
                .selection
                .as_ref()
                .is_none_or(|selection| selection.includes(key))
    }
}
