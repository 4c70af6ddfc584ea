//! Per-test and per-mutant outcome model.

use serde::{Deserialize, Serialize};

use super::registry::{MutantKey, MutantKind};

/// Result of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Test passed.
    Pass,
    /// Test failed, panicked or timed out.
    Fail,
}

/// One test's outcome while a mutant was active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name.
    pub name: String,
    /// Pass or fail.
    pub outcome: TestOutcome,
    /// Failure detail (panic message, timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestResult {
    /// Passing result.
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: TestOutcome::Pass,
            message: None,
        }
    }

    /// Failing result with an optional message.
    pub fn fail(name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            outcome: TestOutcome::Fail,
            message,
        }
    }

    /// True if the test failed.
    pub fn failed(&self) -> bool {
        self.outcome == TestOutcome::Fail
    }
}

/// How a mutant's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Tests ran; outcomes in order.
    Completed {
        /// Ordered per-test outcomes.
        results: Vec<TestResult>,
    },
    /// The test-execution capability reported an error.
    RunFailed {
        /// Human-readable error detail.
        message: String,
    },
}

/// Classification of a mutant after its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantVerdict {
    /// At least one test failed.
    Killed,
    /// Every test passed.
    Survived,
    /// The run itself failed; nothing is known about the mutant.
    RunFailed,
}

/// Outcome of running the linked tests against one mutant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Mutant that was active.
    pub mutant: MutantKey,
    /// Kind of that mutant.
    pub kind: MutantKind,
    /// Run status and per-test results.
    #[serde(flatten)]
    pub status: RunStatus,
}

impl OutcomeRecord {
    /// Per-test results; empty when the run failed.
    pub fn test_results(&self) -> &[TestResult] {
        match &self.status {
            RunStatus::Completed { results } => results,
            RunStatus::RunFailed { .. } => &[],
        }
    }

    /// Killed, survived or run failed.
    pub fn verdict(&self) -> MutantVerdict {
        match &self.status {
            RunStatus::RunFailed { .. } => MutantVerdict::RunFailed,
            RunStatus::Completed { results } if results.iter().any(TestResult::failed) => {
                MutantVerdict::Killed
            }
            RunStatus::Completed { .. } => MutantVerdict::Survived,
        }
    }
}

/// Truncate long failure messages for one-line display.
pub fn truncate_preview(input: &str) -> String {
    const MAX_CHARS: usize = 200;
    let first_line = input.lines().next().unwrap_or_default();
    if first_line.chars().count() <= MAX_CHARS {
        return first_line.to_string();
    }
    let mut out: String = first_line.chars().take(MAX_CHARS).collect();
    out.push_str("...");
    out
}
