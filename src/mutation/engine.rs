//! Test-execution capability and an in-process test suite adapter.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use super::outcome::{TestResult, truncate_preview};
use super::registry::TestSelector;

/// Execution-level errors. Individual test failures are never errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// Selector matched no test.
    #[error("no tests match selector {0}")]
    NoTestsSelected(TestSelector),
    /// The runner itself could not execute the tests.
    #[error("test execution failed: {0}")]
    Failed(String),
}

/// Runs a selected set of tests and reports per-test outcomes in order.
pub trait TestExecutor {
    /// Run every test matched by `selector`.
    ///
    /// Panicking or timed-out tests are reported as failing results, not as
    /// errors.
    fn run(&self, selector: &TestSelector) -> Result<Vec<TestResult>, ExecutionError>;
}

type TestFn = Arc<dyn Fn() + Send + Sync>;

struct TestCase {
    file: PathBuf,
    name: String,
    body: TestFn,
}

/// Named test functions grouped by file, executed in the current process.
#[derive(Default)]
pub struct InProcessSuite {
    tests: Vec<TestCase>,
    timeout: Option<Duration>,
}

impl InProcessSuite {
    /// Empty suite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a test declared in `file`.
    pub fn test(
        mut self,
        file: impl Into<PathBuf>,
        name: impl Into<String>,
        body: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.tests.push(TestCase {
            file: file.into(),
            name: name.into(),
            body: Arc::new(body),
        });
        self
    }

    /// Fail any test that runs longer than `timeout`.
    ///
    /// Timed tests run on a helper thread. A test that overruns is reported
    /// as failed and its thread is left to finish on its own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Number of declared tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// True if no test is declared.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    fn matches(case: &TestCase, selector: &TestSelector) -> bool {
        match selector {
            TestSelector::File(path) => case.file == *path,
            TestSelector::Pattern(pattern) => case.name.contains(pattern.as_str()),
        }
    }

    fn run_case(&self, case: &TestCase) -> TestResult {
        let verdict = match self.timeout {
            None => catch_unwind(AssertUnwindSafe(|| (case.body)())).map_err(panic_message),
            Some(timeout) => Self::run_with_timeout(case.body.clone(), timeout),
        };
        match verdict {
            Ok(()) => TestResult::pass(&case.name),
            Err(message) => TestResult::fail(&case.name, Some(message)),
        }
    }

    fn run_with_timeout(body: TestFn, timeout: Duration) -> Result<(), String> {
        let (tx, rx) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("kitchensink-test".to_string())
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| body())).map_err(panic_message);
                // The receiver is gone once the test has timed out.
                let _ = tx.send(outcome);
            });
        if let Err(err) = spawned {
            return Err(format!("could not spawn test thread: {err}"));
        }
        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(format!("timed out after {}ms", timeout.as_millis()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err("test thread exited without reporting".to_string())
            }
        }
    }
}

impl TestExecutor for InProcessSuite {
    fn run(&self, selector: &TestSelector) -> Result<Vec<TestResult>, ExecutionError> {
        let selected: Vec<&TestCase> = self
            .tests
            .iter()
            .filter(|case| Self::matches(case, selector))
            .collect();
        if selected.is_empty() {
            return Err(ExecutionError::NoTestsSelected(selector.clone()));
        }

        Ok(selected
            .into_iter()
            .map(|case| {
                let result = self.run_case(case);
                if let Some(message) = &result.message {
                    warn!(test = %case.name, "test failed: {}", truncate_preview(message));
                }
                result
            })
            .collect())
    }
}

impl fmt::Debug for InProcessSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tests.iter().map(|case| case.name.as_str()).collect();
        f.debug_struct("InProcessSuite")
            .field("tests", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_string()
    }
}
