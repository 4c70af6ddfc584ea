//! Mutation session orchestration.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info, warn};

use super::config::MutationConfig;
use super::controller::{ActivationError, SubstitutionController};
use super::engine::TestExecutor;
use super::outcome::{OutcomeRecord, RunStatus};
use super::registry::{MutantKey, MutantRecord, Target, TestSelector};
use super::report::{MutationReport, RunSummary};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Session orchestration errors.
#[derive(Debug, Error)]
pub enum MutationRunError {
    /// A mutant's target has no linked test selector.
    #[error("no tests linked to target `{0}`")]
    NoLinkedTests(Target),
    /// No target is linked to any test selector.
    #[error("no tests linked to any target")]
    NothingLinked,
    /// The definitions file names a mutant that is not registered.
    #[error("selected mutant {0} is not registered")]
    UnknownSelectedMutant(MutantKey),
    /// Activation failed; the session cannot continue safely.
    #[error("activation error: {0}")]
    Activation(#[from] ActivationError),
    /// The test-execution capability itself panicked. The mutant was
    /// deactivated before this error was returned.
    #[error("test executor panicked while {mutant} was active: {message}")]
    ExecutorPanicked {
        /// Mutant active at the time.
        mutant: MutantKey,
        /// Panic payload, if it was a string.
        message: String,
        /// Outcomes of the mutants processed before the panic.
        partial: Box<MutationReport>,
    },
    /// Signal handler error.
    #[error("signal handler installation failed: {0}")]
    Signal(String),
}

fn install_signal_handler_once() -> Result<(), MutationRunError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    let result = INIT.get_or_init(|| {
        ctrlc::set_handler(|| {
            INTERRUPTED.store(true, Ordering::SeqCst);
        })
        .map_err(|e| e.to_string())
    });

    match result {
        Ok(()) => Ok(()),
        Err(msg) => Err(MutationRunError::Signal(msg.clone())),
    }
}

/// Ask the running session to stop before its next mutant.
pub fn interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn schedule<'a>(
    controller: &SubstitutionController<'a>,
    config: &MutationConfig,
) -> Result<Vec<(&'a MutantRecord, &'a TestSelector)>, MutationRunError> {
    let registry = controller.registry();
    if !registry.has_linkage() {
        return Err(MutationRunError::NothingLinked);
    }

    if let Some(selection) = &config.selection {
        if let Some(missing) = selection.mutants.iter().find(|key| registry.get(key).is_none()) {
            return Err(MutationRunError::UnknownSelectedMutant(missing.clone()));
        }
    }

    registry
        .all_mutants()
        .filter(|record| config.admits(record.key()))
        .map(|record| {
            registry
                .linked_tests(record.target())
                .map(|selector| (record, selector))
                .ok_or_else(|| MutationRunError::NoLinkedTests(record.target().clone()))
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test executor panicked".to_string()
    }
}

fn run_mutant(
    controller: &SubstitutionController<'_>,
    executor: &dyn TestExecutor,
    record: &MutantRecord,
    selector: &TestSelector,
) -> Result<RunStatus, MutationRunError> {
    let guard = controller.scoped(record.key())?;
    let run = catch_unwind(AssertUnwindSafe(|| executor.run(selector)));
    drop(guard);

    match run {
        Ok(Ok(results)) => Ok(RunStatus::Completed { results }),
        Ok(Err(err)) => {
            warn!(mutant = %record.key(), "test run failed: {err}");
            Ok(RunStatus::RunFailed {
                message: err.to_string(),
            })
        }
        Err(payload) => Err(MutationRunError::ExecutorPanicked {
            mutant: record.key().clone(),
            message: panic_message(payload.as_ref()),
            partial: Box::default(),
        }),
    }
}

/// Run every admitted mutant against its linked tests, one at a time, in
/// registration order.
///
/// Every target is checked for a test link before the first activation, and
/// a registry with no test link at all is refused even when nothing would
/// run.
/// Each mutant is deactivated before the next one starts, whether its run
/// passed, failed or panicked.
pub fn run_session(
    controller: &SubstitutionController<'_>,
    executor: &dyn TestExecutor,
    config: &MutationConfig,
) -> Result<MutationReport, MutationRunError> {
    if config.handle_interrupts {
        install_signal_handler_once()?;
    }
    INTERRUPTED.store(false, Ordering::SeqCst);

    let scheduled = schedule(controller, config)?;
    let total_mutants = scheduled.len();
    info!("kitchensink-mutation: {total_mutants} mutant(s) scheduled");

    let mut report = MutationReport::default();
    for (index, (record, selector)) in scheduled.into_iter().enumerate() {
        if INTERRUPTED.load(Ordering::SeqCst) {
            warn!("kitchensink-mutation: interrupted, {index}/{total_mutants} mutant(s) processed");
            report.interrupted = true;
            break;
        }

        let position = index + 1;
        info!(
            "kitchensink-mutation: running mutant {position}/{total_mutants}: {} against {selector}",
            record.key()
        );
        match run_mutant(controller, executor, record, selector) {
            Ok(status) => report.outcomes.push(OutcomeRecord {
                mutant: record.key().clone(),
                kind: record.kind(),
                status,
            }),
            Err(MutationRunError::ExecutorPanicked {
                mutant, message, ..
            }) => {
                error!(%mutant, "test executor panicked: {message}");
                return Err(MutationRunError::ExecutorPanicked {
                    mutant,
                    message,
                    partial: Box::new(report),
                });
            }
            Err(err) => return Err(err),
        }
    }

    let summary = RunSummary::from_report(&report);
    info!(
        "kitchensink-mutation: killed={}, survived={}, run_failed={}, mutation_score={:.2}%",
        summary.killed, summary.survived, summary.run_failed, summary.mutation_score
    );
    Ok(report)
}
