//! Declared-mutant mutation testing.
//!
//! Data flows leaves first: user code fills a [`MutationRegistry`] with
//! function slots and mutants, [`run_session`] drives a
//! [`SubstitutionController`] through every mutant, and each run ends up as
//! an [`OutcomeRecord`] in a [`MutationReport`].

pub mod config;
pub mod controller;
pub mod engine;
pub mod outcome;
pub mod registry;
/// Human-readable and machine-friendly report generation.
pub mod report;
pub mod runner;
pub mod slot;
pub mod state;
pub mod switch;

pub use config::{ConfigError, MutantSelection, MutationConfig};
pub use controller::{ActivationError, ActivationGuard, SubstitutionController};
pub use engine::{ExecutionError, InProcessSuite, TestExecutor};
pub use outcome::{MutantVerdict, OutcomeRecord, RunStatus, TestOutcome, TestResult};
pub use registry::{
    MutantId, MutantKey, MutantKind, MutantRecord, MutationRegistry, RegistryError, Target,
    TestSelector,
};
pub use report::{MutantSummary, MutationReport, ReportFormat, RunSummary, render_report};
pub use runner::{MutationRunError, interrupt, run_session};
pub use slot::{FunctionSlot, SlotError, Substitutable};
pub use state::ActivationState;
pub use switch::{choose, choose_registered};
