#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use kitchensink_mutation::cli;
use kitchensink_mutation::mutation::{
    ActivationState, FunctionSlot, InProcessSuite, MutationRegistry, choose,
};
use tempfile::tempdir;

type ScaleFn = dyn Fn(u32) -> u32 + Send + Sync;

fn test_guard() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn scale(slot: &FunctionSlot<ScaleFn>, x: u32) -> u32 {
    (slot.current())(x)
}

fn capacity() -> u32 {
    choose("Bag.capacity", || 8, || 0)
}

fn harness() -> (MutationRegistry, InProcessSuite) {
    let original: Arc<ScaleFn> = Arc::new(|x| x * 2);
    let slot = FunctionSlot::new("scale", original);
    let mut registry = MutationRegistry::new();
    registry.declare_function(&slot).expect("scale should declare");
    let identity: Arc<ScaleFn> = Arc::new(|x| x);
    registry
        .register_whole_function("scale", "IDENTITY", identity)
        .expect("IDENTITY should register");
    registry
        .register_inline("Bag.capacity", "ZERO", || 8_u32, || 0_u32)
        .expect("ZERO should register");

    let doubled = slot.clone();
    let suite = InProcessSuite::new()
        .test("tests/scale.rs", "test_scale_doubles", move || {
            assert_eq!(scale(&doubled, 21), 42);
        })
        .test("tests/scale.rs", "test_capacity_is_positive", || {
            let _ = capacity();
        });
    (registry, suite)
}

fn write_definitions(dir: &Path, body: &str) -> String {
    let path = dir.join("mutants.json");
    fs::write(&path, body).expect("definitions should write");
    path.display().to_string()
}

#[test]
fn test_mode_runs_without_mutants() {
    let _guard = test_guard();
    let (registry, suite) = harness();
    let ok = cli::run_from(["kitchensink-mutate", "--mode", "test"], registry, suite)
        .expect("test mode should run");
    assert!(ok);
}

#[test]
fn mutate_mode_runs_selected_mutants_and_restores_state() {
    let _guard = test_guard();
    let dir = tempdir().expect("temp dir should be created");
    let definitions = write_definitions(
        dir.path(),
        r#"{
            "mutants": [
                { "target": "scale", "id": "IDENTITY" },
                { "target": "Bag.capacity", "id": "ZERO" }
            ],
            "tests": "tests/scale.rs"
        }"#,
    );

    let (registry, suite) = harness();
    let ok = cli::run_from(
        [
            "kitchensink-mutate",
            "--mode",
            "mutate",
            "--mutants",
            definitions.as_str(),
            "--format",
            "json",
        ],
        registry,
        suite,
    )
    .expect("mutate mode should run");

    // A survivor (ZERO) is not a run failure.
    assert!(ok);
    assert_eq!(ActivationState::global().active(), None);
    assert_eq!(capacity(), 8);
}

#[test]
fn unknown_mutant_in_definitions_is_an_error() {
    let _guard = test_guard();
    let dir = tempdir().expect("temp dir should be created");
    let definitions = write_definitions(
        dir.path(),
        r#"{ "mutants": [{ "target": "scale", "id": "NEGATE" }] }"#,
    );

    let (registry, suite) = harness();
    let err = cli::run_from(
        [
            "kitchensink-mutate",
            "--mode",
            "mutate",
            "--tests",
            "tests/scale.rs",
            "--mutants",
            definitions.as_str(),
        ],
        registry,
        suite,
    )
    .expect_err("unregistered mutant should be rejected");
    assert!(err.to_string().contains("scale/NEGATE"));
}

#[test]
fn mutate_mode_without_linked_tests_is_an_error() {
    let _guard = test_guard();
    let (registry, suite) = harness();
    let err = cli::run_from(["kitchensink-mutate", "--mode", "mutate"], registry, suite)
        .expect_err("unlinked targets should be rejected");
    assert!(err.to_string().contains("no tests linked"));
}

#[test]
fn malformed_definitions_report_the_path() {
    let _guard = test_guard();
    let dir = tempdir().expect("temp dir should be created");
    let definitions = write_definitions(dir.path(), "{ not json");

    let (registry, suite) = harness();
    let err = cli::run_from(
        [
            "kitchensink-mutate",
            "--mode",
            "mutate",
            "--mutants",
            definitions.as_str(),
        ],
        registry,
        suite,
    )
    .expect_err("malformed definitions should be rejected");
    assert!(format!("{err:#}").contains("mutants.json"));
}
