use kitchensink_mutation::prelude::*;

#[test]
fn prelude_compiles_and_exports_core() {
    let mut registry = MutationRegistry::new();
    registry
        .register_inline("limit", "OFF_BY_ONE", || 10, || 11)
        .expect("inline mutant should register");
    registry.link_targets_to_tests(TestSelector::parse("limit"));

    let state = ActivationState::new();
    let controller = SubstitutionController::with_state(&registry, state.clone());
    let key = MutantKey::new("limit", "OFF_BY_ONE");
    assert_eq!(choose_registered::<i32>(&registry, &state, "limit"), Ok(10));
    controller.activate(&key).expect("activation should succeed");
    assert_eq!(choose_registered::<i32>(&registry, &state, "limit"), Ok(11));
    controller.deactivate();

    let suite = InProcessSuite::new().test("tests/limit.rs", "limit_is_ten", || {});
    let _: &dyn TestExecutor = &suite;
    let _ = MutationConfig::default();
    let _ = MutationReport::default();
}

proptest! {
    #[test]
    fn prelude_carries_proptest(x in 0_u32..100) {
        prop_assert!(x < 100);
    }
}
