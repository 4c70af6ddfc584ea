//! Substitution controller: installs one mutant at a time and restores the
//! original behavior afterwards.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::registry::{MutantKey, MutantKind, MutationRegistry};
use super::slot::SlotError;
use super::state::{ActivationState, ActiveMutant, claim_tag, release_tag};

/// Activation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivationError {
    /// Another mutant is already active.
    #[error("cannot activate {requested}: mutant {active} is already active")]
    AlreadyActive {
        /// Mutant that is currently installed.
        active: MutantKey,
        /// Mutant whose activation was refused.
        requested: MutantKey,
    },
    /// Key is not in the registry.
    #[error("unknown mutant {0}")]
    UnknownMutant(MutantKey),
    /// The function slot refused the registered replacement.
    #[error("function slot for {0} rejected the replacement")]
    SlotRejected(MutantKey),
}

/// Swaps mutants in and out of an [`ActivationState`].
#[derive(Debug)]
pub struct SubstitutionController<'r> {
    registry: &'r MutationRegistry,
    state: Arc<ActivationState>,
}

impl<'r> SubstitutionController<'r> {
    /// Controller over the process-wide activation state.
    pub fn new(registry: &'r MutationRegistry) -> Self {
        Self::with_state(registry, ActivationState::global())
    }

    /// Controller over an explicit activation state.
    pub fn with_state(registry: &'r MutationRegistry, state: Arc<ActivationState>) -> Self {
        Self { registry, state }
    }

    /// Registry this controller activates mutants from.
    pub fn registry(&self) -> &'r MutationRegistry {
        self.registry
    }

    /// Activation state this controller writes.
    pub fn state(&self) -> &Arc<ActivationState> {
        &self.state
    }

    /// Key of the active mutant.
    pub fn active(&self) -> Option<MutantKey> {
        self.state.active()
    }

    /// Make `key` the active mutant.
    ///
    /// Fails with [`ActivationError::AlreadyActive`] while any mutant is
    /// active on this controller's state, including `key` itself, or while
    /// another controller holds the same function slot or inline tag.
    pub fn activate(&self, key: &MutantKey) -> Result<(), ActivationError> {
        let record = self
            .registry
            .get(key)
            .ok_or_else(|| ActivationError::UnknownMutant(key.clone()))?;

        let slot = match record.kind() {
            MutantKind::WholeFunction => Some(
                self.registry
                    .slot(record.target())
                    .cloned()
                    .ok_or_else(|| ActivationError::UnknownMutant(key.clone()))?,
            ),
            MutantKind::InlineChoice => None,
        };

        let candidate = ActiveMutant {
            key: key.clone(),
            kind: record.kind(),
            slot: slot.clone(),
        };
        let refused_by = |active: MutantKey| ActivationError::AlreadyActive {
            active,
            requested: key.clone(),
        };
        self.state.try_set(candidate, || match &slot {
            Some(slot) => slot
                .install(key, record.replacement().as_ref())
                .map_err(|err| match err {
                    SlotError::TypeMismatch => ActivationError::SlotRejected(key.clone()),
                    SlotError::Occupied(active) => refused_by(active),
                }),
            None => claim_tag(key).map_err(refused_by),
        })?;

        debug!(mutant = %key, kind = ?record.kind(), "mutant activated");
        Ok(())
    }

    /// Restore the original behavior of whatever is active.
    ///
    /// No-op when nothing is active.
    pub fn deactivate(&self) {
        self.release(None);
    }

    /// Activate `key` and return a guard that deactivates it when dropped,
    /// including during unwinding.
    pub fn scoped(&self, key: &MutantKey) -> Result<ActivationGuard<'_, 'r>, ActivationError> {
        self.activate(key)?;
        Ok(ActivationGuard {
            controller: self,
            key: key.clone(),
        })
    }

    fn release(&self, only: Option<&MutantKey>) {
        if let Some(active) = self.state.take(only) {
            match &active.slot {
                Some(slot) => {
                    slot.restore(&active.key);
                }
                None => release_tag(&active.key),
            }
            debug!(mutant = %active.key, "mutant deactivated");
        }
    }
}

/// Keeps one mutant active for the guard's lifetime.
#[derive(Debug)]
#[must_use = "dropping the guard deactivates the mutant immediately"]
pub struct ActivationGuard<'c, 'r> {
    controller: &'c SubstitutionController<'r>,
    key: MutantKey,
}

impl ActivationGuard<'_, '_> {
    /// Mutant held by this guard.
    pub fn key(&self) -> &MutantKey {
        &self.key
    }
}

impl Drop for ActivationGuard<'_, '_> {
    fn drop(&mut self) {
        // Leave a mutant activated by someone else alone.
        self.controller.release(Some(&self.key));
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use proptest::prelude::*;

    use super::*;
    use crate::mutation::slot::{FunctionSlot, Substitutable};
    use crate::mutation::state::test_guard;
    use crate::mutation::switch::choose;

    type Abs = dyn Fn(i32) -> i32 + Send + Sync;

    fn fixture() -> (MutationRegistry, Arc<FunctionSlot<Abs>>) {
        let original: Arc<Abs> = Arc::new(|x: i32| x.abs());
        let slot = FunctionSlot::new("num::abs", original);
        let mut registry = MutationRegistry::new();
        registry
            .declare_function(&slot)
            .expect("slot should declare");
        let identity: Arc<Abs> = Arc::new(|x| x);
        registry
            .register_whole_function("num::abs", "IDENTITY", identity)
            .expect("identity mutant should register");
        let negate: Arc<Abs> = Arc::new(|x| -x);
        registry
            .register_whole_function("num::abs", "NEGATE", negate)
            .expect("negate mutant should register");
        registry
            .register_inline("num::cmp", "FLIP", || false, || true)
            .expect("inline mutant should register");
        (registry, slot)
    }

    fn keys() -> [MutantKey; 3] {
        [
            MutantKey::new("num::abs", "IDENTITY"),
            MutantKey::new("num::abs", "NEGATE"),
            MutantKey::new("num::cmp", "FLIP"),
        ]
    }

    #[test]
    fn activation_swaps_and_deactivation_restores() {
        let _guard = test_guard();
        let (registry, slot) = fixture();
        let controller = SubstitutionController::with_state(&registry, ActivationState::new());

        let before: Vec<i32> = (-3..=3).map(|x| (slot.current())(x)).collect();
        controller
            .activate(&MutantKey::new("num::abs", "NEGATE"))
            .expect("activation should succeed");
        assert_eq!((slot.current())(-4), 4);
        assert_eq!((slot.current())(4), -4);

        controller.deactivate();
        let after: Vec<i32> = (-3..=3).map(|x| (slot.current())(x)).collect();
        assert_eq!(before, after);
        assert!(!slot.is_substituted());
        assert_eq!(controller.active(), None);
    }

    #[test]
    fn second_activation_fails_while_one_is_active() {
        let _guard = test_guard();
        let (registry, _slot) = fixture();
        let controller = SubstitutionController::with_state(&registry, ActivationState::new());
        let [identity, negate, flip] = keys();

        controller
            .activate(&identity)
            .expect("first activation should succeed");
        for requested in [&negate, &flip, &identity] {
            assert_eq!(
                controller.activate(requested),
                Err(ActivationError::AlreadyActive {
                    active: identity.clone(),
                    requested: requested.clone(),
                })
            );
        }
        assert_eq!(controller.active(), Some(identity));
        controller.deactivate();
    }

    #[test]
    fn inline_activation_sets_marker_only() {
        let _guard = test_guard();
        let (registry, slot) = fixture();
        let state = ActivationState::new();
        let controller = SubstitutionController::with_state(&registry, state.clone());

        controller
            .activate(&MutantKey::new("num::cmp", "FLIP"))
            .expect("inline activation should succeed");
        assert!(state.choose("num::cmp", || false, || true));
        assert!(!slot.is_substituted());
        controller.deactivate();
        assert!(!state.choose("num::cmp", || false, || true));
    }

    #[test]
    fn unknown_mutant_is_rejected() {
        let _guard = test_guard();
        let (registry, _slot) = fixture();
        let controller = SubstitutionController::with_state(&registry, ActivationState::new());
        let key = MutantKey::new("num::abs", "MISSING");
        assert_eq!(
            controller.activate(&key),
            Err(ActivationError::UnknownMutant(key))
        );
        assert_eq!(controller.active(), None);
    }

    #[test]
    fn deactivate_without_active_mutant_is_a_noop() {
        let _guard = test_guard();
        let (registry, slot) = fixture();
        let controller = SubstitutionController::with_state(&registry, ActivationState::new());
        controller.deactivate();
        controller.deactivate();
        assert_eq!(controller.active(), None);
        assert_eq!((slot.current())(-2), 2);
    }

    #[test]
    fn guard_restores_on_panic() {
        let _guard = test_guard();
        let (registry, slot) = fixture();
        let controller = SubstitutionController::with_state(&registry, ActivationState::new());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _guard = controller
                .scoped(&MutantKey::new("num::abs", "IDENTITY"))
                .expect("activation should succeed");
            assert_eq!((slot.current())(-1), -1);
            panic!("test body crashed");
        }));

        assert!(outcome.is_err());
        assert_eq!(controller.active(), None);
        assert_eq!((slot.current())(-1), 1);
    }

    #[test]
    fn stale_guard_leaves_newer_activation_alone() {
        let _guard = test_guard();
        let (registry, _slot) = fixture();
        let controller = SubstitutionController::with_state(&registry, ActivationState::new());
        let [identity, _, flip] = keys();

        let guard = controller
            .scoped(&identity)
            .expect("activation should succeed");
        controller.deactivate();
        controller
            .activate(&flip)
            .expect("activation after manual deactivate should succeed");
        drop(guard);
        assert_eq!(controller.active(), Some(flip));
        controller.deactivate();
    }

    #[test]
    fn controllers_on_separate_states_share_one_slot() {
        let _guard = test_guard();
        let (registry, slot) = fixture();
        let first = SubstitutionController::with_state(&registry, ActivationState::new());
        let second = SubstitutionController::with_state(&registry, ActivationState::new());
        let [identity, negate, _] = keys();

        first
            .activate(&identity)
            .expect("first controller should activate");
        assert_eq!(
            second.activate(&negate),
            Err(ActivationError::AlreadyActive {
                active: identity.clone(),
                requested: negate.clone(),
            })
        );
        assert_eq!(second.active(), None);

        second.deactivate();
        assert_eq!(first.active(), Some(identity));
        assert_eq!((slot.current())(-5), -5);

        first.deactivate();
        assert_eq!((slot.current())(-5), 5);
        second
            .activate(&negate)
            .expect("slot should be free again");
        assert_eq!((slot.current())(5), -5);
        second.deactivate();
    }

    #[test]
    fn controllers_on_separate_states_share_one_inline_tag() {
        let _guard = test_guard();
        let (registry, _slot) = fixture();
        let first = SubstitutionController::with_state(&registry, ActivationState::new());
        let second = SubstitutionController::with_state(&registry, ActivationState::new());
        let [_, _, flip] = keys();

        first.activate(&flip).expect("first controller should activate");
        assert!(choose("num::cmp", || false, || true));
        assert_eq!(
            second.activate(&flip),
            Err(ActivationError::AlreadyActive {
                active: flip.clone(),
                requested: flip.clone(),
            })
        );

        second.deactivate();
        assert!(choose("num::cmp", || false, || true));
        first.deactivate();
        assert!(!choose("num::cmp", || false, || true));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Activate(usize),
        Deactivate,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(0usize..3).prop_map(Op::Activate), Just(Op::Deactivate)]
    }

    proptest! {
        #[test]
        fn at_most_one_mutant_is_ever_active(ops in prop::collection::vec(op(), 0..40)) {
            let _guard = test_guard();
            let (registry, slot) = fixture();
            let controller = SubstitutionController::with_state(&registry, ActivationState::new());
            let keys = keys();
            let mut model: Option<MutantKey> = None;

            for op in ops {
                match op {
                    Op::Activate(idx) => {
                        let result = controller.activate(&keys[idx]);
                        match model.clone() {
                            Some(active) => prop_assert_eq!(
                                result,
                                Err(ActivationError::AlreadyActive {
                                    active,
                                    requested: keys[idx].clone(),
                                })
                            ),
                            None => {
                                prop_assert_eq!(result, Ok(()));
                                model = Some(keys[idx].clone());
                            }
                        }
                    }
                    Op::Deactivate => {
                        controller.deactivate();
                        model = None;
                    }
                }
                prop_assert_eq!(controller.active(), model.clone());
                let substituted = model
                    .as_ref()
                    .is_some_and(|key| key.target.as_str() == "num::abs");
                prop_assert_eq!(slot.is_substituted(), substituted);
            }

            controller.deactivate();
            prop_assert_eq!((slot.current())(-9), 9);
        }
    }
}
