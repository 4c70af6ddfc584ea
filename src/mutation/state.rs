//! Activation state: which mutant, if any, is live.
//!
//! Function slots and inline tags are process-wide, so each one can be held
//! by a single mutant at a time regardless of how many states exist.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::controller::ActivationError;
use super::registry::{MutantKey, MutantKind, Target};
use super::slot::Substitutable;

fn inline_markers() -> &'static RwLock<BTreeMap<String, MutantKey>> {
    static MARKERS: OnceLock<RwLock<BTreeMap<String, MutantKey>>> = OnceLock::new();
    MARKERS.get_or_init(RwLock::default)
}

/// Mark `key`'s tag as switched. Fails with the holder if the tag is taken.
pub(crate) fn claim_tag(key: &MutantKey) -> Result<(), MutantKey> {
    let mut markers = inline_markers()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(holder) = markers.get(key.target.as_str()) {
        return Err(holder.clone());
    }
    markers.insert(key.target.as_str().to_string(), key.clone());
    Ok(())
}

/// Clear `key`'s tag if `key` holds it.
pub(crate) fn release_tag(key: &MutantKey) {
    let mut markers = inline_markers()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if markers.get(key.target.as_str()) == Some(key) {
        markers.remove(key.target.as_str());
    }
}

/// True if some controller has an inline mutant active on `tag`.
pub(crate) fn tag_marked(tag: &str) -> bool {
    inline_markers()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(tag)
}

/// Serializes tests that activate mutants on shared tags or drive sessions.
#[cfg(test)]
pub(crate) fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// The mutant currently installed, plus what is needed to undo it.
#[derive(Clone)]
pub(crate) struct ActiveMutant {
    pub(crate) key: MutantKey,
    pub(crate) kind: MutantKind,
    /// Slot to restore for whole-function mutants.
    pub(crate) slot: Option<Arc<dyn Substitutable>>,
}

impl fmt::Debug for ActiveMutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveMutant")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Single slot holding at most one active mutant.
///
/// The substitution controller is the only writer. Separate states are
/// separate sessions; they still contend for the same function slots and
/// inline tags.
#[derive(Debug, Default)]
pub struct ActivationState {
    active: RwLock<Option<ActiveMutant>>,
}

impl ActivationState {
    /// Fresh, empty state. Useful for isolated sessions and tests.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// State shared by the whole process.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ActivationState>> = OnceLock::new();
        GLOBAL.get_or_init(ActivationState::new).clone()
    }

    /// Key of the active mutant.
    pub fn active(&self) -> Option<MutantKey> {
        self.read().as_ref().map(|active| active.key.clone())
    }

    /// True if the active mutant sits on `tag`.
    pub fn is_active_for(&self, tag: &str) -> bool {
        self.read()
            .as_ref()
            .is_some_and(|active| active.key.target.as_str() == tag)
    }

    /// Evaluate exactly one branch: `mutated` when the active mutant sits on
    /// `tag`, `original` otherwise.
    pub fn choose<T>(
        &self,
        tag: &str,
        original: impl FnOnce() -> T,
        mutated: impl FnOnce() -> T,
    ) -> T {
        // Decide first, then evaluate without holding the lock.
        if self.is_active_for(tag) {
            mutated()
        } else {
            original()
        }
    }

    pub(crate) fn active_on(&self, target: &Target) -> Option<MutantKey> {
        self.read()
            .as_ref()
            .filter(|active| &active.key.target == target)
            .map(|active| active.key.clone())
    }

    /// Store `candidate` if nothing is active and `install` succeeds.
    /// `install` runs under the write lock.
    pub(crate) fn try_set(
        &self,
        candidate: ActiveMutant,
        install: impl FnOnce() -> Result<(), ActivationError>,
    ) -> Result<(), ActivationError> {
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = guard.as_ref() {
            return Err(ActivationError::AlreadyActive {
                active: active.key.clone(),
                requested: candidate.key,
            });
        }
        install()?;
        *guard = Some(candidate);
        Ok(())
    }

    /// Clear the slot when `only` is `None` or names the active mutant.
    pub(crate) fn take(&self, only: Option<&MutantKey>) -> Option<ActiveMutant> {
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        match (guard.as_ref(), only) {
            (Some(active), Some(key)) if &active.key != key => None,
            _ => guard.take(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<ActiveMutant>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(tag: &str, id: &str) -> ActiveMutant {
        ActiveMutant {
            key: MutantKey::new(tag, id),
            kind: MutantKind::InlineChoice,
            slot: None,
        }
    }

    #[test]
    fn second_set_reports_the_occupant() {
        let state = ActivationState::new();
        assert_eq!(state.try_set(inline("a", "X"), || Ok(())), Ok(()));
        assert_eq!(
            state.try_set(inline("b", "Y"), || Ok(())),
            Err(ActivationError::AlreadyActive {
                active: MutantKey::new("a", "X"),
                requested: MutantKey::new("b", "Y"),
            })
        );
        assert_eq!(state.active(), Some(MutantKey::new("a", "X")));
    }

    #[test]
    fn failed_install_leaves_state_empty() {
        let state = ActivationState::new();
        let key = MutantKey::new("a", "X");
        assert_eq!(
            state.try_set(inline("a", "X"), || Err(ActivationError::SlotRejected(
                key.clone()
            ))),
            Err(ActivationError::SlotRejected(key))
        );
        assert_eq!(state.active(), None);
    }

    #[test]
    fn tag_claims_are_exclusive_and_owner_released() {
        let _guard = test_guard();
        let first = MutantKey::new("state::claims", "A");
        let second = MutantKey::new("state::claims", "B");

        assert_eq!(claim_tag(&first), Ok(()));
        assert!(tag_marked("state::claims"));
        assert_eq!(claim_tag(&second), Err(first.clone()));

        release_tag(&second);
        assert!(tag_marked("state::claims"));
        release_tag(&first);
        assert!(!tag_marked("state::claims"));
    }

    #[test]
    fn take_respects_owner_filter() {
        let state = ActivationState::new();
        state
            .try_set(inline("a", "X"), || Ok(()))
            .expect("empty state should accept");

        assert!(state.take(Some(&MutantKey::new("a", "Y"))).is_none());
        assert!(state.is_active_for("a"));
        assert!(state.take(Some(&MutantKey::new("a", "X"))).is_some());
        assert!(state.take(None).is_none());
    }

    #[test]
    fn choose_follows_the_active_tag() {
        let state = ActivationState::new();
        assert_eq!(state.choose("cmp", || 1, || 2), 1);

        state
            .try_set(inline("cmp", "X"), || Ok(()))
            .expect("empty state should accept");
        assert_eq!(state.choose("cmp", || 1, || 2), 2);
        assert_eq!(state.choose("other", || 1, || 2), 1);
        assert_eq!(
            state.active_on(&Target::new("cmp")),
            Some(MutantKey::new("cmp", "X"))
        );
        assert_eq!(state.active_on(&Target::new("other")), None);
    }
}
