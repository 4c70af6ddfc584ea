//! Inline mutation points.
//!
//! A mutation point is an ordinary expression wrapped in [`choose`]:
//!
//! ```rust
//! use kitchensink_mutation::mutation::choose;
//!
//! fn is_adult(age: u32) -> bool {
//!     choose("is_adult::cmp", || age >= 18, || age > 18)
//! }
//!
//! assert!(is_adult(18));
//! ```

use super::registry::{MutationRegistry, RegistryError, Target};
use super::state::{ActivationState, tag_marked};

/// Evaluate `mutated` if any controller has an inline mutant active on
/// `tag`, `original` otherwise. Exactly one branch runs.
pub fn choose<T>(tag: &str, original: impl FnOnce() -> T, mutated: impl FnOnce() -> T) -> T {
    if tag_marked(tag) {
        mutated()
    } else {
        original()
    }
}

/// Evaluate the branches registered for `tag` with
/// [`MutationRegistry::register_inline`].
///
/// When the active mutant sits on `tag` its own mutated branch runs;
/// otherwise the original branch of the first mutant registered on `tag`.
/// Fails with [`RegistryError::InvalidTarget`] if `tag` has no inline
/// mutant producing `T`.
pub fn choose_registered<T: 'static>(
    registry: &MutationRegistry,
    state: &ActivationState,
    tag: &str,
) -> Result<T, RegistryError> {
    let target = Target::new(tag);
    let invalid = |reason: &str| RegistryError::InvalidTarget {
        target: target.clone(),
        reason: reason.to_string(),
    };

    if let Some(active) = state.active_on(&target) {
        let branches = registry
            .get(&active)
            .and_then(|record| record.inline_branches::<T>())
            .ok_or_else(|| invalid("active mutant has no inline branches of this type"))?;
        let mutated = branches.mutated.clone();
        return Ok(mutated());
    }

    let branches = registry
        .mutants_of(&target)
        .find_map(|record| record.inline_branches::<T>())
        .ok_or_else(|| invalid("no inline mutant of this type is registered"))?;
    let original = branches.original.clone();
    Ok(original())
}
