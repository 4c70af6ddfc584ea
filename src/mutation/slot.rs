//! Dispatch indirection for whole-function mutants.
//!
//! Code that should be mutable routes every call through a [`FunctionSlot`]:
//!
//! ```rust
//! use std::sync::{Arc, LazyLock};
//! use kitchensink_mutation::mutation::FunctionSlot;
//!
//! type Double = dyn Fn(u64) -> u64 + Send + Sync;
//!
//! static DOUBLE: LazyLock<Arc<FunctionSlot<Double>>> = LazyLock::new(|| {
//!     let original: Arc<Double> = Arc::new(|x| x * 2);
//!     FunctionSlot::new("math::double", original)
//! });
//!
//! pub fn double(x: u64) -> u64 {
//!     (DOUBLE.current())(x)
//! }
//!
//! assert_eq!(double(21), 42);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use super::registry::{MutantKey, Target};

/// Why a slot refused a replacement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    /// Replacement is not of the slot's function type.
    #[error("replacement type does not match the function slot")]
    TypeMismatch,
    /// Another mutant's replacement is installed.
    #[error("slot already holds mutant {0}")]
    Occupied(MutantKey),
}

/// A target whose implementation can be swapped and restored.
///
/// A slot holds at most one replacement at a time, owned by the mutant that
/// installed it, no matter how many controllers can reach the slot.
pub trait Substitutable: Send + Sync {
    /// Target this slot answers to.
    fn target(&self) -> &Target;

    /// True if `replacement` has this slot's function type.
    fn accepts(&self, replacement: &(dyn Any + Send + Sync)) -> bool;

    /// Make `replacement` the current implementation on behalf of `owner`.
    ///
    /// Leaves the slot untouched when the replacement has the wrong type or
    /// a replacement is already installed.
    fn install(
        &self,
        owner: &MutantKey,
        replacement: &(dyn Any + Send + Sync),
    ) -> Result<(), SlotError>;

    /// Put the original implementation back if `owner` installed the current
    /// replacement. Returns whether anything was restored.
    fn restore(&self, owner: &MutantKey) -> bool;

    /// Mutant whose replacement is installed.
    fn installed_by(&self) -> Option<MutantKey>;

    /// True while a replacement is installed.
    fn is_substituted(&self) -> bool {
        self.installed_by().is_some()
    }
}

struct Binding<F: ?Sized> {
    implementation: Arc<F>,
    owner: Option<MutantKey>,
}

/// Mutable reference to the current implementation of one function.
pub struct FunctionSlot<F: ?Sized> {
    target: Target,
    original: Arc<F>,
    current: RwLock<Binding<F>>,
}

impl<F> FunctionSlot<F>
where
    F: ?Sized + Send + Sync + 'static,
{
    /// Create a slot holding `original`.
    pub fn new(target: impl Into<Target>, original: Arc<F>) -> Arc<Self> {
        Arc::new(Self {
            target: target.into(),
            current: RwLock::new(Binding {
                implementation: original.clone(),
                owner: None,
            }),
            original,
        })
    }

    /// Implementation callers should invoke right now.
    ///
    /// The lock is released before the caller runs the function, so a
    /// replacement may call back into the same slot.
    pub fn current(&self) -> Arc<F> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .implementation
            .clone()
    }

    /// The implementation the slot was created with.
    pub fn original(&self) -> Arc<F> {
        self.original.clone()
    }
}

impl<F> Substitutable for FunctionSlot<F>
where
    F: ?Sized + Send + Sync + 'static,
{
    fn target(&self) -> &Target {
        &self.target
    }

    fn accepts(&self, replacement: &(dyn Any + Send + Sync)) -> bool {
        replacement.is::<Arc<F>>()
    }

    fn install(
        &self,
        owner: &MutantKey,
        replacement: &(dyn Any + Send + Sync),
    ) -> Result<(), SlotError> {
        let implementation = replacement
            .downcast_ref::<Arc<F>>()
            .ok_or(SlotError::TypeMismatch)?;
        let mut binding = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(holder) = &binding.owner {
            return Err(SlotError::Occupied(holder.clone()));
        }
        binding.implementation = implementation.clone();
        binding.owner = Some(owner.clone());
        Ok(())
    }

    fn restore(&self, owner: &MutantKey) -> bool {
        let mut binding = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if binding.owner.as_ref() != Some(owner) {
            return false;
        }
        binding.implementation = self.original.clone();
        binding.owner = None;
        true
    }

    fn installed_by(&self) -> Option<MutantKey> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .owner
            .clone()
    }
}

impl<F: ?Sized> fmt::Debug for FunctionSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSlot")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
