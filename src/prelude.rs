//! Prelude module for convenient imports.
//!
//! This module re-exports the declaration surface: everything instrumented
//! code and harnesses touch.
//!
//! # Example
//!
//! ```rust
//! use kitchensink_mutation::prelude::*;
//!
//! let mut registry = MutationRegistry::new();
//! registry
//!     .register_inline("limit", "OFF_BY_ONE", || 10, || 11)
//!     .unwrap();
//! assert_eq!(choose("limit", || 10, || 11), 10);
//! ```

// Re-export proptest
pub use proptest::prelude::*;

pub use crate::mutation::{
    ActivationState, FunctionSlot, InProcessSuite, MutantKey, MutationConfig, MutationRegistry,
    MutationReport, SubstitutionController, TestExecutor, TestSelector, choose, choose_registered,
    run_session,
};
