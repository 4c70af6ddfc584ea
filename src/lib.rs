//! # kitchensink-mutation
//!
//! `kitchensink-mutation` is a mutation-testing core for hand-declared mutants:
//! - `mutation`: registry, substitution controller, inline switch, session
//!   orchestration and reports
//! - `cli`: a thin `test`/`mutate` front end for harness binaries (feature `cli`)
//!
//! Mutants are written by hand next to the code they alter. Test bodies may
//! use the re-exported `proptest` for randomized inputs.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod mutation;
pub mod prelude;

#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod cli;

/// Re-export `proptest` for convenience.
pub use proptest;
