//! Catalog of declared mutants and their test linkage.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::slot::{FunctionSlot, Substitutable};

/// Type-erased replacement payload stored in a [`MutantRecord`].
pub(crate) type Replacement = Arc<dyn Any + Send + Sync>;

/// Function path or inline call-site tag that mutants attach to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Build a target from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Target name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// User-chosen mutant name, unique within its target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutantId(String);

impl MutantId {
    /// Build an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MutantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MutantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of one mutant: its target plus its id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutantKey {
    /// Mutated target.
    pub target: Target,
    /// Mutant id within the target.
    pub id: MutantId,
}

impl MutantKey {
    /// Build a key from a target and an id.
    pub fn new(target: impl Into<Target>, id: impl Into<MutantId>) -> Self {
        Self {
            target: target.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MutantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.id)
    }
}

/// How a mutant alters its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantKind {
    /// Replaces a whole function behind a [`FunctionSlot`].
    WholeFunction,
    /// Flips a single inline switch point.
    InlineChoice,
}

/// Original and mutated branches of a registered inline mutant.
pub(crate) struct InlineBranches<T> {
    pub(crate) original: Arc<dyn Fn() -> T + Send + Sync>,
    pub(crate) mutated: Arc<dyn Fn() -> T + Send + Sync>,
}

/// One declared mutant. Immutable once registered.
pub struct MutantRecord {
    key: MutantKey,
    kind: MutantKind,
    replacement: Replacement,
}

impl MutantRecord {
    /// Identity of the mutant.
    pub fn key(&self) -> &MutantKey {
        &self.key
    }

    /// Mutated target.
    pub fn target(&self) -> &Target {
        &self.key.target
    }

    /// Mutant id.
    pub fn id(&self) -> &MutantId {
        &self.key.id
    }

    /// Mutation kind.
    pub fn kind(&self) -> MutantKind {
        self.kind
    }

    pub(crate) fn replacement(&self) -> &Replacement {
        &self.replacement
    }

    pub(crate) fn inline_branches<T: 'static>(&self) -> Option<&InlineBranches<T>> {
        match self.kind {
            MutantKind::InlineChoice => self.replacement.downcast_ref::<InlineBranches<T>>(),
            MutantKind::WholeFunction => None,
        }
    }
}

impl fmt::Debug for MutantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutantRecord")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Which tests to run while a mutant is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSelector {
    /// Every test declared in one file.
    File(PathBuf),
    /// Every test whose name contains the pattern. Empty matches all.
    Pattern(String),
}

impl TestSelector {
    /// Interpret a command-line style selector.
    ///
    /// Strings ending in `.rs` or containing a path separator name a file;
    /// anything else is a name pattern.
    pub fn parse(raw: &str) -> Self {
        if raw.ends_with(".rs") || raw.contains('/') || raw.contains('\\') {
            Self::File(PathBuf::from(raw))
        } else {
            Self::Pattern(raw.to_string())
        }
    }

    /// Selector matching every test.
    pub fn all() -> Self {
        Self::Pattern(String::new())
    }
}

impl fmt::Display for TestSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Pattern(pattern) => write!(f, "pattern:{pattern}"),
        }
    }
}

/// Registration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The (target, id) pair is already registered.
    #[error("mutant {0} is already registered")]
    DuplicateMutant(MutantKey),
    /// Target does not exist or cannot host this kind of mutant.
    #[error("invalid target `{target}`: {reason}")]
    InvalidTarget {
        /// Offending target.
        target: Target,
        /// Why the target was rejected.
        reason: String,
    },
}

impl RegistryError {
    fn invalid(target: &Target, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.clone(),
            reason: reason.into(),
        }
    }
}

/// Process-wide catalog of mutants, function slots and test linkage.
#[derive(Default)]
pub struct MutationRegistry {
    records: Vec<MutantRecord>,
    index: BTreeMap<MutantKey, usize>,
    slots: BTreeMap<Target, Arc<dyn Substitutable>>,
    linkage: BTreeMap<Target, TestSelector>,
    descriptions: BTreeMap<MutantKey, String>,
}

impl MutationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a function slot so whole-function mutants can target it.
    pub fn declare_function<F>(&mut self, slot: &Arc<FunctionSlot<F>>) -> Result<(), RegistryError>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        let target = slot.target().clone();
        if self.slots.contains_key(&target) {
            return Err(RegistryError::invalid(&target, "function already declared"));
        }
        if self.has_kind(&target, MutantKind::InlineChoice) {
            return Err(RegistryError::invalid(&target, "name is in use as an inline tag"));
        }
        debug!(%target, "declared function slot");
        let slot: Arc<dyn Substitutable> = slot.clone();
        self.slots.insert(target, slot);
        Ok(())
    }

    /// Register a replacement implementation for a declared function.
    ///
    /// `F` must be the slot's own function type, e.g.
    /// `dyn Fn(&mut Bag, u32) + Send + Sync`.
    pub fn register_whole_function<F>(
        &mut self,
        target: impl Into<Target>,
        id: impl Into<MutantId>,
        replacement: Arc<F>,
    ) -> Result<&MutantRecord, RegistryError>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        let key = MutantKey::new(target, id);
        self.ensure_unique(&key)?;
        let slot = self
            .slots
            .get(&key.target)
            .ok_or_else(|| RegistryError::invalid(&key.target, "no function declared"))?;
        let replacement: Replacement = Arc::new(replacement);
        if !slot.accepts(replacement.as_ref()) {
            return Err(RegistryError::invalid(
                &key.target,
                "replacement type does not match the function slot",
            ));
        }
        Ok(self.push(key, MutantKind::WholeFunction, replacement))
    }

    /// Register an inline mutant as a pair of lazily evaluated branches.
    pub fn register_inline<T, O, M>(
        &mut self,
        tag: impl Into<Target>,
        id: impl Into<MutantId>,
        original: O,
        mutated: M,
    ) -> Result<&MutantRecord, RegistryError>
    where
        T: 'static,
        O: Fn() -> T + Send + Sync + 'static,
        M: Fn() -> T + Send + Sync + 'static,
    {
        let key = MutantKey::new(tag, id);
        self.ensure_unique(&key)?;
        if key.target.as_str().trim().is_empty() {
            return Err(RegistryError::invalid(&key.target, "inline tag is empty"));
        }
        if self.slots.contains_key(&key.target) {
            return Err(RegistryError::invalid(
                &key.target,
                "tag names a declared function",
            ));
        }
        let branches = InlineBranches {
            original: Arc::new(original),
            mutated: Arc::new(mutated),
        };
        let replacement: Replacement = Arc::new(branches);
        Ok(self.push(key, MutantKind::InlineChoice, replacement))
    }

    /// Attach a description to a registered mutant. The record itself is
    /// left as registered.
    pub fn describe(
        &mut self,
        key: &MutantKey,
        description: impl Into<String>,
    ) -> Result<(), RegistryError> {
        if !self.index.contains_key(key) {
            return Err(RegistryError::invalid(
                &key.target,
                format!("unknown mutant {key}"),
            ));
        }
        self.descriptions.insert(key.clone(), description.into());
        Ok(())
    }

    /// Description attached with [`describe`](Self::describe).
    pub fn description(&self, key: &MutantKey) -> Option<&str> {
        self.descriptions.get(key).map(String::as_str)
    }

    /// Link every currently known target to `selector`.
    ///
    /// Last write wins: a later call replaces the selector of every target
    /// known at that time. Targets registered afterwards stay unlinked until
    /// linked again.
    pub fn link_targets_to_tests(&mut self, selector: TestSelector) {
        let targets: Vec<Target> = self.records.iter().map(|r| r.target().clone()).collect();
        for target in targets {
            if let Some(previous) = self.linkage.insert(target.clone(), selector.clone()) {
                if previous != selector {
                    debug!(%target, %previous, %selector, "test linkage replaced");
                }
            }
        }
    }

    /// Link one target to `selector`, replacing any previous link.
    pub fn link_target(&mut self, target: impl Into<Target>, selector: TestSelector) {
        self.linkage.insert(target.into(), selector);
    }

    /// True if any target is linked to a test selector.
    pub fn has_linkage(&self) -> bool {
        !self.linkage.is_empty()
    }

    /// Selector linked to `target`.
    pub fn linked_tests(&self, target: &Target) -> Option<&TestSelector> {
        self.linkage.get(target)
    }

    /// All mutants in registration order. Call again to restart.
    pub fn all_mutants(&self) -> impl Iterator<Item = &MutantRecord> + '_ {
        self.records.iter()
    }

    /// Look up one mutant.
    pub fn get(&self, key: &MutantKey) -> Option<&MutantRecord> {
        self.index.get(key).map(|&idx| &self.records[idx])
    }

    /// Mutants registered on `target`, in registration order.
    pub fn mutants_of<'a>(&'a self, target: &'a Target) -> impl Iterator<Item = &'a MutantRecord> {
        self.records.iter().filter(move |r| r.target() == target)
    }

    /// Number of registered mutants.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn slot(&self, target: &Target) -> Option<&Arc<dyn Substitutable>> {
        self.slots.get(target)
    }

    fn has_kind(&self, target: &Target, kind: MutantKind) -> bool {
        self.mutants_of(target).any(|r| r.kind == kind)
    }

    fn ensure_unique(&self, key: &MutantKey) -> Result<(), RegistryError> {
        if self.index.contains_key(key) {
            return Err(RegistryError::DuplicateMutant(key.clone()));
        }
        Ok(())
    }

    fn push(&mut self, key: MutantKey, kind: MutantKind, replacement: Replacement) -> &MutantRecord {
        debug!(mutant = %key, ?kind, "registered mutant");
        let idx = self.records.len();
        self.index.insert(key.clone(), idx);
        self.records.push(MutantRecord {
            key,
            kind,
            replacement,
        });
        &self.records[idx]
    }
}

impl fmt::Debug for MutationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRegistry")
            .field("records", &self.records)
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .field("linkage", &self.linkage)
            .field("descriptions", &self.descriptions)
            .finish()
    }
}
