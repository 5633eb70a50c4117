//! Structural defects reported by a check

use crate::storage::page_constants::PageId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of B+tree page a key-order finding was raised on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLevel {
    /// Internal page
    Branch,
    /// Terminal page
    Leaf,
}

impl fmt::Display for NodeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeLevel::Branch => "branch",
            NodeLevel::Leaf => "leaf",
        })
    }
}

/// Page ids from a bucket root down to the page a finding was raised on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageStack(pub Vec<PageId>);

impl PageStack {
    /// Ids in root-first order
    pub fn ids(&self) -> &[PageId] {
        &self.0
    }
}

impl fmt::Display for PageStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")
    }
}

/// One structural defect
///
/// Keys are carried already rendered by the check's
/// [`KeyValueStringer`](crate::check::KeyValueStringer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum Finding {
    /// A page id appears more than once on the free list
    #[error("page {page_id}: already freed")]
    DoubleFreed {
        /// Repeated id
        page_id: PageId,
    },

    /// A reachable page lies past the high-water mark
    #[error("page {page_id}: out of bounds: {high_water_mark}")]
    OutOfBounds {
        /// Offending page
        page_id: PageId,
        /// Snapshot high-water mark
        high_water_mark: PageId,
    },

    /// A physical page is claimed by more than one logical page
    #[error("page {page_id}: multiple references")]
    MultipleReferences {
        /// Aliased physical page
        page_id: PageId,
    },

    /// A live page is also on the free list
    #[error("page {page_id}: reachable freed")]
    ReachableFreed {
        /// Offending page
        page_id: PageId,
    },

    /// A page reached through a bucket tree is neither branch nor leaf
    #[error("page {page_id}: invalid type: {page_type}")]
    InvalidPageType {
        /// Offending page
        page_id: PageId,
        /// Printable type of its flags
        page_type: String,
    },

    /// The key-order walk reached a page that is neither branch nor leaf
    #[error("unexpected page type {page_type} for pgid:{page_id}")]
    UnexpectedPageType {
        /// Offending page
        page_id: PageId,
        /// Printable type of its flags
        page_type: String,
    },

    /// A page below the high-water mark is neither reachable nor free
    #[error("page {page_id}: unreachable unfreed")]
    UnreachableUnfreed {
        /// Leaked page
        page_id: PageId,
    },

    /// The first key of a page sorts below the bound inherited from its ancestors
    #[error(
        "key ({index}: {key}) on {level} page({page_id}) needs to be >= to the key in the ancestor ({min_key}). Pages stack: {stack}"
    )]
    BelowAncestorMin {
        /// Page holding the key
        page_id: PageId,
        /// Page kind
        level: NodeLevel,
        /// Element index
        index: usize,
        /// Rendered key
        key: String,
        /// Rendered inclusive lower bound
        min_key: String,
        /// Path from the bucket root
        stack: PageStack,
    },

    /// A key sorts at or above the next separator of an ancestor
    #[error(
        "key ({index}: {key}) on {level} page({page_id}) needs to be < than key of the next element in ancestor ({max_key}). Pages stack: {stack}"
    )]
    AboveAncestorMax {
        /// Page holding the key
        page_id: PageId,
        /// Page kind
        level: NodeLevel,
        /// Element index
        index: usize,
        /// Rendered key
        key: String,
        /// Rendered exclusive upper bound
        max_key: String,
        /// Path from the bucket root
        stack: PageStack,
    },

    /// A leaf key sorts below its predecessor on the same page
    #[error(
        "key ({index}: {key}) on {level} page({page_id}) needs to be > (found <) than previous element ({previous}). Pages stack: {stack}"
    )]
    OutOfOrder {
        /// Page holding the key
        page_id: PageId,
        /// Page kind
        level: NodeLevel,
        /// Element index
        index: usize,
        /// Rendered key
        key: String,
        /// Rendered previous key
        previous: String,
        /// Path from the bucket root
        stack: PageStack,
    },

    /// A key equals its predecessor
    #[error(
        "key ({index}: {key}) on {level} page({page_id}) needs to be > (found =) than previous element ({previous}). Pages stack: {stack}"
    )]
    DuplicateKey {
        /// Page holding the key
        page_id: PageId,
        /// Page kind
        level: NodeLevel,
        /// Element index
        index: usize,
        /// Rendered key
        key: String,
        /// Rendered previous key
        previous: String,
        /// Path from the bucket root
        stack: PageStack,
    },

    /// A branch element points back at a page already on the path
    #[error("page {page_id}: cyclic reference. Pages stack: {stack}")]
    CyclicReference {
        /// Page referenced again
        page_id: PageId,
        /// Path from the bucket root, including the repeated id
        stack: PageStack,
    },
}

/// Discriminant of a [`Finding`], for counting and matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingKind {
    /// See [`Finding::DoubleFreed`]
    DoubleFreed,
    /// See [`Finding::OutOfBounds`]
    OutOfBounds,
    /// See [`Finding::MultipleReferences`]
    MultipleReferences,
    /// See [`Finding::ReachableFreed`]
    ReachableFreed,
    /// See [`Finding::InvalidPageType`]
    InvalidPageType,
    /// See [`Finding::UnexpectedPageType`]
    UnexpectedPageType,
    /// See [`Finding::UnreachableUnfreed`]
    UnreachableUnfreed,
    /// See [`Finding::BelowAncestorMin`]
    BelowAncestorMin,
    /// See [`Finding::AboveAncestorMax`]
    AboveAncestorMax,
    /// See [`Finding::OutOfOrder`]
    OutOfOrder,
    /// See [`Finding::DuplicateKey`]
    DuplicateKey,
    /// See [`Finding::CyclicReference`]
    CyclicReference,
}

impl Finding {
    /// Kind of this finding
    pub fn kind(&self) -> FindingKind {
        match self {
            Finding::DoubleFreed { .. } => FindingKind::DoubleFreed,
            Finding::OutOfBounds { .. } => FindingKind::OutOfBounds,
            Finding::MultipleReferences { .. } => FindingKind::MultipleReferences,
            Finding::ReachableFreed { .. } => FindingKind::ReachableFreed,
            Finding::InvalidPageType { .. } => FindingKind::InvalidPageType,
            Finding::UnexpectedPageType { .. } => FindingKind::UnexpectedPageType,
            Finding::UnreachableUnfreed { .. } => FindingKind::UnreachableUnfreed,
            Finding::BelowAncestorMin { .. } => FindingKind::BelowAncestorMin,
            Finding::AboveAncestorMax { .. } => FindingKind::AboveAncestorMax,
            Finding::OutOfOrder { .. } => FindingKind::OutOfOrder,
            Finding::DuplicateKey { .. } => FindingKind::DuplicateKey,
            Finding::CyclicReference { .. } => FindingKind::CyclicReference,
        }
    }

    /// Page the finding is about
    pub fn page_id(&self) -> PageId {
        match self {
            Finding::DoubleFreed { page_id }
            | Finding::OutOfBounds { page_id, .. }
            | Finding::MultipleReferences { page_id }
            | Finding::ReachableFreed { page_id }
            | Finding::InvalidPageType { page_id, .. }
            | Finding::UnexpectedPageType { page_id, .. }
            | Finding::UnreachableUnfreed { page_id }
            | Finding::BelowAncestorMin { page_id, .. }
            | Finding::AboveAncestorMax { page_id, .. }
            | Finding::OutOfOrder { page_id, .. }
            | Finding::DuplicateKey { page_id, .. }
            | Finding::CyclicReference { page_id, .. } => *page_id,
        }
    }

    /// Rendered offending key, for key-order findings
    pub fn key(&self) -> Option<&str> {
        match self {
            Finding::BelowAncestorMin { key, .. }
            | Finding::AboveAncestorMax { key, .. }
            | Finding::OutOfOrder { key, .. }
            | Finding::DuplicateKey { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Ancestor path, for findings raised by the key-order walk
    pub fn stack(&self) -> Option<&PageStack> {
        match self {
            Finding::BelowAncestorMin { stack, .. }
            | Finding::AboveAncestorMax { stack, .. }
            | Finding::OutOfOrder { stack, .. }
            | Finding::DuplicateKey { stack, .. }
            | Finding::CyclicReference { stack, .. } => Some(stack),
            _ => None,
        }
    }
}
