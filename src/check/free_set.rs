//! Free-set scanner: one pass over the free list

use crate::check::finding::Finding;
use crate::check::FindingSink;
use crate::common::error::Result;
use crate::storage::page_constants::PageId;
use std::collections::HashSet;

/// Page ids marked free as of the snapshot
#[derive(Debug, Clone, Default)]
pub struct FreeSet {
    ids: HashSet<PageId>,
}

impl FreeSet {
    /// Build the set, reporting `DoubleFreed` for every repeat of an id
    ///
    /// An id listed `k` times yields `k - 1` findings.
    ///
    /// # Errors
    ///
    /// Returns an error only if the sink rejects a finding.
    pub fn scan<S: FindingSink + ?Sized>(ids: &[PageId], sink: &mut S) -> Result<Self> {
        let mut set = HashSet::with_capacity(ids.len());
        for &id in ids {
            if !set.insert(id) {
                sink.report(Finding::DoubleFreed { page_id: id })?;
            }
        }
        Ok(Self { ids: set })
    }

    /// Check if `id` is free
    pub fn contains(&self, id: PageId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of distinct free ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if nothing is free
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
