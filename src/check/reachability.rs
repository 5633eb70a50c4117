//! Reachability tracker: which logical page owns each physical page id

use crate::check::finding::Finding;
use crate::check::free_set::FreeSet;
use crate::check::FindingSink;
use crate::common::error::Result;
use crate::kvcheck_trace;
use crate::storage::page_constants::{PageId, META_PAGE_IDS};
use crate::storage::tx::Tx;
use std::collections::HashMap;

/// Physical page id to the id of the logical page spanning it
#[derive(Debug, Clone, Default)]
pub struct ReachabilityTracker {
    owners: HashMap<PageId, PageId>,
}

impl ReachabilityTracker {
    /// Tracker seeded with both meta pages and the free list's own span
    ///
    /// Seeding never reports findings; a free-list page that overlaps a meta
    /// page keeps the meta page as owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted free-list page cannot be resolved.
    pub fn seed(tx: &Tx) -> Result<Self> {
        let mut owners = HashMap::new();
        for id in META_PAGE_IDS {
            owners.insert(id, id);
        }
        if let Some(freelist) = tx.meta().freelist_page() {
            let page = tx.page(freelist)?;
            for id in page.header().span() {
                owners.entry(id).or_insert(freelist);
            }
        }
        Ok(Self { owners })
    }

    /// Attribute physical page `id` to logical page `owner`
    ///
    /// Reports `MultipleReferences` and keeps the first owner if `id` is
    /// already attributed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the sink rejects a finding.
    pub fn claim<S: FindingSink + ?Sized>(&mut self, id: PageId, owner: PageId, sink: &mut S) -> Result<()> {
        if let Some(&first) = self.owners.get(&id) {
            kvcheck_trace!("Page {} claimed by {} but owned by {}", id, owner, first);
            return sink.report(Finding::MultipleReferences { page_id: id });
        }
        self.owners.insert(id, owner);
        Ok(())
    }

    /// Report `UnreachableUnfreed` for every id in `[0, high_water_mark)`
    /// that is neither reachable nor free
    ///
    /// # Errors
    ///
    /// Returns an error only if the sink rejects a finding.
    pub fn sweep<S: FindingSink + ?Sized>(
        &self,
        high_water_mark: PageId,
        free_set: &FreeSet,
        sink: &mut S,
    ) -> Result<()> {
        for id in 0..high_water_mark {
            if !self.contains(id) && !free_set.contains(id) {
                sink.report(Finding::UnreachableUnfreed { page_id: id })?;
            }
        }
        Ok(())
    }

    /// Check if `id` is reachable
    pub fn contains(&self, id: PageId) -> bool {
        self.owners.contains_key(&id)
    }

    /// Logical page that owns `id`
    pub fn owner(&self, id: PageId) -> Option<PageId> {
        self.owners.get(&id).copied()
    }

    /// Number of reachable physical pages
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Check if nothing is reachable
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
