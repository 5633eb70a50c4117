//! Bucket walker: page-level checks over a bucket and its nested buckets

use crate::check::finding::Finding;
use crate::check::free_set::FreeSet;
use crate::check::key_order::KeyOrderValidator;
use crate::check::reachability::ReachabilityTracker;
use crate::check::stringer::KeyValueStringer;
use crate::check::FindingSink;
use crate::common::error::Result;
use crate::storage::bucket::Bucket;
use crate::storage::page_type::describe_flags;
use crate::storage::tx::Tx;
use crate::{kvcheck_debug, kvcheck_trace};

/// Recursive descent over the bucket hierarchy of one snapshot
pub struct BucketWalker<'t, 's, S: FindingSink + ?Sized> {
    tx: &'t Tx,
    tracker: &'s mut ReachabilityTracker,
    free_set: &'s FreeSet,
    stringer: &'s dyn KeyValueStringer,
    sink: &'s mut S,
    buckets: usize,
}

impl<'t, 's, S: FindingSink + ?Sized> BucketWalker<'t, 's, S> {
    /// Walker claiming pages into `tracker`
    pub fn new(
        tx: &'t Tx,
        tracker: &'s mut ReachabilityTracker,
        free_set: &'s FreeSet,
        stringer: &'s dyn KeyValueStringer,
        sink: &'s mut S,
    ) -> Self {
        Self {
            tx,
            tracker,
            free_set,
            stringer,
            sink,
            buckets: 0,
        }
    }

    /// Number of page-backed buckets checked so far
    pub fn buckets_checked(&self) -> usize {
        self.buckets
    }

    /// Check `bucket`, then every bucket nested below it
    ///
    /// Inline buckets own no pages and are skipped along with anything
    /// nested inside them.
    ///
    /// # Errors
    ///
    /// Returns an error if a page of the tree cannot be resolved or
    /// decoded, or if the sink rejects a finding.
    pub fn check_bucket(&mut self, bucket: &Bucket<'t>) -> Result<()> {
        if bucket.is_inline() {
            return Ok(());
        }
        let tx = self.tx;
        let root = bucket.root();
        self.buckets += 1;
        kvcheck_debug!("Checking bucket rooted at page {}", root);

        let high_water_mark = tx.meta().pgid;
        let tracker = &mut *self.tracker;
        let free_set = self.free_set;
        let sink = &mut *self.sink;
        tx.for_each_page(root, 0, |page, depth| {
            let id = page.id();
            kvcheck_trace!("Visiting page {} at depth {} (overflow {})", id, depth, page.overflow());
            if id > high_water_mark {
                sink.report(Finding::OutOfBounds {
                    page_id: id,
                    high_water_mark,
                })?;
            }
            for physical in page.header().span() {
                tracker.claim(physical, id, sink)?;
            }
            if free_set.contains(id) {
                sink.report(Finding::ReachableFreed { page_id: id })?;
            } else if !page.is_branch() && !page.is_leaf() {
                sink.report(Finding::InvalidPageType {
                    page_id: id,
                    page_type: describe_flags(page.flags()),
                })?;
            }
            Ok(())
        })?;

        KeyOrderValidator::new(tx, self.stringer, &mut *self.sink).check(root)?;

        let mut children = Vec::new();
        let iteration = tx.for_each_nested_bucket(bucket, |key, child| {
            match child {
                Ok(child) => children.push(child),
                Err(e) => kvcheck_debug!(
                    "Skipping undecodable nested bucket {} in bucket {}: {}",
                    self.stringer.key_to_string(key),
                    root,
                    e
                ),
            }
            Ok(())
        });
        if let Err(e) = iteration {
            kvcheck_debug!("Stopped iterating bucket {}: {}", root, e);
        }

        for child in &children {
            self.check_bucket(child)?;
        }
        Ok(())
    }
}
