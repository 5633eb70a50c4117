//! Structural consistency check of a snapshot
//!
//! A check scans the free list for duplicates, walks every page-backed
//! bucket claiming the pages it reaches, validates key order inside each
//! bucket tree and finally sweeps all ids below the high-water mark for
//! pages that are neither reachable nor free.
//!
//! [`check`] runs on a worker thread and streams [`Finding`]s over a
//! synchronous handoff channel; the worker blocks until each finding is
//! taken. [`check_into`] runs the same traversal on the caller's thread.
//!
//! ```no_run
//! use kvcheck::check::{check, CheckOptions};
//! use kvcheck::storage::tx::{OpenOptions, Tx};
//!
//! fn main() -> kvcheck::Result<()> {
//!     let tx = Tx::open_file("data.db", &OpenOptions::new())?;
//!     let mut stream = check(&tx, CheckOptions::default())?;
//!     for finding in stream.by_ref() {
//!         println!("{finding}");
//!     }
//!     stream.finish()
//! }
//! ```

pub mod finding;
pub mod free_set;
pub mod key_order;
pub mod reachability;
pub mod stringer;
pub mod walker;

pub use finding::{Finding, FindingKind, NodeLevel, PageStack};
pub use free_set::FreeSet;
pub use key_order::KeyOrderValidator;
pub use reachability::ReachabilityTracker;
pub use stringer::{HexKeyValueStringer, KeyValueStringer};
pub use walker::BucketWalker;

use crate::common::error::{Error, Result};
use crate::common::logging::Timer;
use crate::storage::tx::Tx;
use crate::{kvcheck_debug, kvcheck_error, kvcheck_info};
use crossbeam::channel::{self, Receiver, Sender};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default name of the check worker thread
pub const DEFAULT_THREAD_NAME: &str = "kvcheck";

const SLOW_CHECK_THRESHOLD: Duration = Duration::from_secs(1);

/// Destination for findings
pub trait FindingSink {
    /// Accept one finding
    ///
    /// # Errors
    ///
    /// An error stops the check; it is returned from the run unchanged.
    fn report(&mut self, finding: Finding) -> Result<()>;
}

impl FindingSink for Vec<Finding> {
    fn report(&mut self, finding: Finding) -> Result<()> {
        self.push(finding);
        Ok(())
    }
}

/// Sink that forwards findings over a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Finding>,
}

impl ChannelSink {
    /// Wrap the sending half of a channel
    pub fn new(sender: Sender<Finding>) -> Self {
        Self { sender }
    }
}

impl FindingSink for ChannelSink {
    fn report(&mut self, finding: Finding) -> Result<()> {
        self.sender.send(finding).map_err(|_| Error::Disconnected)
    }
}

struct CountingSink<'a, S: FindingSink + ?Sized> {
    inner: &'a mut S,
    count: usize,
}

impl<S: FindingSink + ?Sized> FindingSink for CountingSink<'_, S> {
    fn report(&mut self, finding: Finding) -> Result<()> {
        self.count += 1;
        self.inner.report(finding)
    }
}

/// Options for a check run
#[derive(Clone)]
pub struct CheckOptions {
    /// Renders keys inside finding messages
    pub stringer: Arc<dyn KeyValueStringer>,
    /// Findings buffered ahead of the consumer; 0 hands each one over synchronously
    pub channel_capacity: usize,
    /// Name of the worker thread
    pub thread_name: String,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            stringer: Arc::new(HexKeyValueStringer),
            channel_capacity: 0,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl fmt::Debug for CheckOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOptions")
            .field("channel_capacity", &self.channel_capacity)
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

impl CheckOptions {
    /// Default options: hex keys, synchronous handoff
    pub fn new() -> Self {
        Self::default()
    }

    /// Render keys with `stringer`
    #[must_use]
    pub fn stringer<K: KeyValueStringer + 'static>(mut self, stringer: K) -> Self {
        self.stringer = Arc::new(stringer);
        self
    }

    /// Buffer up to `capacity` findings ahead of the consumer
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Name the worker thread
    #[must_use]
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Findings of a running check
///
/// Iterating yields findings in traversal order until the worker finishes.
/// Dropping the stream early stops the worker at its next finding.
#[derive(Debug)]
pub struct CheckStream {
    receiver: Receiver<Finding>,
    handle: JoinHandle<Result<()>>,
}

impl CheckStream {
    /// Receiving half of the finding channel, for `select!`-style consumers
    pub fn receiver(&self) -> &Receiver<Finding> {
        &self.receiver
    }

    /// Wait for the next finding for at most `timeout`
    ///
    /// Returns `None` on timeout or once the stream is closed.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Finding> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Discard any remaining findings and wait for the worker
    ///
    /// An empty stream followed by `Ok(())` means the snapshot is
    /// consistent.
    ///
    /// # Errors
    ///
    /// Returns the fault that aborted the run, if any, or
    /// `Error::Internal` if the worker panicked.
    pub fn finish(self) -> Result<()> {
        let Self { receiver, handle } = self;
        let discarded = receiver.iter().count();
        if discarded > 0 {
            kvcheck_debug!("Discarded {} unread findings", discarded);
        }
        handle
            .join()
            .map_err(|_| Error::internal("check worker panicked"))?
    }
}

impl Iterator for CheckStream {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        self.receiver.recv().ok()
    }
}

/// Run a full check on the calling thread, reporting into `sink`
///
/// # Errors
///
/// Returns an error if the free list or a tree page cannot be resolved or
/// decoded, or if `sink` rejects a finding. Findings reported before the
/// error stay in `sink`.
pub fn check_into<S: FindingSink + ?Sized>(tx: &Tx, options: &CheckOptions, sink: &mut S) -> Result<()> {
    let timer = Timer::with_threshold("check", SLOW_CHECK_THRESHOLD);
    let meta = tx.meta();
    kvcheck_info!(
        "Starting check: txid={} pgid={} root={}",
        meta.txid,
        meta.pgid,
        meta.root.root
    );

    let mut sink = CountingSink { inner: sink, count: 0 };
    let free_ids = tx.free_page_ids()?;
    let free_set = FreeSet::scan(&free_ids, &mut sink)?;
    let mut tracker = ReachabilityTracker::seed(tx)?;

    let buckets = {
        let mut walker = BucketWalker::new(tx, &mut tracker, &free_set, options.stringer.as_ref(), &mut sink);
        walker.check_bucket(&tx.root_bucket())?;
        walker.buckets_checked()
    };
    tracker.sweep(meta.pgid, &free_set, &mut sink)?;

    kvcheck_info!(
        "Check finished: {} findings, {} buckets, {} reachable and {} free pages below {} in {:?}",
        sink.count,
        buckets,
        tracker.len(),
        free_set.len(),
        meta.pgid,
        timer.stop()
    );
    Ok(())
}

/// Start a check on a worker thread
///
/// The worker holds its own clone of `tx`.
///
/// # Errors
///
/// Returns an error if the worker thread cannot be spawned. Faults during
/// the run are returned from [`CheckStream::finish`].
pub fn check(tx: &Tx, options: CheckOptions) -> Result<CheckStream> {
    let (sender, receiver) = channel::bounded(options.channel_capacity);
    let tx = tx.clone();
    let handle = thread::Builder::new()
        .name(options.thread_name.clone())
        .spawn(move || {
            let mut sink = ChannelSink::new(sender);
            let result = check_into(&tx, &options, &mut sink);
            match &result {
                Err(Error::Disconnected) => kvcheck_debug!("Check stopped: finding receiver dropped"),
                Err(e) => kvcheck_error!("Check aborted: {}", e),
                Ok(()) => {}
            }
            result
        })?;
    Ok(CheckStream { receiver, handle })
}

/// Start a check rendering keys with `stringer`
///
/// # Errors
///
/// Returns an error if the worker thread cannot be spawned.
pub fn check_with<K: KeyValueStringer + 'static>(tx: &Tx, stringer: K) -> Result<CheckStream> {
    check(tx, CheckOptions::new().stringer(stringer))
}

/// Run a check to completion and return every finding
///
/// # Errors
///
/// Returns the fault that aborted the run, if any.
pub fn collect(tx: &Tx, options: CheckOptions) -> Result<Vec<Finding>> {
    let mut stream = check(tx, options)?;
    let findings: Vec<Finding> = stream.by_ref().collect();
    stream.finish()?;
    Ok(findings)
}

impl Tx {
    /// Start a check of this snapshot; see [`check`]
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn check(&self, options: CheckOptions) -> Result<CheckStream> {
        check(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::{init_test_logging, ImageBuilder, LeafEntry, Utf8KeyValueStringer};
    use pretty_assertions::assert_eq;

    fn corrupt_image() -> Vec<u8> {
        let mut builder = ImageBuilder::new();
        builder.leaf(3, &[LeafEntry::value("b", "1"), LeafEntry::value("a", "2")]);
        builder.freelist(2, &[4, 5, 5, 6]);
        builder.set_root(3).set_high_water(8);
        builder.build()
    }

    #[test]
    fn test_check_into_order() {
        init_test_logging();
        let tx = Tx::from_bytes(corrupt_image()).unwrap();
        let mut findings = Vec::new();
        let options = CheckOptions::new().stringer(Utf8KeyValueStringer);
        check_into(&tx, &options, &mut findings).unwrap();

        let kinds: Vec<_> = findings.iter().map(Finding::kind).collect();
        assert_eq!(
            kinds,
            vec![
                FindingKind::DoubleFreed,
                FindingKind::OutOfOrder,
                FindingKind::UnreachableUnfreed,
            ]
        );
        assert_eq!(findings[2].page_id(), 7);
    }

    #[test]
    fn test_stream_matches_synchronous_run() {
        init_test_logging();
        let tx = Tx::from_bytes(corrupt_image()).unwrap();
        let mut expected = Vec::new();
        check_into(&tx, &CheckOptions::default(), &mut expected).unwrap();

        let streamed = collect(&tx, CheckOptions::default()).unwrap();
        assert_eq!(streamed, expected);
        assert_eq!(streamed[1].key(), Some("61"));
    }

    #[test]
    fn test_method_and_check_with() {
        let tx = Tx::from_bytes(corrupt_image()).unwrap();
        let mut stream = tx.check(CheckOptions::new().channel_capacity(4).thread_name("kvcheck-test")).unwrap();
        assert_eq!(stream.next().map(|f| f.kind()), Some(FindingKind::DoubleFreed));
        stream.finish().unwrap();

        let mut stream = check_with(&tx, Utf8KeyValueStringer).unwrap();
        let keys: Vec<_> = stream.by_ref().filter_map(|f| f.key().map(str::to_owned)).collect();
        assert_eq!(keys, vec!["a".to_string()]);
        stream.finish().unwrap();
    }

    #[test]
    fn test_clean_image_closes_empty() {
        let mut builder = ImageBuilder::new();
        builder.leaf(3, &[LeafEntry::value("a", "1")]);
        builder.freelist(2, &[]);
        builder.set_root(3);
        let tx = Tx::from_bytes(builder.build()).unwrap();

        let mut stream = check(&tx, CheckOptions::default()).unwrap();
        assert!(stream.next().is_none());
        stream.finish().unwrap();
    }

    #[test]
    fn test_fatal_fault_returned_from_finish() {
        init_test_logging();
        let mut builder = ImageBuilder::new();
        builder.branch(3, &[("a", 400)]);
        builder.freelist(2, &[]);
        builder.set_root(3);
        let tx = Tx::from_bytes(builder.build()).unwrap();

        let err = collect(&tx, CheckOptions::default()).unwrap_err();
        assert!(matches!(err, Error::PageOutOfRange { page_id: 400, .. }));
    }

    #[test]
    fn test_channel_sink_disconnected() {
        let (sender, receiver) = channel::bounded(0);
        drop(receiver);
        let mut sink = ChannelSink::new(sender);
        assert_eq!(
            sink.report(Finding::DoubleFreed { page_id: 1 }),
            Err(Error::Disconnected)
        );
    }

    #[test]
    fn test_finish_discards_unread() {
        let tx = Tx::from_bytes(corrupt_image()).unwrap();
        let stream = check(&tx, CheckOptions::default()).unwrap();
        stream.finish().unwrap();
    }

    #[test]
    fn test_options_debug() {
        let options = CheckOptions::new().thread_name("worker");
        let debug = format!("{options:?}");
        assert!(debug.contains("worker"));
        assert!(debug.contains("channel_capacity: 0"));
    }
}
