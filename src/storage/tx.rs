//! Read-only transaction snapshot over a database image
//!
//! `Tx` is the page accessor the checker consumes. It resolves page ids
//! to [`Page`] views, exposes the chosen meta, the free list, a pre-order
//! page-tree traversal and bucket iteration. It never writes to the image.

use crate::common::error::{Error, Result};
use crate::storage::bucket::Bucket;
use crate::storage::freelist::read_free_ids;
use crate::storage::meta::Meta;
use crate::storage::page::{LeafElement, Page};
use crate::storage::page_constants::{PageId, META_PAGE_IDS, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::storage::page_header::PageHeader;
use crate::storage::page_io::{calculate_page_offset, Image};
use crate::storage::page_type::{describe_flags, PageType};
use crate::{kvcheck_debug, kvcheck_warn};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Options for opening a snapshot
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Page size to assume when locating the second meta page.
    /// Taken from meta page 0 when unset.
    pub page_size: Option<usize>,
}

impl OpenOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Assume a specific page size
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Read-only snapshot of one transaction
///
/// Cloning is cheap; clones share the image and the lazily loaded free list.
#[derive(Debug, Clone)]
pub struct Tx {
    image: Arc<Image>,
    meta: Meta,
    page_size: usize,
    free_ids: Arc<RwLock<Option<Arc<Vec<PageId>>>>>,
}

impl Tx {
    /// Open a snapshot over an image, using the newest valid meta page
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if neither meta page is valid.
    pub fn open(image: Image, options: &OpenOptions) -> Result<Self> {
        let bytes = image.as_bytes();
        let meta0 = read_meta(bytes, 0, PAGE_SIZE);
        let page_size = options
            .page_size
            .or_else(|| meta0.as_ref().ok().map(|m| m.page_size as usize))
            .unwrap_or(PAGE_SIZE);
        let meta1 = read_meta(bytes, 1, page_size);

        let meta = match (meta0, meta1) {
            (Ok(m0), Ok(m1)) => {
                if m1.txid > m0.txid {
                    m1
                } else {
                    m0
                }
            }
            (Ok(m), Err(e)) | (Err(e), Ok(m)) => {
                kvcheck_warn!("Using remaining valid meta page (txid {}): {}", m.txid, e);
                m
            }
            (Err(e0), Err(e1)) => {
                return Err(Error::corruption(format!(
                    "no valid meta page: meta 0: {e0}; meta 1: {e1}"
                )))
            }
        };

        kvcheck_debug!(
            "Opened snapshot txid={} pgid={} page_size={} image_len={}",
            meta.txid,
            meta.pgid,
            meta.page_size,
            bytes.len()
        );

        Ok(Self {
            page_size: meta.page_size as usize,
            meta,
            image: Arc::new(image),
            free_ids: Arc::new(RwLock::new(None)),
        })
    }

    /// Open a snapshot over an in-memory image
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if neither meta page is valid.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open(Image::from_bytes(bytes), &OpenOptions::default())
    }

    /// Memory-map a database file and open a snapshot over it
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be mapped or holds no valid meta page.
    pub fn open_file<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
        Self::open(Image::open(path)?, options)
    }

    /// Meta snapshot of this transaction
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Page size of the image
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of whole pages in the image
    pub fn page_count(&self) -> u64 {
        (self.image.len() / self.page_size) as u64
    }

    /// Resolve a page id to its view
    ///
    /// # Errors
    ///
    /// Returns `Error::PageOutOfRange` if the page header lies outside the
    /// image, or `Error::Corruption` if its overflow span does.
    pub fn page(&self, id: PageId) -> Result<Page<'_>> {
        let bytes = self.image.as_bytes();
        let out_of_range = || Error::PageOutOfRange {
            page_id: id,
            page_count: self.page_count(),
        };

        let offset = calculate_page_offset(id, self.page_size).ok_or_else(out_of_range)?;
        if offset + self.page_size > bytes.len() {
            return Err(out_of_range());
        }

        let header = PageHeader::read_from(&bytes[offset..])?;
        let span = (header.overflow as usize)
            .checked_add(1)
            .and_then(|pages| pages.checked_mul(self.page_size))
            .and_then(|len| len.checked_add(offset))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                Error::corruption(format!(
                    "page {id}: overflow {} runs past the end of the image",
                    header.overflow
                ))
            })?;

        Page::new(&bytes[offset..span])
    }

    /// All free page ids as of this snapshot, duplicates preserved
    ///
    /// When the free list is not persisted as pages it is rebuilt from the
    /// ids in `[2, pgid)` that no bucket tree reaches. The result is cached
    /// and shared between clones.
    ///
    /// # Errors
    ///
    /// Returns an error if a free-list or tree page cannot be decoded.
    pub fn free_page_ids(&self) -> Result<Arc<Vec<PageId>>> {
        if let Some(ids) = self.free_ids.read().as_ref() {
            return Ok(Arc::clone(ids));
        }

        let ids = Arc::new(match self.meta.freelist_page() {
            Some(id) => read_free_ids(&self.page(id)?)?,
            None => self.rebuild_free_ids()?,
        });
        *self.free_ids.write() = Some(Arc::clone(&ids));
        Ok(ids)
    }

    /// Number of entries on the free list
    ///
    /// # Errors
    ///
    /// Returns an error if the free list cannot be loaded.
    pub fn free_count(&self) -> Result<usize> {
        Ok(self.free_page_ids()?.len())
    }

    /// Pre-order, depth-first traversal of the page tree rooted at `root`
    ///
    /// `visit` receives every page with its depth, starting at `depth`.
    /// Branch children are visited in element order. A child already on
    /// the current path is visited but not descended into again.
    ///
    /// # Errors
    ///
    /// Returns the first error from page resolution or from `visit`.
    pub fn for_each_page<'a, F>(&'a self, root: PageId, depth: usize, mut visit: F) -> Result<()>
    where
        F: FnMut(Page<'a>, usize) -> Result<()>,
    {
        let mut path = Vec::with_capacity(16);
        path.push(root);
        self.for_each_page_inner(&mut path, depth, &mut visit)
    }

    fn for_each_page_inner<'a, F>(&'a self, path: &mut Vec<PageId>, depth: usize, visit: &mut F) -> Result<()>
    where
        F: FnMut(Page<'a>, usize) -> Result<()>,
    {
        let (&id, ancestors) = path.split_last().ok_or_else(|| Error::internal("empty page path"))?;
        let page = self.page(id)?;
        visit(page, depth)?;

        if !page.is_branch() || ancestors.contains(&id) {
            return Ok(());
        }
        for index in 0..page.count() {
            let child = page.branch_element(index)?.pgid;
            path.push(child);
            let result = self.for_each_page_inner(path, depth + 1, visit);
            path.pop();
            result?;
        }
        Ok(())
    }

    /// The root bucket of this snapshot
    pub fn root_bucket(&self) -> Bucket<'_> {
        Bucket::from_header(self.meta.root)
    }

    /// Visit every `(key, value)` pair of a bucket in tree order
    ///
    /// # Errors
    ///
    /// Returns the first error from page decoding or from `visit`; the
    /// iteration stops there.
    pub fn bucket_for_each<'a, F>(&'a self, bucket: &Bucket<'a>, mut visit: F) -> Result<()>
    where
        F: FnMut(&'a [u8], &'a [u8]) -> Result<()>,
    {
        self.leaf_elements_for_each(bucket, &mut |elem: &LeafElement<'a>| visit(elem.key, elem.value))
    }

    /// Visit every value of a bucket flagged as a nested bucket, in tree order
    ///
    /// Each value is decoded where it lies; `visit` receives the key and the
    /// outcome of decoding it, so a malformed value does not stop the
    /// iteration.
    ///
    /// # Errors
    ///
    /// Returns the first error from page decoding or from `visit`.
    pub fn for_each_nested_bucket<'a, F>(&'a self, bucket: &Bucket<'a>, mut visit: F) -> Result<()>
    where
        F: FnMut(&'a [u8], Result<Bucket<'a>>) -> Result<()>,
    {
        self.leaf_elements_for_each(bucket, &mut |elem: &LeafElement<'a>| {
            if elem.is_bucket() {
                visit(elem.key, Bucket::from_value(elem.value))
            } else {
                Ok(())
            }
        })
    }

    fn leaf_elements_for_each<'a>(
        &'a self,
        bucket: &Bucket<'a>,
        visit: &mut dyn FnMut(&LeafElement<'a>) -> Result<()>,
    ) -> Result<()> {
        if let Some(page) = bucket.inline_page() {
            for elem in page.leaf_elements()? {
                visit(&elem)?;
            }
            return Ok(());
        }
        if bucket.is_inline() {
            return Ok(());
        }

        let mut path = vec![bucket.root()];
        self.leaf_elements_inner(&mut path, visit)
    }

    fn leaf_elements_inner<'a>(
        &'a self,
        path: &mut Vec<PageId>,
        visit: &mut dyn FnMut(&LeafElement<'a>) -> Result<()>,
    ) -> Result<()> {
        let (&id, ancestors) = path.split_last().ok_or_else(|| Error::internal("empty page path"))?;
        if ancestors.contains(&id) {
            return Ok(());
        }

        let page = self.page(id)?;
        if page.is_branch() {
            for elem in page.branch_elements()? {
                path.push(elem.pgid);
                let result = self.leaf_elements_inner(path, visit);
                path.pop();
                result?;
            }
        } else if page.is_leaf() {
            for elem in page.leaf_elements()? {
                visit(&elem)?;
            }
        }
        Ok(())
    }

    /// Decode the value stored under `key` as a nested bucket
    ///
    /// Returns `Ok(None)` when the key is absent or its value is not
    /// flagged as a bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if a page on the search path cannot be decoded or
    /// the flagged value is not a valid bucket.
    pub fn bucket_at<'a>(&'a self, bucket: &Bucket<'a>, key: &[u8]) -> Result<Option<Bucket<'a>>> {
        let leaf = match bucket.inline_page() {
            Some(page) => *page,
            None if bucket.is_inline() => return Ok(None),
            None => match self.seek_leaf(bucket.root(), key)? {
                Some(page) => page,
                None => return Ok(None),
            },
        };

        for elem in leaf.leaf_elements()? {
            if elem.key == key {
                return if elem.is_bucket() {
                    Bucket::from_value(elem.value).map(Some)
                } else {
                    Ok(None)
                };
            }
        }
        Ok(None)
    }

    /// Descend to the leaf that would hold `key`
    fn seek_leaf(&self, root: PageId, key: &[u8]) -> Result<Option<Page<'_>>> {
        let mut path = Vec::new();
        let mut id = root;
        loop {
            if path.contains(&id) {
                return Ok(None);
            }
            path.push(id);

            let page = self.page(id)?;
            if page.is_leaf() && !page.is_branch() {
                return Ok(Some(page));
            }
            if !page.is_branch() {
                return Ok(None);
            }

            let elems = page.branch_elements()?;
            let Some(first) = elems.first() else {
                return Ok(None);
            };
            id = elems
                .iter()
                .take_while(|elem| elem.key <= key)
                .last()
                .unwrap_or(first)
                .pgid;
        }
    }

    /// Ids in `[2, pgid)` not reached from the root bucket tree
    fn rebuild_free_ids(&self) -> Result<Vec<PageId>> {
        let mut reachable = HashSet::new();
        self.mark_reachable(&self.root_bucket(), &mut reachable)?;

        let free: Vec<PageId> = (META_PAGE_IDS.len() as PageId..self.meta.pgid)
            .filter(|id| !reachable.contains(id))
            .collect();
        kvcheck_debug!(
            "Rebuilt free list: {} free of {} pages",
            free.len(),
            self.meta.pgid
        );
        Ok(free)
    }

    fn mark_reachable(&self, bucket: &Bucket<'_>, reachable: &mut HashSet<PageId>) -> Result<()> {
        if bucket.is_inline() {
            return Ok(());
        }
        let root = bucket.root();
        self.for_each_page(root, 0, |page, _| {
            reachable.extend(page.header().span());
            Ok(())
        })?;

        let mut children = Vec::new();
        let iteration = self.for_each_nested_bucket(bucket, |key, child| {
            match child {
                Ok(child) => children.push(child),
                Err(e) => kvcheck_debug!(
                    "Skipping undecodable nested bucket {} in bucket {}: {}",
                    hex::encode(key),
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
            self.mark_reachable(child, reachable)?;
        }
        Ok(())
    }
}

fn read_meta(bytes: &[u8], id: PageId, page_size: usize) -> Result<Meta> {
    let offset = calculate_page_offset(id, page_size).ok_or_else(|| Error::corruption("meta offset overflow"))?;
    let page = bytes
        .get(offset..)
        .filter(|rest| rest.len() >= PAGE_HEADER_SIZE)
        .ok_or_else(|| Error::corruption(format!("meta page {id} missing")))?;
    let header = PageHeader::read_from(page)?;
    if header.page_type() != Some(PageType::Meta) {
        return Err(Error::corruption(format!(
            "page {id}: expected meta page, found {}",
            describe_flags(header.flags)
        )));
    }
    let meta = Meta::read_from(page)?;
    meta.validate()?;
    Ok(meta)
}
