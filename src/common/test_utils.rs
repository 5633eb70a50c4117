//! Test utilities for kvcheck
//!
//! The encoders here lay pages out byte-exactly so tests can build both
//! well-formed and deliberately corrupt images.

use crate::check::KeyValueStringer;
use crate::common::Result;
use crate::storage::bucket::BucketHeader;
use crate::storage::meta::Meta;
use crate::storage::page::{BranchElementHeader, LeafElementHeader};
use crate::storage::page_constants::{
    PageId, BRANCH_ELEMENT_SIZE, BUCKET_LEAF_FLAG, FREELIST_COUNT_OVERFLOW, LEAF_ELEMENT_SIZE,
    PAGE_HEADER_SIZE, PAGE_SIZE, PGID_NO_FREELIST,
};
use crate::storage::page_header::PageHeader;
use crate::storage::page_type::PageType;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

static TEST_LOGGER_INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_test_logging() {
    TEST_LOGGER_INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Temporary directory helper for tests
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// Create a new temporary directory
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("kvcheck_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;

        Ok(Self { path })
    }

    /// Get the path to the temporary directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a file path within the temporary directory
    pub fn file_path<S: AsRef<str>>(&self, filename: S) -> PathBuf {
        self.path.join(filename.as_ref())
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Stringer that renders bytes as lossy UTF-8, for readable assertions
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8KeyValueStringer;

impl KeyValueStringer for Utf8KeyValueStringer {
    fn key_to_string(&self, key: &[u8]) -> String {
        String::from_utf8_lossy(key).into_owned()
    }

    fn value_to_string(&self, value: &[u8]) -> String {
        String::from_utf8_lossy(value).into_owned()
    }
}

/// One element of a leaf page under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    /// Element flags
    pub flags: u32,
    /// Key bytes
    pub key: Vec<u8>,
    /// Value bytes
    pub value: Vec<u8>,
}

impl LeafEntry {
    /// Plain key/value pair
    pub fn value<K: AsRef<[u8]>, V: AsRef<[u8]>>(key: K, value: V) -> Self {
        Self {
            flags: 0,
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        }
    }

    /// Nested bucket rooted at page `root`
    pub fn bucket<K: AsRef<[u8]>>(key: K, root: PageId) -> Self {
        Self {
            flags: BUCKET_LEAF_FLAG,
            key: key.as_ref().to_vec(),
            value: encode_bucket_value(root),
        }
    }

    /// Nested bucket stored inline in the value
    pub fn inline_bucket<K: AsRef<[u8]>>(key: K, entries: &[LeafEntry]) -> Self {
        Self {
            flags: BUCKET_LEAF_FLAG,
            key: key.as_ref().to_vec(),
            value: encode_inline_bucket(entries),
        }
    }
}

fn pad_to_pages(mut buf: Vec<u8>, page_size: usize) -> Vec<u8> {
    let pages = buf.len().div_ceil(page_size).max(1);
    buf.resize(pages * page_size, 0);
    let overflow = u32::try_from(pages - 1).unwrap_or(u32::MAX);
    buf[12..16].copy_from_slice(&overflow.to_ne_bytes());
    buf
}

#[allow(clippy::cast_possible_truncation)]
fn layout_leaf(id: PageId, entries: &[LeafEntry]) -> Vec<u8> {
    let mut header = PageHeader::new(PageType::Leaf, id);
    header.count = entries.len() as u16;

    let elements_end = PAGE_HEADER_SIZE + entries.len() * LEAF_ELEMENT_SIZE;
    let mut buf = vec![0u8; elements_end];
    header.write_to(&mut buf);

    for (i, entry) in entries.iter().enumerate() {
        let offset = PAGE_HEADER_SIZE + i * LEAF_ELEMENT_SIZE;
        let elem = LeafElementHeader {
            flags: entry.flags,
            pos: (buf.len() - offset) as u32,
            ksize: entry.key.len() as u32,
            vsize: entry.value.len() as u32,
        };
        buf[offset..offset + LEAF_ELEMENT_SIZE].copy_from_slice(bytemuck::bytes_of(&elem));
        buf.extend_from_slice(&entry.key);
        buf.extend_from_slice(&entry.value);
    }
    buf
}

/// Encode a leaf page, growing it into overflow pages as needed
pub fn encode_leaf_page(id: PageId, page_size: usize, entries: &[LeafEntry]) -> Vec<u8> {
    pad_to_pages(layout_leaf(id, entries), page_size)
}

/// Encode a branch page from `(separator key, child)` pairs
#[allow(clippy::cast_possible_truncation)]
pub fn encode_branch_page<K: AsRef<[u8]>>(
    id: PageId,
    page_size: usize,
    elements: &[(K, PageId)],
) -> Vec<u8> {
    let mut header = PageHeader::new(PageType::Branch, id);
    header.count = elements.len() as u16;

    let elements_end = PAGE_HEADER_SIZE + elements.len() * BRANCH_ELEMENT_SIZE;
    let mut buf = vec![0u8; elements_end];
    header.write_to(&mut buf);

    for (i, (key, child)) in elements.iter().enumerate() {
        let key = key.as_ref();
        let offset = PAGE_HEADER_SIZE + i * BRANCH_ELEMENT_SIZE;
        let elem = BranchElementHeader {
            pos: (buf.len() - offset) as u32,
            ksize: key.len() as u32,
            pgid: *child,
        };
        buf[offset..offset + BRANCH_ELEMENT_SIZE].copy_from_slice(bytemuck::bytes_of(&elem));
        buf.extend_from_slice(key);
    }
    pad_to_pages(buf, page_size)
}

/// Encode a free-list page holding `ids`
#[allow(clippy::cast_possible_truncation)]
pub fn encode_freelist_page(id: PageId, page_size: usize, ids: &[PageId]) -> Vec<u8> {
    let mut header = PageHeader::new(PageType::Freelist, id);
    let mut buf = vec![0u8; PAGE_HEADER_SIZE];

    if ids.len() >= usize::from(FREELIST_COUNT_OVERFLOW) {
        header.count = FREELIST_COUNT_OVERFLOW;
        buf.extend_from_slice(&(ids.len() as u64).to_ne_bytes());
    } else {
        header.count = ids.len() as u16;
    }
    header.write_to(&mut buf);
    for id in ids {
        buf.extend_from_slice(&id.to_ne_bytes());
    }
    pad_to_pages(buf, page_size)
}

/// Encode a page with arbitrary flags and no elements
pub fn encode_raw_page(id: PageId, page_size: usize, flags: u16) -> Vec<u8> {
    let header = PageHeader {
        id,
        flags,
        count: 0,
        overflow: 0,
    };
    let mut buf = vec![0u8; page_size];
    header.write_to(&mut buf);
    buf
}

/// Encode a bucket value pointing at a root page
pub fn encode_bucket_value(root: PageId) -> Vec<u8> {
    bytemuck::bytes_of(&BucketHeader { root, sequence: 0 }).to_vec()
}

/// Encode an inline bucket value carrying its own leaf page
pub fn encode_inline_bucket(entries: &[LeafEntry]) -> Vec<u8> {
    let mut value = encode_bucket_value(0);
    value.extend_from_slice(&layout_leaf(0, entries));
    value
}

/// Builder for complete database images
///
/// Pages are placed at `id * page_size`. Both meta pages are written on
/// `build`, sealed with valid checksums.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    page_size: usize,
    pages: BTreeMap<PageId, Vec<u8>>,
    root: PageId,
    freelist: PageId,
    high_water: Option<PageId>,
    txids: (u64, u64),
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// Empty image: inline root bucket, no free list, default page size
    pub fn new() -> Self {
        Self::with_page_size(PAGE_SIZE)
    }

    /// Empty image with a specific page size
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            pages: BTreeMap::new(),
            root: 0,
            freelist: PGID_NO_FREELIST,
            high_water: None,
            txids: (0, 1),
        }
    }

    /// Page size of the image
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Place a leaf page
    pub fn leaf(&mut self, id: PageId, entries: &[LeafEntry]) -> &mut Self {
        let buf = encode_leaf_page(id, self.page_size, entries);
        self.pages.insert(id, buf);
        self
    }

    /// Place a branch page
    pub fn branch<K: AsRef<[u8]>>(&mut self, id: PageId, elements: &[(K, PageId)]) -> &mut Self {
        let buf = encode_branch_page(id, self.page_size, elements);
        self.pages.insert(id, buf);
        self
    }

    /// Place a free-list page and point the meta at it
    pub fn freelist(&mut self, id: PageId, ids: &[PageId]) -> &mut Self {
        let buf = encode_freelist_page(id, self.page_size, ids);
        self.pages.insert(id, buf);
        self.freelist = id;
        self
    }

    /// Place a page with arbitrary flags
    pub fn raw(&mut self, id: PageId, flags: u16) -> &mut Self {
        let buf = encode_raw_page(id, self.page_size, flags);
        self.pages.insert(id, buf);
        self
    }

    /// Force a placed page to span `overflow` additional pages
    ///
    /// # Panics
    ///
    /// Panics if no page was placed at `id`.
    pub fn set_overflow(&mut self, id: PageId, overflow: u32) -> &mut Self {
        let page_size = self.page_size;
        let buf = self.pages.get_mut(&id).expect("no page placed at id");
        buf.resize((overflow as usize + 1) * page_size, 0);
        buf[12..16].copy_from_slice(&overflow.to_ne_bytes());
        self
    }

    /// Overwrite the id recorded in a placed page's header
    ///
    /// # Panics
    ///
    /// Panics if no page was placed at `id`.
    pub fn set_header_id(&mut self, id: PageId, header_id: PageId) -> &mut Self {
        let buf = self.pages.get_mut(&id).expect("no page placed at id");
        buf[..8].copy_from_slice(&header_id.to_ne_bytes());
        self
    }

    /// Root page of the root bucket (0 for an inline root)
    pub fn set_root(&mut self, root: PageId) -> &mut Self {
        self.root = root;
        self
    }

    /// Meta free-list pointer, overriding any placed free-list page
    pub fn set_freelist(&mut self, freelist: PageId) -> &mut Self {
        self.freelist = freelist;
        self
    }

    /// High-water mark; defaults to one past the last placed page
    pub fn set_high_water(&mut self, pgid: PageId) -> &mut Self {
        self.high_water = Some(pgid);
        self
    }

    /// Transaction ids of meta pages 0 and 1
    pub fn set_txids(&mut self, meta0: u64, meta1: u64) -> &mut Self {
        self.txids = (meta0, meta1);
        self
    }

    /// Encode the image
    pub fn build(&self) -> Vec<u8> {
        let page_size = self.page_size;
        let span_end = self
            .pages
            .iter()
            .map(|(id, buf)| id + (buf.len() / page_size) as PageId)
            .max()
            .unwrap_or(2)
            .max(2);
        let high_water = self.high_water.unwrap_or(span_end);
        let image_pages = span_end.max(high_water);

        let mut image = vec![0u8; image_pages as usize * page_size];
        for (id, txid) in [(0, self.txids.0), (1, self.txids.1)] {
            let offset = id as usize * page_size;
            let page = &mut image[offset..offset + page_size];
            PageHeader::new(PageType::Meta, id).write_to(page);
            let mut meta = Meta::new(
                page_size,
                BucketHeader {
                    root: self.root,
                    sequence: 0,
                },
                self.freelist,
                high_water,
                txid,
            );
            meta.seal();
            meta.write_to(page);
        }
        for (id, buf) in &self.pages {
            let offset = *id as usize * page_size;
            image[offset..offset + buf.len()].copy_from_slice(buf);
        }
        image
    }
}

/// Assert that two byte slices are equal with better error messages
///
/// # Panics
///
/// Panics if the byte slices differ in length or content.
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: Length mismatch - actual: {}, expected: {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            a == e,
            "{context}: Byte mismatch at index {i}: actual 0x{a:02x}, expected 0x{e:02x}"
        );
    }
}
