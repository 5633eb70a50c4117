//! Page constants and fundamental types for the storage layer

/// Default page size in bytes - must be power of 2 and >= 4KB
pub const PAGE_SIZE: usize = 4096;

/// Smallest page size an image may declare
pub const MIN_PAGE_SIZE: usize = 1024;

/// Page header size in bytes
pub const PAGE_HEADER_SIZE: usize = 16;

/// Size of one branch page element `{pos, ksize, pgid}`
pub const BRANCH_ELEMENT_SIZE: usize = 16;

/// Size of one leaf page element `{flags, pos, ksize, vsize}`
pub const LEAF_ELEMENT_SIZE: usize = 16;

/// Size of the meta body that follows the page header on pages 0 and 1
pub const META_SIZE: usize = 64;

/// Size of the bucket header stored at the front of a bucket value
pub const BUCKET_HEADER_SIZE: usize = 16;

/// Page ID type
pub type PageId = u64;

/// The two meta pages
pub const META_PAGE_IDS: [PageId; 2] = [0, 1];

/// `meta.freelist` value meaning the free list is not persisted as pages
pub const PGID_NO_FREELIST: PageId = PageId::MAX;

/// Freelist `count` value meaning the real count is stored in the first element
pub const FREELIST_COUNT_OVERFLOW: u16 = 0xFFFF;

/// Leaf element flag marking the value as a nested bucket
pub const BUCKET_LEAF_FLAG: u32 = 0x01;

/// Stamp identifying a kvcheck-format image
pub const MAGIC: u32 = 0xED0C_DAED;

/// Image format version
pub const VERSION: u32 = 2;
