//! Meta page body: the per-transaction snapshot bounds

use crate::common::error::{Error, Result};
use crate::storage::bucket::BucketHeader;
use crate::storage::checksum::calculate_meta_checksum;
use crate::storage::page_constants::{
    PageId, MAGIC, META_SIZE, MIN_PAGE_SIZE, PAGE_HEADER_SIZE, PGID_NO_FREELIST, VERSION,
};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Meta body stored after the page header of pages 0 and 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Meta {
    /// Format stamp
    pub magic: u32,
    /// Format version
    pub version: u32,
    /// Page size of the image
    pub page_size: u32,
    /// Reserved flags
    pub flags: u32,
    /// Root bucket header
    pub root: BucketHeader,
    /// First free-list page, or `PGID_NO_FREELIST`
    pub freelist: u64,
    /// High-water mark: all valid page ids lie in `[0, pgid)`
    pub pgid: u64,
    /// Transaction id that wrote this meta
    pub txid: u64,
    /// CRC32 of the preceding fields
    pub checksum: u32,
    /// Reserved, zero
    pub reserved: u32,
}

impl Meta {
    /// New meta with the current magic and version and no checksum set
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(page_size: usize, root: BucketHeader, freelist: PageId, pgid: PageId, txid: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size as u32,
            flags: 0,
            root,
            freelist,
            pgid,
            txid,
            checksum: 0,
            reserved: 0,
        }
    }

    /// Decode the meta body of a page buffer (header included)
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the buffer is too short.
    pub fn read_from(page_buf: &[u8]) -> Result<Self> {
        let bytes = page_buf
            .get(PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + META_SIZE)
            .ok_or_else(|| Error::corruption("meta page truncated"))?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Encode into a page buffer after its header
    pub fn write_to(&self, page_buf: &mut [u8]) {
        page_buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + META_SIZE]
            .copy_from_slice(bytemuck::bytes_of(self));
    }

    /// Checksum over the encoded fields
    pub fn sum(&self) -> u32 {
        // The encoding is exactly META_SIZE bytes, so this cannot fail.
        calculate_meta_checksum(bytemuck::bytes_of(self)).unwrap_or_default()
    }

    /// Store the checksum of the current field values
    pub fn seal(&mut self) {
        self.checksum = self.sum();
    }

    /// Verify magic, version, checksum and page size
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` naming the first failed check.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::corruption(format!("invalid magic {:#010x}", self.magic)));
        }
        if self.version != VERSION {
            return Err(Error::corruption(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.checksum != self.sum() {
            return Err(Error::corruption("meta checksum mismatch"));
        }
        let page_size = self.page_size as usize;
        if page_size < MIN_PAGE_SIZE || !page_size.is_power_of_two() {
            return Err(Error::corruption(format!("invalid page size {page_size}")));
        }
        Ok(())
    }

    /// High-water mark (exclusive)
    pub fn high_water_mark(&self) -> PageId {
        self.pgid
    }

    /// First free-list page, if the free list is persisted as pages
    pub fn freelist_page(&self) -> Option<PageId> {
        (self.freelist != PGID_NO_FREELIST).then_some(self.freelist)
    }
}
