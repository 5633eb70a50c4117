//! Page header structure - exactly 16 bytes at the beginning of each page

use crate::common::error::{Error, Result};
use crate::storage::page_constants::{PageId, PAGE_HEADER_SIZE};
use crate::storage::page_type::PageType;
use bytemuck::{Pod, Zeroable};

/// Page header - 16 bytes in native byte order, no padding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PageHeader {
    /// Page number (8 bytes)
    pub id: u64,
    /// Page type flag bits (2 bytes)
    pub flags: u16,
    /// Element count (2 bytes)
    pub count: u16,
    /// Additional contiguous pages this logical page spans (4 bytes)
    pub overflow: u32,
}

impl PageHeader {
    /// Create a new page header with the given type and ID
    pub fn new(page_type: PageType, id: PageId) -> Self {
        Self {
            id,
            flags: page_type as u16,
            count: 0,
            overflow: 0,
        }
    }

    /// Decode a header from the front of `buf`
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if `buf` is shorter than a header.
    pub fn read_from(buf: &[u8]) -> Result<Self> {
        let bytes = buf.get(..PAGE_HEADER_SIZE).ok_or_else(|| {
            Error::corruption(format!(
                "page header needs {PAGE_HEADER_SIZE} bytes, got {}",
                buf.len()
            ))
        })?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Encode this header into the front of `buf`
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[..PAGE_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(self));
    }

    /// Classified page type, if any known flag bit is set
    pub fn page_type(&self) -> Option<PageType> {
        PageType::from_flags(self.flags)
    }

    /// Check if the branch bit is set
    pub fn is_branch(&self) -> bool {
        self.flags & PageType::Branch as u16 != 0
    }

    /// Check if the leaf bit is set
    pub fn is_leaf(&self) -> bool {
        self.flags & PageType::Leaf as u16 != 0
    }

    /// Physical page ids covered by this logical page: `[id, id + overflow]`
    pub fn span(&self) -> std::ops::RangeInclusive<PageId> {
        self.id..=self.id.saturating_add(PageId::from(self.overflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets() {
        use std::mem::offset_of;

        assert_eq!(offset_of!(PageHeader, id), 0);
        assert_eq!(offset_of!(PageHeader, flags), 8);
        assert_eq!(offset_of!(PageHeader, count), 10);
        assert_eq!(offset_of!(PageHeader, overflow), 12);
        assert_eq!(std::mem::size_of::<PageHeader>(), PAGE_HEADER_SIZE);
    }

    #[test]
    fn test_read_write_unaligned() {
        let mut header = PageHeader::new(PageType::Leaf, 42);
        header.count = 7;
        header.overflow = 2;

        let mut buf = vec![0u8; PAGE_HEADER_SIZE + 1];
        header.write_to(&mut buf[1..]);
        let read = PageHeader::read_from(&buf[1..]).unwrap();
        assert_eq!(read, header);
        assert!(read.is_leaf());
        assert!(!read.is_branch());
    }

    #[test]
    fn test_read_short_buffer() {
        let err = PageHeader::read_from(&[0u8; 8]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_span() {
        let mut header = PageHeader::new(PageType::Branch, 10);
        assert_eq!(header.span().collect::<Vec<_>>(), vec![10]);
        header.overflow = 2;
        assert_eq!(header.span().collect::<Vec<_>>(), vec![10, 11, 12]);
    }
}
