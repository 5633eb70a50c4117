//! Bucket values: a bucket header optionally followed by an inline leaf page

use crate::common::error::{Error, Result};
use crate::storage::page::Page;
use crate::storage::page_constants::{PageId, BUCKET_HEADER_SIZE};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// On-disk bucket header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct BucketHeader {
    /// Root page of the bucket tree, 0 for an inline bucket
    pub root: u64,
    /// Monotonic sequence owned by the bucket
    pub sequence: u64,
}

/// A named subtree: either rooted at a page or stored inline in its parent's value
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'a> {
    header: BucketHeader,
    inline: Option<Page<'a>>,
}

impl<'a> Bucket<'a> {
    /// Bucket from a bare header with no inline page (the root bucket)
    pub fn from_header(header: BucketHeader) -> Self {
        Self {
            header,
            inline: None,
        }
    }

    /// Decode a nested bucket stored as a leaf value
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the value is shorter than a bucket
    /// header, or if an inline bucket's page header is truncated.
    pub fn from_value(value: &'a [u8]) -> Result<Self> {
        let header_bytes = value.get(..BUCKET_HEADER_SIZE).ok_or_else(|| {
            Error::corruption(format!(
                "bucket value needs {BUCKET_HEADER_SIZE} bytes, got {}",
                value.len()
            ))
        })?;
        let header: BucketHeader = bytemuck::pod_read_unaligned(header_bytes);

        let inline = if header.root == 0 && value.len() > BUCKET_HEADER_SIZE {
            Some(Page::new(&value[BUCKET_HEADER_SIZE..])?)
        } else {
            None
        };

        Ok(Self { header, inline })
    }

    /// Bucket header
    pub fn header(&self) -> &BucketHeader {
        &self.header
    }

    /// Root page id (0 for inline buckets)
    pub fn root(&self) -> PageId {
        self.header.root
    }

    /// Check if this bucket owns no pages of its own
    pub fn is_inline(&self) -> bool {
        self.header.root == 0
    }

    /// The inline leaf page, if this bucket carries one
    pub fn inline_page(&self) -> Option<&Page<'a>> {
        self.inline.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::{encode_bucket_value, encode_inline_bucket, LeafEntry};

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<BucketHeader>(), BUCKET_HEADER_SIZE);
    }

    #[test]
    fn test_page_bucket() {
        let value = encode_bucket_value(12);
        let bucket = Bucket::from_value(&value).unwrap();
        assert_eq!(bucket.root(), 12);
        assert!(!bucket.is_inline());
        assert!(bucket.inline_page().is_none());
    }

    #[test]
    fn test_inline_bucket() {
        let value = encode_inline_bucket(&[LeafEntry::value(b"k", b"v")]);
        let bucket = Bucket::from_value(&value).unwrap();
        assert!(bucket.is_inline());
        let page = bucket.inline_page().unwrap();
        assert_eq!(page.leaf_elements().unwrap()[0].key, b"k");
    }

    #[test]
    fn test_short_value() {
        assert!(Bucket::from_value(b"short").unwrap_err().is_corruption());
    }
}
