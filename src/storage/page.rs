//! Page view - typed, read-only access to the bytes of one logical page

use crate::common::error::{Error, Result};
use crate::storage::page_constants::{
    PageId, BRANCH_ELEMENT_SIZE, BUCKET_LEAF_FLAG, LEAF_ELEMENT_SIZE, PAGE_HEADER_SIZE,
};
use crate::storage::page_header::PageHeader;
use crate::storage::page_type::PageType;
use bytemuck::{Pod, Zeroable};

/// On-disk branch element: key location and child page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BranchElementHeader {
    /// Key offset, relative to this element
    pub pos: u32,
    /// Key length
    pub ksize: u32,
    /// Child page id
    pub pgid: u64,
}

/// On-disk leaf element: flags plus key and value location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct LeafElementHeader {
    /// Element flags (`BUCKET_LEAF_FLAG`)
    pub flags: u32,
    /// Key offset, relative to this element
    pub pos: u32,
    /// Key length
    pub ksize: u32,
    /// Value length, stored right after the key
    pub vsize: u32,
}

/// Decoded branch element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchElement<'a> {
    /// Separator key
    pub key: &'a [u8],
    /// Child page id
    pub pgid: PageId,
}

/// Decoded leaf element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafElement<'a> {
    /// Element flags
    pub flags: u32,
    /// Key
    pub key: &'a [u8],
    /// Value
    pub value: &'a [u8],
}

impl LeafElement<'_> {
    /// Check if the value holds a nested bucket
    pub fn is_bucket(&self) -> bool {
        self.flags & BUCKET_LEAF_FLAG != 0
    }
}

/// A B+tree page as a closed variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageNode<'a> {
    /// Internal node
    Branch(Vec<BranchElement<'a>>),
    /// Terminal node
    Leaf(Vec<LeafElement<'a>>),
    /// Anything else; carries the raw flags
    Other(u16),
}

/// Read-only view over the bytes of one logical page (header plus overflow)
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    header: PageHeader,
    buf: &'a [u8],
}

impl<'a> Page<'a> {
    /// Wrap page bytes; `buf` must start with a page header
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if `buf` cannot hold a header.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let header = PageHeader::read_from(buf)?;
        Ok(Self { header, buf })
    }

    /// Page header
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// Page id recorded in the header
    pub fn id(&self) -> PageId {
        self.header.id
    }

    /// Raw flag bits
    pub fn flags(&self) -> u16 {
        self.header.flags
    }

    /// Element count
    pub fn count(&self) -> usize {
        usize::from(self.header.count)
    }

    /// Number of additional physical pages
    pub fn overflow(&self) -> u32 {
        self.header.overflow
    }

    /// Classified page type
    pub fn page_type(&self) -> Option<PageType> {
        self.header.page_type()
    }

    /// Check if this is a branch page
    pub fn is_branch(&self) -> bool {
        self.header.is_branch()
    }

    /// Check if this is a leaf page
    pub fn is_leaf(&self) -> bool {
        self.header.is_leaf()
    }

    /// All bytes of the page, header included
    pub fn raw(&self) -> &'a [u8] {
        self.buf
    }

    /// Bytes following the header
    pub fn data(&self) -> &'a [u8] {
        &self.buf[PAGE_HEADER_SIZE..]
    }

    /// Decode branch element `index`
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the element or its key lies outside the page.
    pub fn branch_element(&self, index: usize) -> Result<BranchElement<'a>> {
        let offset = self.element_offset(index, BRANCH_ELEMENT_SIZE)?;
        let elem: BranchElementHeader =
            bytemuck::pod_read_unaligned(&self.buf[offset..offset + BRANCH_ELEMENT_SIZE]);
        let key = self.slice(offset, elem.pos, elem.ksize, index)?;
        Ok(BranchElement {
            key,
            pgid: elem.pgid,
        })
    }

    /// Decode leaf element `index`
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the element, key or value lies outside the page.
    pub fn leaf_element(&self, index: usize) -> Result<LeafElement<'a>> {
        let offset = self.element_offset(index, LEAF_ELEMENT_SIZE)?;
        let elem: LeafElementHeader =
            bytemuck::pod_read_unaligned(&self.buf[offset..offset + LEAF_ELEMENT_SIZE]);
        let key = self.slice(offset, elem.pos, elem.ksize, index)?;
        let value = self.slice(offset, elem.pos.saturating_add(elem.ksize), elem.vsize, index)?;
        Ok(LeafElement {
            flags: elem.flags,
            key,
            value,
        })
    }

    /// Decode every branch element
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if any element is malformed.
    pub fn branch_elements(&self) -> Result<Vec<BranchElement<'a>>> {
        (0..self.count()).map(|i| self.branch_element(i)).collect()
    }

    /// Decode every leaf element
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if any element is malformed.
    pub fn leaf_elements(&self) -> Result<Vec<LeafElement<'a>>> {
        (0..self.count()).map(|i| self.leaf_element(i)).collect()
    }

    /// Decode the page as a B+tree node
    ///
    /// The branch bit wins when both branch and leaf bits are set.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if an element is malformed.
    pub fn node(&self) -> Result<PageNode<'a>> {
        if self.is_branch() {
            Ok(PageNode::Branch(self.branch_elements()?))
        } else if self.is_leaf() {
            Ok(PageNode::Leaf(self.leaf_elements()?))
        } else {
            Ok(PageNode::Other(self.flags()))
        }
    }

    fn element_offset(&self, index: usize, element_size: usize) -> Result<usize> {
        let offset = PAGE_HEADER_SIZE + index * element_size;
        if offset + element_size > self.buf.len() {
            return Err(Error::corruption(format!(
                "page {}: element {index} at offset {offset} exceeds page length {}",
                self.id(),
                self.buf.len()
            )));
        }
        Ok(offset)
    }

    fn slice(&self, base: usize, pos: u32, len: u32, index: usize) -> Result<&'a [u8]> {
        let start = base + pos as usize;
        let end = start + len as usize;
        self.buf.get(start..end).ok_or_else(|| {
            Error::corruption(format!(
                "page {}: element {index} bytes [{start}, {end}) exceed page length {}",
                self.id(),
                self.buf.len()
            ))
        })
    }
}
