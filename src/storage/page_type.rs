//! Page type flags and their classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page type enumeration - one flag bit per kind, as stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PageType {
    /// B+Tree internal page - separator keys and child page references
    Branch = 0x01,
    /// B+Tree leaf page - keys and values
    Leaf = 0x02,
    /// Meta page - pages 0 and 1
    Meta = 0x04,
    /// Free list page - ids of reusable pages
    Freelist = 0x10,
}

impl PageType {
    /// Classify raw header flags
    ///
    /// Bits are tested in branch, leaf, meta, freelist order so a page with
    /// several bits set is classified by the first match. Returns `None`
    /// when no known bit is set.
    pub fn from_flags(flags: u16) -> Option<Self> {
        [Self::Branch, Self::Leaf, Self::Meta, Self::Freelist]
            .into_iter()
            .find(|kind| flags & (*kind as u16) != 0)
    }

    /// Check if this is a B+Tree page (leaf or branch)
    pub fn is_btree_page(&self) -> bool {
        matches!(self, PageType::Branch | PageType::Leaf)
    }

    /// Lowercase name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            PageType::Branch => "branch",
            PageType::Leaf => "leaf",
            PageType::Meta => "meta",
            PageType::Freelist => "freelist",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Printable type of raw flags: the kind name, or `unknown<XX>`
pub fn describe_flags(flags: u16) -> String {
    match PageType::from_flags(flags) {
        Some(kind) => kind.name().to_string(),
        None => format!("unknown<{flags:02x}>"),
    }
}
