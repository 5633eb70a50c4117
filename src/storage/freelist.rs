//! Free-list page decoding

use crate::common::error::{Error, Result};
use crate::storage::page::Page;
use crate::storage::page_constants::{PageId, FREELIST_COUNT_OVERFLOW};
use crate::storage::page_type::{describe_flags, PageType};

const ID_SIZE: usize = std::mem::size_of::<PageId>();

/// Read the free page ids stored on a free-list page
///
/// A header count of `0xFFFF` means the real count did not fit and is
/// stored in the first id slot instead.
///
/// # Errors
///
/// Returns `Error::Corruption` if the page is not a free-list page or the
/// ids run past the end of the page span.
pub fn read_free_ids(page: &Page<'_>) -> Result<Vec<PageId>> {
    if page.page_type() != Some(PageType::Freelist) {
        return Err(Error::corruption(format!(
            "page {}: expected freelist page, found {}",
            page.id(),
            describe_flags(page.flags())
        )));
    }

    let data = page.data();
    let (count, skip) = if page.header().count == FREELIST_COUNT_OVERFLOW {
        let first = data
            .get(..ID_SIZE)
            .ok_or_else(|| Error::corruption(format!("page {}: truncated freelist", page.id())))?;
        let count: u64 = bytemuck::pod_read_unaligned(first);
        let count = usize::try_from(count)
            .map_err(|_| Error::corruption(format!("page {}: freelist count overflow", page.id())))?;
        (count, 1)
    } else {
        (page.count(), 0)
    };

    let ids = data
        .get(skip * ID_SIZE..)
        .and_then(|rest| rest.get(..count.checked_mul(ID_SIZE)?))
        .ok_or_else(|| {
            Error::corruption(format!(
                "page {}: {count} free ids exceed the page span",
                page.id()
            ))
        })?;

    Ok(ids
        .chunks_exact(ID_SIZE)
        .map(bytemuck::pod_read_unaligned::<PageId>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::encode_freelist_page;
    use crate::storage::page_constants::PAGE_SIZE;
    use crate::storage::page_header::PageHeader;

    #[test]
    fn test_read_small_freelist() {
        let buf = encode_freelist_page(2, PAGE_SIZE, &[5, 5, 7]);
        let page = Page::new(&buf).unwrap();
        assert_eq!(read_free_ids(&page).unwrap(), vec![5, 5, 7]);
    }

    #[test]
    fn test_read_overflowing_count() {
        let ids: Vec<PageId> = (10..10 + 70_000).collect();
        let buf = encode_freelist_page(2, PAGE_SIZE, &ids);
        let page = Page::new(&buf).unwrap();
        assert_eq!(page.header().count, FREELIST_COUNT_OVERFLOW);
        assert!(page.overflow() > 0);
        assert_eq!(read_free_ids(&page).unwrap(), ids);
    }

    #[test]
    fn test_rejects_non_freelist_page() {
        let mut buf = vec![0u8; PAGE_SIZE];
        PageHeader::new(PageType::Leaf, 2).write_to(&mut buf);
        let page = Page::new(&buf).unwrap();
        assert!(read_free_ids(&page).unwrap_err().is_corruption());
    }

    #[test]
    fn test_rejects_truncated_ids() {
        let mut buf = vec![0u8; 64];
        let mut header = PageHeader::new(PageType::Freelist, 2);
        header.count = 100;
        header.write_to(&mut buf);
        let page = Page::new(&buf).unwrap();
        assert!(read_free_ids(&page).is_err());
    }
}
