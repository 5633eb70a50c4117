//! Tests for loading images from disk

use kvcheck::common::test_utils::{ImageBuilder, LeafEntry};
use kvcheck::storage::page_constants::PAGE_SIZE;
use kvcheck::storage::page_io::*;
use kvcheck::storage::tx::{OpenOptions, Tx};
use std::io::Write as IoWrite;
use tempfile::NamedTempFile;

fn sample_image() -> Vec<u8> {
    let mut builder = ImageBuilder::new();
    builder.freelist(2, &[]);
    builder.leaf(3, &[LeafEntry::value("k", "v")]).set_root(3);
    builder.build()
}

#[test]
fn test_mapped_and_owned_images_agree() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    let bytes = sample_image();
    temp_file.write_all(&bytes)?;
    temp_file.flush()?;

    let mapped = Image::open(temp_file.path())?;
    let owned = Image::read(temp_file.path())?;
    assert!(matches!(mapped, Image::Mapped(_)));
    assert_eq!(mapped.as_bytes(), bytes.as_slice());
    assert_eq!(owned.as_bytes(), bytes.as_slice());
    assert_eq!(mapped.len(), 4 * PAGE_SIZE);
    Ok(())
}

#[test]
fn test_empty_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp_file = NamedTempFile::new()?;
    let err = Image::open(temp_file.path()).unwrap_err();
    assert!(err.is_corruption());
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Image::open("/nonexistent/kvcheck/data.db").unwrap_err();
    assert!(err.is_io());
}

#[test]
fn test_write_image_sync_then_open_tx() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.db");
    write_image_sync(&path, &sample_image())?;

    let tx = Tx::open_file(&path, &OpenOptions::new())?;
    assert_eq!(tx.page_count(), 4);
    assert_eq!(tx.page(3)?.id(), 3);
    Ok(())
}

#[test]
fn test_page_offsets() {
    assert_eq!(calculate_page_offset(0, PAGE_SIZE), Some(0));
    assert_eq!(calculate_page_offset(3, PAGE_SIZE), Some(3 * PAGE_SIZE));
    assert_eq!(calculate_page_offset(u64::MAX, PAGE_SIZE), None);
}

#[test]
fn test_explicit_page_size() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = ImageBuilder::with_page_size(2048);
    builder.leaf(2, &[]).set_root(2);
    let tx = Tx::open(Image::from_bytes(builder.build()), &OpenOptions::new().page_size(2048))?;
    assert_eq!(tx.page_size(), 2048);
    assert_eq!(tx.meta().pgid, 3);
    Ok(())
}
