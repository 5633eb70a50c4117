//! Image I/O: loading a database file for read-only inspection

use crate::common::error::Error;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Bytes of a database image, either memory-mapped or owned
pub enum Image {
    /// Read-only mapping of a file
    Mapped(Mmap),
    /// In-memory buffer
    Owned(Vec<u8>),
}

impl Image {
    /// Memory-map a database file read-only
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or is empty
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Err(Error::corruption(format!(
                "{}: empty database file",
                path.as_ref().display()
            )));
        }

        // SAFETY: the mapping is read-only; callers must not truncate the
        // file while a snapshot over it is alive.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Image::Mapped(mmap))
    }

    /// Load a database file fully into memory
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Image::Owned(std::fs::read(path)?))
    }

    /// Wrap an in-memory image
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Image::Owned(bytes)
    }

    /// Raw image bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Image::Mapped(mmap) => &mmap[..],
            Image::Owned(bytes) => bytes.as_slice(),
        }
    }

    /// Image length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the image holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Image::Mapped(_) => "Mapped",
            Image::Owned(_) => "Owned",
        };
        f.debug_struct("Image")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Calculate the byte offset for a given page ID, if it fits in `usize`
pub fn calculate_page_offset(page_id: u64, page_size: usize) -> Option<usize> {
    usize::try_from(page_id).ok()?.checked_mul(page_size)
}

/// Write an image to a file with explicit sync
///
/// # Errors
///
/// Returns an error if the write or sync operation fails
pub fn write_image_sync<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
