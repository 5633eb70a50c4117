//! CRC32 checksums for meta page integrity

use crate::common::error::Error;
use crate::storage::page_constants::META_SIZE;
use crc32fast::Hasher;

/// Bytes of the meta body covered by its checksum (everything before it)
pub const META_CHECKSUM_OFFSET: usize = 56;

/// Calculate CRC32 checksum for data
pub fn calculate_crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Calculate the checksum of an encoded meta body
///
/// The checksum field and the reserved word after it are excluded.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if `meta_bytes` is not exactly `META_SIZE` bytes
pub fn calculate_meta_checksum(meta_bytes: &[u8]) -> Result<u32, Error> {
    if meta_bytes.len() != META_SIZE {
        return Err(Error::InvalidInput(format!(
            "Invalid meta size: expected {}, got {}",
            META_SIZE,
            meta_bytes.len()
        )));
    }

    Ok(calculate_crc32(&meta_bytes[..META_CHECKSUM_OFFSET]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty_data() {
        assert_eq!(calculate_crc32(&[]), 0);
    }

    #[test]
    fn test_crc32_known_value() {
        let data = b"The quick brown fox jumps over the lazy dog";
        assert_eq!(calculate_crc32(data), 0x414F_A339);
    }

    #[test]
    fn test_meta_checksum_wrong_size() {
        let result = calculate_meta_checksum(&[0u8; 16]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_checksum_field_excluded() {
        let mut meta1 = vec![0u8; META_SIZE];
        let mut meta2 = vec![0u8; META_SIZE];
        for i in 0..META_CHECKSUM_OFFSET {
            #[allow(clippy::cast_possible_truncation)]
            let val = (i % 256) as u8;
            meta1[i] = val;
            meta2[i] = val;
        }
        meta1[META_CHECKSUM_OFFSET..].fill(0xFF);

        assert_eq!(
            calculate_meta_checksum(&meta1).unwrap(),
            calculate_meta_checksum(&meta2).unwrap()
        );

        meta2[0] ^= 1;
        assert_ne!(
            calculate_meta_checksum(&meta1).unwrap(),
            calculate_meta_checksum(&meta2).unwrap()
        );
    }
}
