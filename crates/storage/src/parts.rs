//! Multipart part planning.
//!
//! This module contains pure logic for copy-strategy decisions and part
//! layout. No I/O operations - just decision making.

use crate::error::StorageError;

/// Information about a single part of a multipart copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// 1-based part number.
    pub part_number: i32,
    /// Byte offset within the source object.
    pub offset: u64,
    /// Length of this part in bytes.
    pub length: u64,
}

impl PartInfo {
    /// Inclusive byte range header for this part.
    ///
    /// Returns: "bytes={first}-{last}"
    pub fn range_header(&self) -> String {
        let last: u64 = (self.offset + self.length).saturating_sub(1);
        format!("bytes={}-{}", self.offset, last)
    }
}

/// Generate the part layout for a multipart copy.
///
/// Splits an object of `size` bytes into parts of `part_size` bytes.
/// The last part may be smaller than `part_size`.
///
/// # Arguments
/// * `size` - Total object size in bytes
/// * `part_size` - Size of each part
/// * `max_parts` - Upper bound on the number of parts
///
/// # Returns
/// Vector of PartInfo describing each part's offset and length.
///
/// # Errors
/// Returns `TooLarge` if the object needs more than `max_parts` parts, and
/// `InvalidConfig` for a zero part size.
pub fn generate_parts(
    size: u64,
    part_size: u64,
    max_parts: usize,
) -> Result<Vec<PartInfo>, StorageError> {
    if part_size == 0 {
        return Err(StorageError::InvalidConfig {
            message: "part size must be positive".to_string(),
        });
    }

    let count: usize = expected_part_count(size, part_size);
    if count > max_parts {
        return Err(StorageError::TooLarge {
            size,
            parts: count,
            max_parts,
        });
    }

    let mut parts: Vec<PartInfo> = Vec::with_capacity(count);
    let mut offset: u64 = 0;
    let mut part_number: i32 = 1;

    while offset < size {
        let length: u64 = std::cmp::min(part_size, size - offset);
        parts.push(PartInfo {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }

    Ok(parts)
}

/// Calculate the number of parts needed for an object.
pub fn expected_part_count(size: u64, part_size: u64) -> usize {
    if part_size == 0 || size == 0 {
        return 0;
    }
    size.div_ceil(part_size) as usize
}

/// Copy strategy based on object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    /// Single CopyObject request.
    Simple,
    /// Ranged part copies within a multipart upload.
    Multipart,
}

/// Determine copy strategy based on object size.
///
/// Objects strictly below `threshold` use a simple copy.
pub fn copy_strategy(size: u64, threshold: u64) -> CopyStrategy {
    if size < threshold {
        CopyStrategy::Simple
    } else {
        CopyStrategy::Multipart
    }
}
