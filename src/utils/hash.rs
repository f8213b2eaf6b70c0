use crc32fast::Hasher;

use crate::types::PageId;

pub fn calculate_page_checksum(page_id: PageId, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_id.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_page_checksum(page_id: PageId, data: &[u8], expected_checksum: u32) -> bool {
    calculate_page_checksum(page_id, data) == expected_checksum
}

/// Folds per-page checksums in ring order into one value.
pub fn calculate_ring_checksum<I>(page_checksums: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    let mut hasher = Hasher::new();
    for checksum in page_checksums {
        hasher.update(&checksum.to_le_bytes());
    }
    hasher.finalize()
}
