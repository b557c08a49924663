//! Hashing utilities for minits
//!
//! - BLAKE3 for stable, platform-independent key hashing
//! - HRW (Highest Random Weight) to map a partition key onto a data group

/// Stable 64-bit hash of a key.
pub fn hash64(key: &str) -> u64 {
    let hash = blake3::hash(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(prefix)
}

/// Key identifying one (storage group, time partition) slot.
pub fn partition_key(storage_group: &str, time_partition: i64) -> String {
    format!("{}#{}", storage_group, time_partition)
}

/// HRW (Highest Random Weight) hashing
///
/// Returns the indices of `candidates` sorted by their weight for `key`,
/// heaviest first. Placement only moves for keys whose winner leaves.
pub fn hrw_order<T: std::fmt::Display>(key: &str, candidates: &[T]) -> Vec<usize> {
    let mut weights: Vec<(usize, u64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| (i, hash64(&format!("{}{}", key, candidate))))
        .collect();

    // Sort by weight (descending), index breaks ties
    weights.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    weights.into_iter().map(|(i, _)| i).collect()
}

/// Index of the winning candidate for `key`, if any.
pub fn hrw_select<T: std::fmt::Display>(key: &str, candidates: &[T]) -> Option<usize> {
    hrw_order(key, candidates).into_iter().next()
}
