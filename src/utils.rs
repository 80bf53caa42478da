// src/utils.rs
// Utility functions for the Pair Topology SDK

use std::ops::Range;

/// Splits `0..len` into at most `workers` disjoint, contiguous shards.
///
/// Shard `i` covers `i*len/workers .. (i+1)*len/workers`, so sizes differ by at most one
/// and their concatenation is exactly `0..len`. Empty shards are not emitted.
pub fn shard_ranges(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, len);
    (0..workers)
        .map(|i| (i * len / workers)..((i + 1) * len / workers))
        .filter(|r| !r.is_empty())
        .collect()
}
