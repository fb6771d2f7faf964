/// Folds a 32-bit key image onto a bucket index.
///
/// Capacities come from the curated prime table, so a cheap xor-fold spreads
/// well enough; a full avalanche mixer is not worth the cycles here.
pub fn fold32(h: u32, capacity: usize) -> usize {
    let i = h ^ (h >> 16);
    (i & 0x7fff_ffff) as usize % capacity
}

/// Folds a 64-bit key image onto a bucket index.
pub fn fold64(h: u64, capacity: usize) -> usize {
    #[allow(clippy::cast_possible_truncation)]
    let i = (h ^ (h >> 32)) as u32;
    (i & 0x7fff_ffff) as usize % capacity
}
