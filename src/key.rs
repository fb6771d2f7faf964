// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::hash::{fold32, fold64};

/// A map key.
///
/// Keys are primitive values up to 64 bits wide that know how to place
/// themselves into a bucket table. Chains are kept sorted by the key's
/// `PartialOrd`, so lookups can stop as soon as they scan past the target.
///
/// Floating point keys compare by their native ordering, like any other
/// number. A `NaN` key is never equal to anything, including itself, so it
/// can be inserted but never found again - don't use `NaN` keys.
pub trait Key: Copy + PartialOrd {
    /// Returns the bucket index for this key in a table of the given capacity.
    fn bucket_index(self, capacity: usize) -> usize;
}

impl Key for i32 {
    fn bucket_index(self, capacity: usize) -> usize {
        #[allow(clippy::cast_sign_loss)]
        fold32(self as u32, capacity)
    }
}

impl Key for u32 {
    fn bucket_index(self, capacity: usize) -> usize {
        fold32(self, capacity)
    }
}

impl Key for i64 {
    fn bucket_index(self, capacity: usize) -> usize {
        #[allow(clippy::cast_sign_loss)]
        fold64(self as u64, capacity)
    }
}

impl Key for u64 {
    fn bucket_index(self, capacity: usize) -> usize {
        fold64(self, capacity)
    }
}

impl Key for f32 {
    fn bucket_index(self, capacity: usize) -> usize {
        fold32(self.to_bits(), capacity)
    }
}

impl Key for f64 {
    fn bucket_index(self, capacity: usize) -> usize {
        fold64(self.to_bits(), capacity)
    }
}
