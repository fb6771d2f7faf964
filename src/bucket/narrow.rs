// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! 32-bit packed bucket codes.
//!
//! A code contains:
//!
//! - bits 0..12: chain offset inside its block (all blocks are 4 KiB in this
//!   encoding)
//! - bits 12..15: chain length; never zero, 7 means the element count is
//!   stored as a varint at the start of the chain
//! - bits 15..32: block id (up to 128 Ki blocks)
//!
//! `0` is a forbidden encoding because the length field cannot be zero, which
//! leaves it free to mean "empty bucket" in zero-initialized tables.

const OFFSET_BITS: u32 = 12;
const LENGTH_BITS: u32 = 3;
const ID_SHIFT: u32 = OFFSET_BITS + LENGTH_BITS;

/// Empty bucket. Tables are allocated zeroed, so empty slots need no setup.
pub const EMPTY: u32 = 0;

/// Block size in this encoding; offsets are 12 bits, so blocks are fixed.
pub const BLOCK_SIZE: usize = 1 << OFFSET_BITS;

/// Largest value of the length field, used as the "count is stored in the
/// chain" sentinel.
pub const MAX_ENCODED_LEN: usize = (1 << LENGTH_BITS) - 1;

/// Largest block id this encoding can address.
pub const MAX_BLOCK_ID: u32 = (1 << (32 - ID_SHIFT)) - 1;

/// Packs a bucket code. The caller must have range-checked every field;
/// out-of-range values wrap silently (migrate to the wide encoding instead).
pub fn pack(block_id: u32, offset: usize, len: usize) -> u32 {
    debug_assert!(len >= 1 && len <= MAX_ENCODED_LEN);
    debug_assert!(offset < BLOCK_SIZE);
    debug_assert!(block_id <= MAX_BLOCK_ID);

    #[allow(clippy::cast_possible_truncation)]
    {
        (block_id << ID_SHIFT) | (offset as u32) | ((len as u32) << OFFSET_BITS)
    }
}

/// Extracts the chain offset.
pub fn offset(code: u32) -> usize {
    (code as usize) & (BLOCK_SIZE - 1)
}

/// Extracts the block id.
pub fn block_id(code: u32) -> u32 {
    code >> ID_SHIFT
}

/// Extracts the length field; `MAX_ENCODED_LEN` means the element count must
/// be read from the chain bytes instead.
pub fn length(code: u32) -> usize {
    ((code >> OFFSET_BITS) as usize) & MAX_ENCODED_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn narrow_pack_roundtrip() {
        for (id, off, len) in [
            (0u32, 0usize, 1usize),
            (1, 17, 3),
            (MAX_BLOCK_ID, BLOCK_SIZE - 1, MAX_ENCODED_LEN),
            (131_071, 4_095, 6),
        ] {
            let code = pack(id, off, len);
            assert_eq!(block_id(code), id);
            assert_eq!(offset(code), off);
            assert_eq!(length(code), len);
        }
    }

    #[test]
    fn narrow_pack_never_produces_empty() {
        // minimal valid code still has a non-zero length field
        assert_ne!(pack(0, 0, 1), EMPTY);
    }
}
