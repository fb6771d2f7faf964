// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod narrow;
pub mod wide;

use std::collections::TryReserveError;

/// Number of elements in a chain, as far as the bucket code knows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainLen {
    /// The chain holds exactly this many elements.
    Exact(usize),

    /// The chain is longer than the length field can express; the true count
    /// is stored as a varint before the first pair.
    Prefixed,
}

/// A decoded bucket code: where a chain lives and how long it is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BucketPtr {
    pub block_id: u32,
    pub offset: usize,
    pub len: ChainLen,
}

enum Table {
    Narrow(Box<[u32]>),
    Wide(Box<[u64]>),
}

/// Bucket table for the single-threaded maps.
///
/// Starts out narrow (`u32` codes), so small maps pay half the table
/// overhead, and migrates the entire table to wide (`u64`) codes the first
/// time a block id or offset outgrows the narrow field widths.
pub struct Buckets {
    slots: Table,
}

impl Buckets {
    /// Allocates a zeroed table. Allocation failure is reported instead of
    /// aborting so that a growing map can fall back to its current table.
    pub fn new(capacity: usize, wide: bool) -> Result<Self, TryReserveError> {
        let slots = if wide {
            let mut v: Vec<u64> = Vec::new();
            v.try_reserve_exact(capacity)?;
            v.resize(capacity, wide::EMPTY);
            Table::Wide(v.into_boxed_slice())
        } else {
            let mut v: Vec<u32> = Vec::new();
            v.try_reserve_exact(capacity)?;
            v.resize(capacity, narrow::EMPTY);
            Table::Narrow(v.into_boxed_slice())
        };
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        match &self.slots {
            Table::Narrow(t) => t.len(),
            Table::Wide(t) => t.len(),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self.slots, Table::Wide(_))
    }

    /// Largest value of the current encoding's length field (the sentinel).
    pub fn max_encoded_len(&self) -> usize {
        match &self.slots {
            Table::Narrow(_) => narrow::MAX_ENCODED_LEN,
            Table::Wide(_) => wide::MAX_ENCODED_LEN,
        }
    }

    /// Byte size for the next allocated block under the current encoding.
    pub fn block_size(&self, blocks_active: usize) -> usize {
        match &self.slots {
            Table::Narrow(_) => narrow::BLOCK_SIZE,
            Table::Wide(_) => wide::block_size(blocks_active),
        }
    }

    /// Returns the decoded bucket, or `None` for an empty slot.
    pub fn get(&self, index: usize) -> Option<BucketPtr> {
        match &self.slots {
            Table::Narrow(t) => {
                let code = *t.get(index).expect("should be in bounds");
                if code == narrow::EMPTY {
                    return None;
                }
                Some(BucketPtr {
                    block_id: narrow::block_id(code),
                    offset: narrow::offset(code),
                    len: decode_len(narrow::length(code), narrow::MAX_ENCODED_LEN),
                })
            }
            Table::Wide(t) => {
                let code = *t.get(index).expect("should be in bounds");
                if code == wide::EMPTY {
                    return None;
                }
                Some(BucketPtr {
                    block_id: wide::block_id(code),
                    offset: wide::offset(code),
                    len: decode_len(wide::length(code), wide::MAX_ENCODED_LEN),
                })
            }
        }
    }

    /// Points a bucket at a chain.
    ///
    /// In the narrow encoding, a block id or offset beyond the narrow field
    /// widths migrates the whole table to the wide encoding first, re-packing
    /// every live code and translating the narrow length sentinel into the
    /// wide one.
    pub fn set(&mut self, index: usize, block_id: u32, offset: usize, len: ChainLen) {
        if let Table::Narrow(_) = &self.slots {
            if block_id > narrow::MAX_BLOCK_ID || offset >= narrow::BLOCK_SIZE {
                self.migrate();
            }
        }

        match &mut self.slots {
            Table::Narrow(t) => {
                let slot = t.get_mut(index).expect("should be in bounds");
                *slot = narrow::pack(block_id, offset, encode_len(len, narrow::MAX_ENCODED_LEN));
            }
            Table::Wide(t) => {
                let slot = t.get_mut(index).expect("should be in bounds");
                *slot = wide::pack(block_id, offset, encode_len(len, wide::MAX_ENCODED_LEN));
            }
        }
    }

    /// Marks a bucket as empty.
    pub fn clear(&mut self, index: usize) {
        match &mut self.slots {
            Table::Narrow(t) => *t.get_mut(index).expect("should be in bounds") = narrow::EMPTY,
            Table::Wide(t) => *t.get_mut(index).expect("should be in bounds") = wide::EMPTY,
        }
    }

    fn migrate(&mut self) {
        let Table::Narrow(old) = &self.slots else {
            return;
        };

        log::debug!(
            "migrating bucket table to the wide encoding ({} slots)",
            old.len(),
        );

        let mut wide_slots: Vec<u64> = vec![wide::EMPTY; old.len()];
        for (slot, code) in wide_slots.iter_mut().zip(old.iter()) {
            if *code == narrow::EMPTY {
                continue;
            }
            // chain lengths at the narrow sentinel must be re-expressed under
            // the wide sentinel so the count is still read from the chain
            let len = decode_len(narrow::length(*code), narrow::MAX_ENCODED_LEN);
            *slot = wide::pack(
                narrow::block_id(*code),
                narrow::offset(*code),
                encode_len(len, wide::MAX_ENCODED_LEN),
            );
        }

        self.slots = Table::Wide(wide_slots.into_boxed_slice());
    }
}

fn decode_len(field: usize, sentinel: usize) -> ChainLen {
    if field == sentinel {
        ChainLen::Prefixed
    } else {
        ChainLen::Exact(field)
    }
}

fn encode_len(len: ChainLen, sentinel: usize) -> usize {
    match len {
        ChainLen::Exact(n) => {
            debug_assert!(n >= 1 && n < sentinel);
            n
        }
        ChainLen::Prefixed => sentinel,
    }
}
