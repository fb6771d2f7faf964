// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::shared::SharedBlock;
use crate::bucket::wide;
use crossbeam_skiplist::SkipMap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

thread_local! {
    // current append block per (thread, map instance)
    static CURRENT: RefCell<FxHashMap<u64, Arc<SharedBlock>>> =
        RefCell::new(FxHashMap::default());
}

/// Block allocator for the concurrent maps.
///
/// Every thread appends into its own current block, so appends never
/// interleave within one block; reads and reference-count drops come from
/// any thread. The id registry is a lock-free ordered map.
///
/// Block caching is not possible here without a reader count on the block:
/// a removed block may still be scanned by a thread that resolved it just
/// before the chain moved elsewhere. That is also why block bytes are never
/// touched after removal - the reader finishes against the stale, still
/// intact bytes and retries.
pub struct ConcurrentAllocator {
    blocks: SkipMap<u32, Arc<SharedBlock>>,
    next_id: AtomicU32,
}

impl Default for ConcurrentAllocator {
    fn default() -> Self {
        Self {
            blocks: SkipMap::new(),
            next_id: AtomicU32::new(0),
        }
    }
}

impl ConcurrentAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Resolves a block id. `None` means the block was already removed,
    /// which callers treat as "the chain moved, retry" - never as an error.
    pub fn by_id(&self, id: u32) -> Option<Arc<SharedBlock>> {
        self.blocks.get(&id).map(|entry| entry.value().clone())
    }

    /// Drops one reference, removing the block from the registry once it is
    /// sealed and unreferenced.
    pub fn release(&self, block: &SharedBlock) {
        if block.release() {
            self.blocks.remove(&block.id());
        }
    }

    /// Returns the calling thread's current block for this map, with at
    /// least `required` bytes of append space. Rolls over to a freshly
    /// allocated block when the current one is full.
    pub fn local_block(&self, map_id: u64, required: usize) -> Arc<SharedBlock> {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();

            if let Some(block) = current.get(&map_id) {
                if block.has_space(required) {
                    return block.clone();
                }
                if block.seal() {
                    // no chain ever referenced it, so nobody will release it
                    self.blocks.remove(&block.id());
                }
            }

            let size = required.max(wide::block_size(self.blocks.len()));
            let block = self.allocate(size);
            current.insert(map_id, block.clone());
            block
        })
    }

    fn allocate(&self, size: usize) -> Arc<SharedBlock> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let block = Arc::new(SharedBlock::new(id, size));
        self.blocks.insert(id, block.clone());
        block
    }
}
