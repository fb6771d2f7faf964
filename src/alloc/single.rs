// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::block::Block;
use crate::HashMap;
use std::collections::VecDeque;

/// Block allocator for the single-threaded maps.
///
/// Keeps one "current" block that receives all appends; when it cannot fit a
/// request it is sealed and replaced. Blocks whose reference count drops to
/// zero after sealing are removed and, within a configurable memory bound,
/// pushed onto a recycle queue so a map with a stable working set stops
/// allocating.
pub struct Allocator {
    blocks: HashMap<u32, Block>,
    next_id: u32,
    current: Option<u32>,
    recycle: VecDeque<Block>,
    recycle_limit: u64,
    recycled_bytes: u64,
}

impl Allocator {
    pub fn new(recycle_limit: u64) -> Self {
        Self {
            blocks: HashMap::default(),
            next_id: 0,
            current: None,
            recycle: VecDeque::with_capacity(16),
            recycle_limit,
            recycled_bytes: 0,
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// O(1) lookup; `None` means the block was already removed.
    pub fn by_id(&self, id: u32) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn by_id_mut(&mut self, id: u32) -> Option<&mut Block> {
        self.blocks.get_mut(&id)
    }

    /// Drops one reference to a block, removing it once it is sealed and
    /// holds no more chains.
    pub fn release(&mut self, id: u32) {
        let remove = match self.blocks.get_mut(&id) {
            Some(block) => block.release(),
            None => false,
        };
        if remove {
            self.remove(id);
        }
    }

    /// Returns a block with at least `required` bytes of append space. The
    /// current block is reused while it has room; otherwise it is sealed and
    /// a new one sized `max(required, block_size)` becomes current.
    pub fn get_block(&mut self, required: usize, block_size: usize) -> &mut Block {
        let fits = self
            .current
            .and_then(|id| self.blocks.get(&id))
            .is_some_and(|block| block.has_space(required));

        if !fits {
            if let Some(id) = self.current.take() {
                let unused = {
                    let block = self.blocks.get_mut(&id).expect("current block is live");
                    block.seal();
                    block.is_unused()
                };
                if unused {
                    self.remove(id);
                }
            }

            let id = self.allocate(required, required.max(block_size));
            self.current = Some(id);
        }

        let id = self.current.expect("current block was just installed");
        self.blocks.get_mut(&id).expect("current block is live")
    }

    fn allocate(&mut self, required: usize, size: usize) -> u32 {
        self.next_id += 1;
        let id = self.next_id;

        // Reuse a recycled block if one fits the request. Blocks are never
        // grown, so a popped block that is larger than the target size is
        // discarded for good.
        let mut block = None;
        while let Some(candidate) = self.recycle.pop_front() {
            self.recycled_bytes -= candidate.capacity() as u64;
            if candidate.capacity() >= required && candidate.capacity() <= size {
                block = Some(candidate.recycle(id));
                break;
            }
        }

        let block = block.unwrap_or_else(|| Block::new(id, size));
        self.blocks.insert(id, block);
        id
    }

    fn remove(&mut self, id: u32) {
        if let Some(block) = self.blocks.remove(&id) {
            // the block most likely survived a while already, so keeping it
            // around for reuse beats handing it back to the OS
            if block.capacity() as u64 + self.recycled_bytes <= self.recycle_limit {
                self.recycled_bytes += block.capacity() as u64;
                self.recycle.push_back(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn current_block_is_reused_until_full() {
        let mut alloc = Allocator::new(0);
        let id = {
            let block = alloc.get_block(10, 100);
            block.retain();
            let pos = block.pos();
            block.set_pos(pos + 90);
            block.id()
        };

        assert_eq!(alloc.get_block(10, 100).id(), id);
        assert_ne!(alloc.get_block(11, 100).id(), id);
    }

    #[test]
    fn oversized_requests_get_oversized_blocks() {
        let mut alloc = Allocator::new(0);
        let block = alloc.get_block(10_000, 4_096);
        assert!(block.capacity() >= 10_000);
    }

    #[test]
    fn release_of_sealed_block_removes_it() {
        let mut alloc = Allocator::new(0);
        let id = {
            let block = alloc.get_block(10, 64);
            block.retain();
            block.set_pos(60);
            block.id()
        };

        // rolls over to a fresh block, sealing the old one
        alloc.get_block(10, 64);
        assert!(alloc.by_id(id).is_some());

        alloc.release(id);
        assert!(alloc.by_id(id).is_none());
    }

    #[test]
    fn unreferenced_block_is_removed_at_seal_time() {
        let mut alloc = Allocator::new(0);
        let id = {
            let block = alloc.get_block(10, 64);
            block.set_pos(60);
            block.id()
        };

        alloc.get_block(10, 64);
        assert!(alloc.by_id(id).is_none());
    }

    /// Seals the current block (by rolling over to a fresh one) and drops its
    /// only reference, so it lands in the recycle queue if the bound allows.
    fn recycle_one(alloc: &mut Allocator, size: usize) {
        let id = {
            let block = alloc.get_block(10, size);
            block.retain();
            let cap = block.capacity();
            block.set_pos(cap);
            block.id()
        };
        alloc.get_block(10, size);
        alloc.release(id);
    }

    #[test]
    fn freed_blocks_are_recycled() {
        let mut alloc = Allocator::new(64);
        recycle_one(&mut alloc, 64);

        // force a rollover with a larger target size: a fresh block would be
        // 128 bytes, the recycled one keeps its 64
        {
            let block = alloc.get_block(10, 64);
            let cap = block.capacity();
            block.set_pos(cap);
        }
        let reused = alloc.get_block(10, 128);
        assert_eq!(reused.capacity(), 64);
        assert_eq!(reused.pos(), 0);
    }

    #[test]
    fn recycle_bound_is_respected() {
        let mut alloc = Allocator::new(0);
        recycle_one(&mut alloc, 64);

        {
            let block = alloc.get_block(10, 64);
            let cap = block.capacity();
            block.set_pos(cap);
        }

        // nothing was recycled, so the new block gets the full target size
        let fresh = alloc.get_block(10, 128);
        assert_eq!(fresh.capacity(), 128);
    }

    #[test]
    fn recycled_blocks_never_serve_larger_requests() {
        let mut alloc = Allocator::new(1_024);
        recycle_one(&mut alloc, 64);

        {
            let block = alloc.get_block(10, 64);
            let cap = block.capacity();
            block.set_pos(cap);
        }

        // the 64-byte leftover cannot hold this chain
        let bigger = alloc.get_block(100, 64);
        assert!(bigger.capacity() >= 100);
    }
}
