// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::chain::bytes::ByteWriter;

/// Unit of memory allocation for the single-threaded maps.
///
/// A block is an append-only byte arena. Chains are written at the append
/// cursor and referenced by `(block id, offset)` from the bucket table; the
/// reference count tracks how many chains currently live here. Once sealed
/// (no further appends) and unreferenced, a block is removed - and possibly
/// recycled - by its allocator.
pub struct Block {
    id: u32,
    data: Box<[u8]>,
    pos: usize,
    used: u32,
    sealed: bool,
}

impl Block {
    pub fn new(id: u32, size: usize) -> Self {
        Self {
            id,
            data: vec![0u8; size].into_boxed_slice(),
            pos: 0,
            used: 0,
            sealed: false,
        }
    }

    /// Resets a recycled block for reuse under a fresh id.
    pub fn recycle(mut self, id: u32) -> Self {
        self.id = id;
        self.pos = 0;
        self.used = 0;
        self.sealed = false;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.data.len());
        self.pos = pos;
    }

    /// Whether another `req` bytes fit behind the append cursor.
    pub fn has_space(&self, req: usize) -> bool {
        self.data.len() - self.pos >= req
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Writer over the append area, starting at the cursor.
    pub fn append_writer(&mut self) -> ByteWriter<'_> {
        let pos = self.pos;
        ByteWriter::new(self.data.get_mut(pos..).expect("should be in bounds"))
    }

    /// Writer over an existing region, for in-place chain rewrites. The
    /// region must already belong to the chain being rewritten.
    pub fn region_writer(&mut self, offset: usize, len: usize) -> ByteWriter<'_> {
        ByteWriter::new(
            self.data
                .get_mut(offset..offset + len)
                .expect("should be in bounds"),
        )
    }

    pub fn retain(&mut self) {
        self.used += 1;
    }

    /// Drops one reference; returns true once the block holds no chains and
    /// is sealed, i.e. it should be removed from the allocator.
    pub fn release(&mut self) -> bool {
        debug_assert!(self.used > 0);
        self.used -= 1;
        self.used == 0 && self.sealed
    }

    /// Marks the block read-only; no more data will be appended.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_unused(&self) -> bool {
        self.used == 0
    }
}
