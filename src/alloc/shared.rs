// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::chain::bytes::{ByteReader, ByteWriter};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// Unit of memory allocation for the concurrent maps.
///
/// Every block has exactly one writer at a time - the thread that owns it as
/// its current block - and any number of readers for already-published
/// chains. The publication edge is the bucket table: chain bytes are written
/// before the packed code is CAS'd into a slot (Release), and readers load
/// the code (Acquire) before touching the bytes. Published regions are never
/// written again; the only rollback (a failed CAS) rewinds the append cursor
/// over bytes no other thread has ever seen a pointer to.
pub struct SharedBlock {
    id: u32,
    data: Box<[UnsafeCell<u8>]>,
    pos: AtomicUsize,
    used: AtomicI64,
    sealed: AtomicBool,
}

// Safety: the data cells are only accessed under the protocol above; all
// other fields are atomics.
unsafe impl Send for SharedBlock {}
unsafe impl Sync for SharedBlock {}

impl SharedBlock {
    pub fn new(id: u32, size: usize) -> Self {
        Self {
            id,
            data: (0..size).map(|_| UnsafeCell::new(0)).collect(),
            pos: AtomicUsize::new(0),
            used: AtomicI64::new(0),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Append cursor. Only the owning thread moves it, so relaxed loads are
    /// enough; cross-thread readers never look at `pos`, they get offsets
    /// from bucket codes.
    pub fn pos(&self) -> usize {
        self.pos.load(Ordering::Relaxed)
    }

    /// Moves the append cursor. Called by the owning thread only, either to
    /// commit an append or to roll back a speculative write after a lost CAS.
    pub fn set_pos(&self, pos: usize) {
        debug_assert!(pos <= self.data.len());
        self.pos.store(pos, Ordering::Relaxed);
    }

    /// Whether another `req` bytes fit behind the append cursor.
    pub fn has_space(&self, req: usize) -> bool {
        self.data.len() - self.pos() >= req
    }

    pub fn retain(&self) {
        self.used.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one reference; returns true once the block holds no chains and
    /// is sealed, i.e. the caller must remove it from the allocator.
    ///
    /// Sequentially consistent, like `seal`: the two race against each other
    /// on different variables, and at least one side must observe the other,
    /// or a drained sealed block would never be removed.
    pub fn release(&self) -> bool {
        self.used.fetch_sub(1, Ordering::SeqCst) == 1 && self.sealed.load(Ordering::SeqCst)
    }

    /// Marks the block read-only; returns true if it is already unreferenced
    /// and the caller must remove it (there will be no release to do so).
    pub fn seal(&self) -> bool {
        self.sealed.store(true, Ordering::SeqCst);
        self.used.load(Ordering::SeqCst) == 0
    }

    /// Reader positioned at `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must be the start of a published chain in this block; the
    /// reader must not be driven past that chain's encoded bytes.
    pub unsafe fn reader_at(&self, offset: usize) -> ByteReader<'_> {
        let mut reader = ByteReader::from_raw(UnsafeCell::raw_get(self.data.as_ptr()), self.capacity());
        reader.set_position(offset);
        reader
    }

    /// Writer over `offset..capacity`.
    ///
    /// # Safety
    ///
    /// The caller must be the thread owning this block, and `offset` must not
    /// precede any published chain (i.e. `offset >= pos()` at publication
    /// time, or the start of a region being rolled back by its own writer).
    pub unsafe fn writer_at(&self, offset: usize) -> ByteWriter<'_> {
        ByteWriter::from_raw(
            UnsafeCell::raw_get(self.data.as_ptr()).add(offset),
            self.capacity() - offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_log::test;

    #[test]
    fn append_then_read_back() {
        let block = SharedBlock::new(1, 64);

        // Safety: single-threaded test, we own the block
        unsafe {
            let mut w = block.writer_at(block.pos());
            w.write_all(b"chain").expect("fits");
            block.set_pos(w.position());
        }

        let mut buf = [0u8; 5];
        unsafe {
            use std::io::Read;
            block.reader_at(0).read_exact(&mut buf).expect("present");
        }
        assert_eq!(&buf, b"chain");
    }

    #[test]
    fn release_signals_removal_only_when_sealed() {
        let block = SharedBlock::new(1, 16);
        block.retain();
        block.retain();

        assert!(!block.release());
        assert!(!block.seal());
        assert!(block.release());
    }

    #[test]
    fn sealing_an_unused_block_signals_removal() {
        let block = SharedBlock::new(1, 16);
        assert!(block.seal());
    }
}
