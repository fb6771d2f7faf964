// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod buffers;

use crate::alloc::{ConcurrentAllocator, SharedBlock};
use crate::bucket::{wide, ChainLen};
use crate::chain::{ChainReader, ChainWriter};
use crate::key::Key;
use crate::primes;
use crate::serializer::{DefaultSerializer, Serializer};
use buffers::{new_table, AllocationGate, Buffers, BuffersCell};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

// worst case size of a chain's leading element count varint
const COUNT_PREFIX_MAX: usize = 5;

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(0);

static CPU_COUNT: LazyLock<usize> = LazyLock::new(|| {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
});

thread_local! {
    // per-(thread, map) size deltas; summed by len()
    static LOCAL_SIZES: RefCell<FxHashMap<u64, Arc<AtomicI64>>> =
        RefCell::new(FxHashMap::default());

    static SCAN_SALT: Cell<u64> = const { Cell::new(0) };
}

/// A lock-free compressed hash map.
///
/// Storage-wise this is the same design as [`crate::ChainedMap`]: entries
/// live as delta-compressed byte chains inside shared memory blocks, and a
/// bucket table of packed codes points at them. Concurrency-wise there are
/// no locks; the bucket table is an array of atomics, every mutation is a
/// compare-and-swap on a single slot, and contention is resolved by retrying.
/// A few paths spin briefly - waiting out another thread's rehash or table
/// allocation - but nothing blocks.
///
/// `get` returns the value that was current at the moment the bucket was
/// read, like the usual concurrent map contract: a racing update may or may
/// not be visible. `put` and `remove` always observe the latest chain, since
/// their CAS fails otherwise.
///
/// Rehashing is cooperative: the thread that trips the growth threshold
/// allocates the new table, and every thread that touches the map while the
/// rehash is in flight helps move chains before doing its own work.
///
/// # Examples
///
/// ```
/// use chain_map::Config;
///
/// let map = Config::new().expected_size(1_000).open_concurrent::<i64, i64>();
///
/// std::thread::scope(|s| {
///     for t in 0..4i64 {
///         let map = &map;
///         s.spawn(move || {
///             for k in (t * 100)..(t * 100 + 100) {
///                 map.put(k, k * 2);
///             }
///         });
///     }
/// });
///
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.get(123), Some(246));
/// ```
pub struct ConcurrentChainedMap<K, V, KS = DefaultSerializer<K>, VS = DefaultSerializer<V>> {
    map_id: u64,
    keys: KS,
    values: VS,
    fill_factor: f32,
    /// Cheap pre-check: growth is only considered once some bucket exceeds
    /// this length, which keeps the hot path away from the contended size
    /// counters.
    int_fill: usize,
    data: BuffersCell,
    alloc: ConcurrentAllocator,
    gate: AllocationGate,
    counters: Mutex<Vec<Arc<AtomicI64>>>,
    _marker: PhantomData<fn(K) -> V>,
}

/// Result of speculatively rebuilding a chain. Carries everything needed to
/// either commit (release the input block's reference) or roll back (rewind
/// the output block's cursor and drop its reference).
struct UpdateResult<V> {
    chain: u64,
    previous: Option<V>,
    size_change: i64,
    input: Option<Arc<SharedBlock>>,
    output: Option<Arc<SharedBlock>>,
    output_prev_start: usize,
}

impl<K, V, KS, VS> ConcurrentChainedMap<K, V, KS, VS>
where
    K: Key,
    V: Clone,
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    /// Creates a map with explicit serializers.
    ///
    /// `size` is the expected entry count; the map grows past it as needed.
    ///
    /// # Panics
    ///
    /// Panics if `fill_factor` is outside `(0.01, 16]`, or if the initial
    /// table cannot be allocated.
    pub fn with_serializers(size: u64, fill_factor: f32, keys: KS, values: VS) -> Self {
        assert!(
            fill_factor > 0.01 && fill_factor <= 16.0,
            "fill factor must be in (0.01, 16]",
        );

        let (capacity, threshold) = primes::capacity_and_threshold(size, fill_factor);
        let buffers =
            Buffers::initial(capacity, threshold).expect("initial bucket table allocation");

        Self {
            map_id: NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed) + 1,
            keys,
            values,
            fill_factor,
            int_fill: fill_factor.ceil() as usize,
            data: BuffersCell::new(buffers),
            alloc: ConcurrentAllocator::new(),
            gate: AllocationGate::new(),
            counters: Mutex::new(Vec::new()),
            _marker: PhantomData,
        }
    }

    /// Returns the value stored for `key`, as of the moment the bucket was
    /// read.
    #[must_use]
    pub fn get(&self, key: K) -> Option<V> {
        loop {
            let buffers = self.data.load();
            if buffers.old.is_some() {
                // settle the table before reading
                self.rehash(buffers.next_stable_version);
            }

            let table = &*buffers.cur;
            let index = key.bucket_index(table.len());
            let code = load_slot(table, index);

            if code == wide::EMPTY {
                return None;
            }
            if code == wide::RELOCATED {
                self.rehash(buffers.next_stable_version);
                continue;
            }

            let Some(block) = self.alloc.by_id(wide::block_id(code)) else {
                // the chain moved between our bucket read and the block
                // lookup; the bucket has a new home for it by now
                continue;
            };

            // Safety: the code was published pointing at this offset
            let reader = unsafe { block.reader_at(wide::offset(code)) };
            let mut iter = ChainReader::new(&self.keys, &self.values, reader, chain_len(code));

            while iter.has_next() {
                let (k, v) = iter.advance();
                if k == key {
                    return Some(v);
                }
                if k > key {
                    // keys are sorted
                    return None;
                }
            }
            return None;
        }
    }

    /// Inserts or updates an entry, returning the previous value if any.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        'restart: loop {
            let buffers = self.data.load();
            if buffers.old.is_some() {
                self.rehash(buffers.next_stable_version);
                continue 'restart;
            }

            let table = &*buffers.cur;
            let index = key.bucket_index(table.len());
            let mut code = load_slot(table, index);
            if code == wide::RELOCATED {
                self.rehash(buffers.next_stable_version);
                continue 'restart;
            }

            loop {
                if let Some(result) = self.add_to_chain(code, key, &value) {
                    if cas_slot(table, index, code, result.chain) {
                        if let Some(input) = &result.input {
                            self.alloc.release(input);
                        }
                        let previous = result.previous;
                        self.change_size(result.size_change, buffers, wide::length(result.chain));
                        return previous;
                    }
                    self.roll_back(&result);
                }

                // the slot changed under us (or our input block vanished);
                // retry against its current state
                code = load_slot(table, index);
                if code == wide::RELOCATED {
                    self.rehash(buffers.next_stable_version);
                    continue 'restart;
                }
            }
        }
    }

    /// Removes an entry, returning its value if the key was present.
    pub fn remove(&self, key: K) -> Option<V> {
        'restart: loop {
            let buffers = self.data.load();
            if buffers.old.is_some() {
                self.rehash(buffers.next_stable_version);
                continue 'restart;
            }

            let table = &*buffers.cur;
            let index = key.bucket_index(table.len());
            let mut code = load_slot(table, index);

            if code == wide::EMPTY {
                return None;
            }
            if code == wide::RELOCATED {
                self.rehash(buffers.next_stable_version);
                continue 'restart;
            }

            loop {
                if let Some(result) = self.remove_key(code, key) {
                    if result.chain == code {
                        // key absent; valid only if the chain did not change
                        // while we were scanning it
                        if load_slot(table, index) == code {
                            return None;
                        }
                    } else if cas_slot(table, index, code, result.chain) {
                        if let Some(input) = &result.input {
                            self.alloc.release(input);
                        }
                        let previous = result.previous;
                        self.change_size(result.size_change, buffers, wide::length(result.chain));
                        return previous;
                    } else {
                        self.roll_back(&result);
                    }
                }

                code = load_slot(table, index);
                if code == wide::RELOCATED {
                    self.rehash(buffers.next_stable_version);
                    continue 'restart;
                }
                if code == wide::EMPTY {
                    return None;
                }
            }
        }
    }

    /// Approximate number of entries.
    ///
    /// Summing the per-thread counters does not pause mutators, so the result
    /// can be stale and even transiently negative under concurrent updates.
    /// Calling it in a tight loop will also contend on the counter registry.
    #[must_use]
    pub fn len(&self) -> i64 {
        self.counters
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum()
    }

    /// Whether the map appears to hold no entries (same caveats as
    /// [`ConcurrentChainedMap::len`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// Rebuilds the chain behind `code` with `(key, value)` merged in. The
    /// new chain is complete but unpublished; the caller commits it with a
    /// CAS. Returns `None` if the input block is already gone, meaning the
    /// chain moved and `code` is stale.
    fn add_to_chain(&self, code: u64, key: K, value: &V) -> Option<UpdateResult<V>> {
        let entry_len = self.keys.max_length(&key) + self.values.max_length(value) + 1;

        if code == wide::EMPTY {
            let output = self.alloc.local_block(self.map_id, entry_len);
            let start = output.pos();
            output.retain();

            // Safety: output is this thread's current block; start is its cursor
            let buf = unsafe { output.writer_at(start) };
            let mut writer = ChainWriter::new(&self.keys, &self.values, buf, None);
            writer.write_pair(key, value);
            output.set_pos(start + writer.position());

            return Some(UpdateResult {
                chain: wide::pack(output.id(), start, 1),
                previous: None,
                size_change: 1,
                input: None,
                output: Some(output),
                output_prev_start: start,
            });
        }

        let input = self.alloc.by_id(wide::block_id(code))?;
        let offset = wide::offset(code);

        // Safety: the code was published pointing at this offset
        let reader = unsafe { input.reader_at(offset) };
        let mut iter = ChainReader::new(&self.keys, &self.values, reader, chain_len(code));

        if iter.elems() > wide::MAX_ENCODED_LEN - 2 {
            // the rebuilt chain may outgrow the length field
            return Some(self.add_to_chain_slow(code, iter, &input, offset, key, value, entry_len));
        }

        // measure the chain, then rescan it for the merge
        while iter.has_next() {
            iter.skip();
        }
        let chain_bytes = iter.position() - offset;
        iter.restart(offset, chain_len(code));

        // 2x the entry length on top of the old bytes: the new entry itself,
        // plus the deltas around it that may re-encode wider
        let output = self
            .alloc
            .local_block(self.map_id, chain_bytes + 2 * entry_len);
        let start = output.pos();
        output.retain();

        // Safety: output is this thread's current block; start is its cursor
        let buf = unsafe { output.writer_at(start) };
        let mut writer = ChainWriter::new(&self.keys, &self.values, buf, None);

        let mut previous = None;
        let mut inserted = false;

        while iter.has_next() {
            let (k, v) = iter.advance();
            if k < key {
                writer.write_pair(k, &v);
            } else if k == key {
                inserted = true;
                previous = Some(v);
                writer.write_pair(key, value);
            } else {
                if !inserted {
                    inserted = true;
                    writer.write_pair(key, value);
                }
                writer.write_pair(k, &v);
            }
        }
        if !inserted {
            // all stored keys are smaller
            writer.write_pair(key, value);
        }

        output.set_pos(start + writer.position());

        let updated = previous.is_some();
        let elems = iter.elems() + usize::from(!updated);
        drop(iter);

        Some(UpdateResult {
            chain: wide::pack(output.id(), start, elems),
            previous,
            size_change: i64::from(!updated),
            input: Some(input),
            output: Some(output),
            output_prev_start: start,
        })
    }

    /// `add_to_chain` for chains at (or past) the length field's limit: the
    /// element count is written in front of the chain, so the true count and
    /// the presence of the key must be known before encoding starts.
    #[allow(clippy::too_many_arguments)]
    fn add_to_chain_slow(
        &self,
        code: u64,
        mut iter: ChainReader<'_, K, V, KS, VS>,
        input: &Arc<SharedBlock>,
        offset: usize,
        key: K,
        value: &V,
        entry_len: usize,
    ) -> UpdateResult<V> {
        let mut has_key = false;
        let mut previous = None;
        while iter.has_next() {
            let (k, v) = iter.advance();
            if k == key {
                has_key = true;
                previous = Some(v);
            }
        }
        let chain_bytes = iter.position() - offset;
        let elems = if has_key {
            iter.elems()
        } else {
            iter.elems() + 1
        };

        let output = self
            .alloc
            .local_block(self.map_id, chain_bytes + 2 * entry_len + COUNT_PREFIX_MAX);
        let start = output.pos();
        output.retain();

        let len = chain_len_for(elems);

        // Safety: output is this thread's current block; start is its cursor
        let buf = unsafe { output.writer_at(start) };
        let mut writer = ChainWriter::new(
            &self.keys,
            &self.values,
            buf,
            matches!(len, ChainLen::Prefixed).then_some(elems),
        );

        iter.restart(offset, chain_len(code));

        let mut inserted = false;
        while iter.has_next() {
            let (k, v) = iter.advance();
            if k < key {
                writer.write_pair(k, &v);
            } else if k == key {
                inserted = true;
                writer.write_pair(key, value);
            } else {
                if !inserted {
                    inserted = true;
                    writer.write_pair(key, value);
                }
                writer.write_pair(k, &v);
            }
        }
        if !inserted {
            writer.write_pair(key, value);
        }

        output.set_pos(start + writer.position());
        drop(iter);

        UpdateResult {
            chain: wide::pack(output.id(), start, elems.min(wide::MAX_ENCODED_LEN)),
            previous,
            size_change: i64::from(!has_key),
            input: Some(input.clone()),
            output: Some(output),
            output_prev_start: start,
        }
    }

    /// Rebuilds the chain behind `code` without `key`.
    ///
    /// Outcomes: `None` means the input block is gone, rerun against a fresh
    /// code. Otherwise `chain == code` means the key is absent (no output was
    /// produced); `chain == EMPTY` means the removed entry was the chain's
    /// last; any other chain is the rewritten remainder.
    fn remove_key(&self, code: u64, key: K) -> Option<UpdateResult<V>> {
        let input = self.alloc.by_id(wide::block_id(code))?;
        let offset = wide::offset(code);

        // Safety: the code was published pointing at this offset
        let reader = unsafe { input.reader_at(offset) };
        let mut iter = ChainReader::new(&self.keys, &self.values, reader, chain_len(code));

        let mut has_key = false;
        let mut previous = None;
        while iter.has_next() {
            let (k, v) = iter.advance();
            if k == key {
                has_key = true;
                previous = Some(v);
            }
        }

        if !has_key {
            return Some(UpdateResult {
                chain: code,
                previous: None,
                size_change: 0,
                input: None,
                output: None,
                output_prev_start: 0,
            });
        }

        if iter.elems() == 1 {
            drop(iter);
            return Some(UpdateResult {
                chain: wide::EMPTY,
                previous,
                size_change: -1,
                input: Some(input),
                output: None,
                output_prev_start: 0,
            });
        }

        let chain_bytes = iter.position() - offset;
        let remaining = iter.elems() - 1;
        iter.restart(offset, chain_len(code));

        // a shorter chain never re-encodes larger than the original bytes
        let output = self.alloc.local_block(self.map_id, chain_bytes);
        let start = output.pos();
        output.retain();

        let len = chain_len_for(remaining);

        // Safety: output is this thread's current block; start is its cursor
        let buf = unsafe { output.writer_at(start) };
        let mut writer = ChainWriter::new(
            &self.keys,
            &self.values,
            buf,
            matches!(len, ChainLen::Prefixed).then_some(remaining),
        );

        while iter.has_next() {
            let (k, v) = iter.advance();
            if k != key {
                writer.write_pair(k, &v);
            }
        }

        output.set_pos(start + writer.position());
        drop(iter);

        Some(UpdateResult {
            chain: wide::pack(output.id(), start, remaining.min(wide::MAX_ENCODED_LEN)),
            previous,
            size_change: -1,
            input: Some(input),
            output: Some(output),
            output_prev_start: start,
        })
    }

    /// Undoes a speculative chain build after a lost CAS. The output region
    /// is this thread's own append area, so rewinding the cursor is safe.
    fn roll_back(&self, result: &UpdateResult<V>) {
        if let Some(output) = &result.output {
            output.set_pos(result.output_prev_start);
            self.alloc.release(output);
        }
    }

    fn change_size(&self, delta: i64, buffers: &Buffers, bucket_len: usize) {
        if delta == 0 {
            return;
        }
        self.local_counter().fetch_add(delta, Ordering::Relaxed);

        // only consider growing once some bucket is longer than the fill
        // factor says it should be
        if bucket_len <= self.int_fill {
            return;
        }
        if i128::from(self.len()) <= i128::from(buffers.threshold) {
            return;
        }

        let multiplier = if self.fill_factor <= 2.0 {
            2u64
        } else {
            self.int_fill as u64
        };

        let mut new_capacity = primes::next_prime(
            ((multiplier * buffers.threshold) as f64 / f64::from(self.fill_factor)).ceil() as u64,
        );
        // close to the maximal table size, jump straight to it instead of
        // scheduling one more near-useless resize
        if f64::from(new_capacity) * 1.5 > f64::from(primes::max_prime()) {
            new_capacity = primes::max_prime();
        }
        let new_threshold = if new_capacity >= primes::max_prime() {
            u64::MAX
        } else {
            buffers.threshold * multiplier
        };

        let Some(table) = self.allocate_table(new_capacity as usize, buffers) else {
            // the resize started without us (or growth was just disabled);
            // help whatever is in flight and move on
            self.rehash(buffers.next_stable_version);
            return;
        };

        log::debug!(
            "resizing bucket table: {} -> {} slots",
            buffers.cur.len(),
            new_capacity,
        );

        // either our snapshot starts the rehash or a competing one already
        // did; both ways the version target is the one we cached
        let next = buffers.begin_resize(table, new_threshold);
        let _ = self.data.compare_swap(buffers, next);
        self.rehash(buffers.next_stable_version);
    }

    /// Allocates the resize target table, making sure racing threads do not
    /// each allocate one. Returns `None` when the caller should just help
    /// the already-started resize (or when growth got disabled).
    fn allocate_table(
        &self,
        capacity: usize,
        buffers: &Buffers,
    ) -> Option<Arc<[AtomicU64]>> {
        loop {
            if self.gate.try_acquire() {
                let result = if std::ptr::eq(self.data.load(), buffers) {
                    match new_table(capacity) {
                        Ok(table) => Some(table),
                        Err(_) => {
                            // keep serving at the current capacity
                            log::warn!(
                                "bucket table allocation failed ({capacity} slots); growth disabled",
                            );
                            let pinned = buffers.with_threshold(u64::MAX);
                            let _ = self.data.compare_swap(buffers, pinned);
                            None
                        }
                    }
                } else {
                    None
                };
                self.gate.release();
                return result;
            }

            std::thread::yield_now();
            if !std::ptr::eq(self.data.load(), buffers) {
                return None;
            }
        }
    }

    /// Helps the in-flight rehash until the map reaches `next_stable`.
    fn rehash(&self, next_stable: u32) {
        // take a worker ticket
        let ticket = loop {
            let buffers = self.data.load();
            if buffers.version >= next_stable {
                return;
            }
            if buffers.old.is_none() {
                // growth was abandoned; there is nothing to help
                return;
            }
            if self.data.compare_swap(buffers, buffers.add_worker()) {
                break buffers;
            }
        };

        let old = ticket.old.as_ref().expect("ticket taken during a rehash");
        log::trace!("joining rehash towards version {next_stable}");
        self.rehash_loop(old, &ticket.cur);

        // hand the ticket back; the last worker out flips the map stable
        let was_last = loop {
            let buffers = self.data.load();
            if self.data.compare_swap(buffers, buffers.remove_worker()) {
                break buffers.resize_workers == 1;
            }
        };

        if was_last {
            log::trace!("rehash settled at version {next_stable}");
        } else {
            // all data is moved from our point of view, but the table is not
            // stable until every worker is done
            while self.data.load().version < next_stable {
                std::thread::yield_now();
            }
        }
    }

    fn rehash_loop(&self, old: &[AtomicU64], dest: &[AtomicU64]) {
        // starting at a random slot keeps helpers out of each other's way
        let start = scan_start(old.len());
        let jump = old.len() / *CPU_COUNT;

        let mut index = start;
        while index < old.len() {
            if !self.relocate_slot(old, dest, index) {
                // another helper owns this region; leapfrog it
                index += jump;
            }
            index += 1;
        }
        let mut index = 0;
        while index < start {
            if !self.relocate_slot(old, dest, index) {
                index += jump;
            }
            index += 1;
        }
    }

    /// Claims one old-table slot and moves its chain into the new table.
    /// Returns false if the slot was already relocated by someone else.
    fn relocate_slot(&self, old: &[AtomicU64], dest: &[AtomicU64], index: usize) -> bool {
        let slot = old.get(index).expect("should be in bounds");

        let code = loop {
            let code = slot.load(Ordering::Acquire);
            if code == wide::RELOCATED {
                return false;
            }
            // exactly one thread wins each slot; losing against a concurrent
            // mutator just means the chain changed, so claim again
            if slot
                .compare_exchange(code, wide::RELOCATED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break code;
            }
        };

        if code == wide::EMPTY {
            return true;
        }

        let input = self
            .alloc
            .by_id(wide::block_id(code))
            .expect("a chain being relocated keeps its block alive");

        // Safety: the code was published pointing at this offset
        let reader = unsafe { input.reader_at(wide::offset(code)) };
        let mut iter = ChainReader::new(&self.keys, &self.values, reader, chain_len(code));

        if wide::length(code) == 1 {
            // single-entry chain: try to move the pointer without touching
            // the bytes; a populated destination slot falls back to a copy
            let (k, v) = iter.advance();
            drop(iter);
            let index = k.bucket_index(dest.len());
            if !cas_slot(dest, index, wide::EMPTY, code) {
                self.put_during_rehash(dest, k, v);
                self.alloc.release(&input);
            }
        } else {
            while iter.has_next() {
                let (k, v) = iter.advance();
                self.put_during_rehash(dest, k, v);
            }
            drop(iter);
            self.alloc.release(&input);
        }

        true
    }

    /// `put` against the resize destination table. No rehash detection is
    /// needed: the destination cannot itself be resized while this rehash is
    /// in flight.
    fn put_during_rehash(&self, dest: &[AtomicU64], key: K, value: V) {
        let index = key.bucket_index(dest.len());
        let mut code = load_slot(dest, index);

        loop {
            if let Some(result) = self.add_to_chain(code, key, &value) {
                if cas_slot(dest, index, code, result.chain) {
                    if let Some(input) = &result.input {
                        self.alloc.release(input);
                    }
                    return;
                }
                self.roll_back(&result);
            }
            code = load_slot(dest, index);
        }
    }

    fn local_counter(&self) -> Arc<AtomicI64> {
        LOCAL_SIZES.with(|sizes| {
            sizes
                .borrow_mut()
                .entry(self.map_id)
                .or_insert_with(|| {
                    let counter = Arc::new(AtomicI64::new(0));
                    self.counters
                        .lock()
                        .expect("lock poisoned")
                        .push(counter.clone());
                    counter
                })
                .clone()
        })
    }
}

fn load_slot(table: &[AtomicU64], index: usize) -> u64 {
    table
        .get(index)
        .expect("should be in bounds")
        .load(Ordering::Acquire)
}

fn cas_slot(table: &[AtomicU64], index: usize, expected: u64, next: u64) -> bool {
    table
        .get(index)
        .expect("should be in bounds")
        .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn chain_len(code: u64) -> ChainLen {
    let len = wide::length(code);
    if len == wide::MAX_ENCODED_LEN {
        ChainLen::Prefixed
    } else {
        ChainLen::Exact(len)
    }
}

fn chain_len_for(elems: usize) -> ChainLen {
    if elems < wide::MAX_ENCODED_LEN {
        ChainLen::Exact(elems)
    } else {
        ChainLen::Prefixed
    }
}

/// A per-thread, per-call starting slot for the rehash scan.
fn scan_start(len: usize) -> usize {
    let mut hasher = rustc_hash::FxHasher::default();
    std::thread::current().id().hash(&mut hasher);
    SCAN_SALT.with(|salt| {
        let next = salt.get().wrapping_add(1);
        salt.set(next);
        next.hash(&mut hasher);
    });

    #[allow(clippy::cast_possible_truncation)]
    {
        (hasher.finish() % len as u64) as usize
    }
}
