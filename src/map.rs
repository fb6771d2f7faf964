// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::alloc::Allocator;
use crate::bucket::{BucketPtr, Buckets, ChainLen};
use crate::chain::bytes::ByteReader;
use crate::chain::{ChainReader, ChainWriter};
use crate::key::Key;
use crate::primes;
use crate::serializer::{DefaultSerializer, Serializer};

// worst case size of a chain's leading element count varint
const COUNT_PREFIX_MAX: usize = 5;

/// A single-threaded compressed hash map.
///
/// Entries live as delta-compressed byte chains inside shared memory blocks,
/// which makes the per-entry overhead a fraction of a conventional hash
/// map's. The bucket table uses `u32` codes until the map outgrows them, so
/// small maps get an even smaller footprint.
///
/// Fill factors above 1.0 are supported and preferred: buckets are chains,
/// not slots, so pushing more entries per bucket trades lookup work for
/// compression. Factors much above 8 make chains long enough that the
/// savings flatten out while every access still pays for the scan.
///
/// # Examples
///
/// ```
/// use chain_map::Config;
///
/// let mut map = Config::new().expected_size(100).open::<i64, i64>();
///
/// assert_eq!(map.put(5, 10), None);
/// assert_eq!(map.get(5), Some(10));
/// assert_eq!(map.put(5, 11), Some(10));
/// assert_eq!(map.remove(5), Some(11));
/// assert_eq!(map.len(), 0);
/// ```
pub struct ChainedMap<K, V, KS = DefaultSerializer<K>, VS = DefaultSerializer<V>> {
    keys: KS,
    values: VS,
    fill_factor: f32,
    buckets: Buckets,
    alloc: Allocator,
    size: u64,
    threshold: u64,
    scratch: Vec<(K, V)>,
}

impl<K, V, KS, VS> ChainedMap<K, V, KS, VS>
where
    K: Key,
    V: Clone,
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    /// Creates a map with explicit serializers.
    ///
    /// `size` is the expected entry count (not a hard cap, and deliberately a
    /// `u64`: with fill factors above 1 a map can hold more entries than the
    /// largest table). `recycle_limit` bounds the bytes of freed blocks kept
    /// for reuse.
    ///
    /// # Panics
    ///
    /// Panics if `fill_factor` is outside `(0.01, 16]`, or if the initial
    /// table cannot be allocated.
    pub fn with_serializers(
        size: u64,
        fill_factor: f32,
        keys: KS,
        values: VS,
        recycle_limit: u64,
    ) -> Self {
        assert!(
            fill_factor > 0.01 && fill_factor <= 16.0,
            "fill factor must be in (0.01, 16]",
        );

        let (capacity, threshold) = primes::capacity_and_threshold(size, fill_factor);
        let buckets = Buckets::new(capacity, false).expect("initial bucket table allocation");

        Self {
            keys,
            values,
            fill_factor,
            buckets,
            alloc: Allocator::new(recycle_limit),
            size: 0,
            threshold,
            scratch: Vec::new(),
        }
    }

    /// Returns the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: K) -> Option<V> {
        let index = key.bucket_index(self.buckets.len());
        let ptr = self.buckets.get(index)?;

        let block = self
            .alloc
            .by_id(ptr.block_id)
            .expect("a published bucket resolves to a live block");

        let mut buf = ByteReader::new(block.bytes());
        buf.set_position(ptr.offset);
        let mut iter = ChainReader::new(&self.keys, &self.values, buf, ptr.len);

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
        None
    }

    /// Inserts or updates an entry, returning the previous value if any.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let index = key.bucket_index(self.buckets.len());
        let (previous, inserted) = self.add_to_chain(index, key, value);
        if inserted {
            self.size += 1;
            self.maybe_grow();
        }
        previous
    }

    /// Removes an entry, returning its value if the key was present.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let index = key.bucket_index(self.buckets.len());
        let ptr = self.buckets.get(index)?;

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();

        let mut found_at = None;
        let chain_bytes;
        {
            let block = self
                .alloc
                .by_id(ptr.block_id)
                .expect("a published bucket resolves to a live block");

            let mut buf = ByteReader::new(block.bytes());
            buf.set_position(ptr.offset);
            let mut iter = ChainReader::new(&self.keys, &self.values, buf, ptr.len);

            while iter.has_next() {
                let (k, v) = iter.advance();
                if found_at.is_none() && k > key {
                    // keys are sorted, no point decoding the rest
                    break;
                }
                if k == key {
                    found_at = Some(scratch.len());
                }
                scratch.push((k, v));
            }
            chain_bytes = iter.position() - ptr.offset;
        }

        let Some(found_at) = found_at else {
            self.scratch = scratch;
            return None;
        };
        let (_, previous) = scratch.remove(found_at);
        self.size -= 1;

        // removing the only entry frees the whole chain
        if scratch.is_empty() {
            self.buckets.clear(index);
            self.alloc.release(ptr.block_id);
            self.scratch = scratch;
            return Some(previous);
        }

        let remaining = scratch.len();

        // a trailing entry of a non-prefixed chain can be dropped by
        // shrinking the length field; the chain bytes stay as they are
        if found_at == remaining && ptr.len != ChainLen::Prefixed {
            self.buckets
                .set(index, ptr.block_id, ptr.offset, ChainLen::Exact(remaining));
            self.scratch = scratch;
            return Some(previous);
        }

        // otherwise rewrite the chain in place; a shorter chain never
        // re-encodes larger, so the old region always fits it
        let sentinel = self.buckets.max_encoded_len();
        let len = chain_len_for(remaining, sentinel);
        {
            let block = self
                .alloc
                .by_id_mut(ptr.block_id)
                .expect("a published bucket resolves to a live block");

            let buf = block.region_writer(ptr.offset, chain_bytes);
            let mut writer = ChainWriter::new(
                &self.keys,
                &self.values,
                buf,
                matches!(len, ChainLen::Prefixed).then_some(remaining),
            );
            for (k, v) in &scratch {
                writer.write_pair(*k, v);
            }
        }
        self.buckets.set(index, ptr.block_id, ptr.offset, len);

        self.scratch = scratch;
        Some(previous)
    }

    /// Number of entries.
    ///
    /// Unlike `std` maps this is a `u64`: with large fill factors the map can
    /// outgrow its maximal table, whose capacity is bounded, without the
    /// entry count being bounded by it.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Merges `(key, value)` into the chain of `index`, publishing the new
    /// chain. Returns the previous value and whether the map grew.
    fn add_to_chain(&mut self, index: usize, key: K, value: V) -> (Option<V>, bool) {
        let entry_len = self.keys.max_length(&key) + self.values.max_length(&value) + 1;

        let Some(ptr) = self.buckets.get(index) else {
            let block_size = self.buckets.block_size(self.alloc.block_count());
            let block = self.alloc.get_block(entry_len, block_size);
            let start = block.pos();
            block.retain();

            let mut writer = ChainWriter::new(&self.keys, &self.values, block.append_writer(), None);
            writer.write_pair(key, &value);
            let written = writer.position();

            let block_id = block.id();
            block.set_pos(start + written);
            self.buckets.set(index, block_id, start, ChainLen::Exact(1));
            return (None, true);
        };

        // decode the whole chain; the scratch buffer is owned by the map, so
        // steady-state puts do not allocate
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();

        let chain_bytes;
        {
            let block = self
                .alloc
                .by_id(ptr.block_id)
                .expect("a published bucket resolves to a live block");

            let mut buf = ByteReader::new(block.bytes());
            buf.set_position(ptr.offset);
            let mut iter = ChainReader::new(&self.keys, &self.values, buf, ptr.len);

            while iter.has_next() {
                let pair = iter.advance();
                scratch.push(pair);
            }
            chain_bytes = iter.position() - ptr.offset;
        }

        // merge, keeping keys sorted
        let mut previous = None;
        match scratch.iter().position(|(k, _)| *k >= key) {
            Some(i) => {
                let entry = scratch.get_mut(i).expect("should be in bounds");
                if entry.0 == key {
                    previous = Some(std::mem::replace(&mut entry.1, value));
                } else {
                    scratch.insert(i, (key, value));
                }
            }
            None => scratch.push((key, value)),
        }
        let inserted = previous.is_none();

        // write the merged chain into a fresh region; worst case is the old
        // bytes plus one new entry plus the deltas it may have widened
        let elems = scratch.len();
        let sentinel = self.buckets.max_encoded_len();
        let len = chain_len_for(elems, sentinel);
        let required = chain_bytes + 2 * entry_len + COUNT_PREFIX_MAX;

        let block_size = self.buckets.block_size(self.alloc.block_count());
        let block = self.alloc.get_block(required, block_size);
        let start = block.pos();
        block.retain();

        let mut writer = ChainWriter::new(
            &self.keys,
            &self.values,
            block.append_writer(),
            matches!(len, ChainLen::Prefixed).then_some(elems),
        );
        for (k, v) in &scratch {
            writer.write_pair(*k, v);
        }
        let written = writer.position();
        debug_assert!(written <= required, "chain outgrew its reserved region");

        let block_id = block.id();
        block.set_pos(start + written);
        self.buckets.set(index, block_id, start, len);
        self.alloc.release(ptr.block_id);

        self.scratch = scratch;
        (previous, inserted)
    }

    fn maybe_grow(&mut self) {
        if self.size <= self.threshold {
            return;
        }

        let multiplier = if self.fill_factor <= 2.0 {
            2u64
        } else {
            self.fill_factor.ceil() as u64
        };

        let mut new_capacity = primes::next_prime(
            ((multiplier * self.threshold) as f64 / f64::from(self.fill_factor)).ceil() as u64,
        );
        // close to the maximal table size, jump straight to it instead of
        // scheduling one more near-useless resize
        if f64::from(new_capacity) * 1.5 > f64::from(primes::max_prime()) {
            new_capacity = primes::max_prime();
        }
        let new_threshold = if new_capacity >= primes::max_prime() {
            u64::MAX
        } else {
            self.threshold * multiplier
        };

        let new_buckets = match Buckets::new(new_capacity as usize, self.buckets.is_wide()) {
            Ok(buckets) => buckets,
            Err(_) => {
                // keep serving at the current capacity instead of failing
                log::warn!(
                    "bucket table allocation failed ({new_capacity} slots); growth disabled",
                );
                self.threshold = u64::MAX;
                return;
            }
        };

        log::debug!(
            "resizing bucket table: {} -> {} slots",
            self.buckets.len(),
            new_capacity,
        );

        let old = std::mem::replace(&mut self.buckets, new_buckets);
        self.threshold = new_threshold;
        self.rehash(&old);
    }

    fn rehash(&mut self, old: &Buckets) {
        let mut pairs = Vec::new();
        for index in 0..old.len() {
            if let Some(ptr) = old.get(index) {
                self.rehash_chain(ptr, &mut pairs);
            }
        }
    }

    fn rehash_chain(&mut self, ptr: BucketPtr, pairs: &mut Vec<(K, V)>) {
        if ptr.len == ChainLen::Exact(1) {
            // single-entry chains can move by pointer alone
            let (k, v) = {
                let block = self
                    .alloc
                    .by_id(ptr.block_id)
                    .expect("a published bucket resolves to a live block");
                let mut buf = ByteReader::new(block.bytes());
                buf.set_position(ptr.offset);
                ChainReader::new(&self.keys, &self.values, buf, ptr.len).advance()
            };

            let index = k.bucket_index(self.buckets.len());
            if self.buckets.get(index).is_none() {
                self.buckets
                    .set(index, ptr.block_id, ptr.offset, ChainLen::Exact(1));
            } else {
                self.add_to_chain(index, k, v);
                self.alloc.release(ptr.block_id);
            }
            return;
        }

        pairs.clear();
        {
            let block = self
                .alloc
                .by_id(ptr.block_id)
                .expect("a published bucket resolves to a live block");
            let mut buf = ByteReader::new(block.bytes());
            buf.set_position(ptr.offset);
            let mut iter = ChainReader::new(&self.keys, &self.values, buf, ptr.len);
            while iter.has_next() {
                let pair = iter.advance();
                pairs.push(pair);
            }
        }

        for (k, v) in pairs.drain(..) {
            let index = k.bucket_index(self.buckets.len());
            self.add_to_chain(index, k, v);
        }
        self.alloc.release(ptr.block_id);
    }
}

fn chain_len_for(elems: usize, sentinel: usize) -> ChainLen {
    if elems < sentinel {
        ChainLen::Exact(elems)
    } else {
        ChainLen::Prefixed
    }
}
