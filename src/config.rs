// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::key::Key;
use crate::serializer::{DefaultSerializer, Serializer};
use crate::{ChainedMap, ConcurrentChainedMap};

/// Default bound on the bytes of freed blocks kept for reuse (single-threaded
/// maps only). Raise it if you want close to zero allocator traffic once the
/// map size stabilizes.
pub const DEFAULT_RECYCLE_BOUND: u64 = 32 * 1_024;

const DEFAULT_FILL_FACTOR: f32 = 2.0;

/// Map configuration.
///
/// The entry point for creating maps without binding yourself to concrete
/// serializer types.
///
/// # Examples
///
/// ```
/// use chain_map::Config;
///
/// let mut compact = Config::new()
///     .expected_size(10_000)
///     .fill_factor(8.0)
///     .open::<i32, f64>();
///
/// compact.put(1, 0.5);
/// assert_eq!(compact.get(1), Some(0.5));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    expected_size: u64,
    fill_factor: f32,
    recycle_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expected_size: 16,
            fill_factor: DEFAULT_FILL_FACTOR,
            recycle_limit: DEFAULT_RECYCLE_BOUND,
        }
    }
}

impl Config {
    /// Initializes a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected number of entries.
    ///
    /// This is a sizing hint, not a cap; maps grow past it. It may exceed the
    /// 32-bit range: with fill factors above 1 a map holds more entries than
    /// its largest possible table has slots.
    #[must_use]
    pub fn expected_size(mut self, size: u64) -> Self {
        self.expected_size = size;
        self
    }

    /// Sets the target ratio of entries to bucket-table slots.
    ///
    /// Factors above 1.0 are supported and preferred for these maps: entries
    /// live off-table in chains, so a fuller table means longer chains and
    /// better compression, paid for with longer scans. Below 1.0 the map may
    /// use more memory than a conventional hash map.
    ///
    /// Valid range is `(0.01, 16]`; opening a map with a factor outside it
    /// panics.
    #[must_use]
    pub fn fill_factor(mut self, fill_factor: f32) -> Self {
        self.fill_factor = fill_factor;
        self
    }

    /// Sets the bound, in bytes, on freed blocks the single-threaded map
    /// keeps around for reuse.
    #[must_use]
    pub fn recycle_limit(mut self, bytes: u64) -> Self {
        self.recycle_limit = bytes;
        self
    }

    /// Opens a single-threaded map using the default serializers.
    #[must_use]
    pub fn open<K, V>(&self) -> ChainedMap<K, V>
    where
        K: Key,
        V: Clone,
        DefaultSerializer<K>: Serializer<K>,
        DefaultSerializer<V>: Serializer<V>,
    {
        self.open_with(DefaultSerializer::default(), DefaultSerializer::default())
    }

    /// Opens a single-threaded map with explicit serializers.
    #[must_use]
    pub fn open_with<K, V, KS, VS>(&self, keys: KS, values: VS) -> ChainedMap<K, V, KS, VS>
    where
        K: Key,
        V: Clone,
        KS: Serializer<K>,
        VS: Serializer<V>,
    {
        ChainedMap::with_serializers(
            self.expected_size,
            self.fill_factor,
            keys,
            values,
            self.recycle_limit,
        )
    }

    /// Opens a concurrent map using the default serializers.
    #[must_use]
    pub fn open_concurrent<K, V>(&self) -> ConcurrentChainedMap<K, V>
    where
        K: Key,
        V: Clone,
        DefaultSerializer<K>: Serializer<K>,
        DefaultSerializer<V>: Serializer<V>,
    {
        self.open_concurrent_with(DefaultSerializer::default(), DefaultSerializer::default())
    }

    /// Opens a concurrent map with explicit serializers.
    #[must_use]
    pub fn open_concurrent_with<K, V, KS, VS>(
        &self,
        keys: KS,
        values: VS,
    ) -> ConcurrentChainedMap<K, V, KS, VS>
    where
        K: Key,
        V: Clone,
        KS: Serializer<K>,
        VS: Serializer<V>,
    {
        ConcurrentChainedMap::with_serializers(self.expected_size, self.fill_factor, keys, values)
    }
}
