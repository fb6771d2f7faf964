// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Memory-efficient hash maps for primitive keys.
//!
//! ##### About
//!
//! This crate exports chained hash maps that store their entries as
//! delta-compressed, variable-length byte chains inside shared memory arenas
//! ("blocks") instead of individually boxed nodes. All entries that hash to
//! the same bucket are serialized back to back, sorted by key: the first pair
//! in absolute form, every further pair as a delta against its predecessor.
//! The bucket table itself holds one packed integer per bucket - block id,
//! byte offset and chain length squeezed into 32 or 64 bits.
//!
//! For primitive-keyed data this cuts memory overhead to a fraction of a
//! conventional hash map's, at the price of re-encoding a chain on every
//! write. Fill factors above 1 are encouraged; they make chains longer and
//! the compression better.
//!
//! Two map flavors share the storage design:
//!
//! - [`ChainedMap`] for exclusive-owner usage
//! - [`ConcurrentChainedMap`], a lock-free variant whose mutations go through
//!   single-slot CAS, with cooperative incremental rehashing
//!
//! Keys are primitives up to 64 bits (see [`Key`]); values are anything with
//! a [`Serializer`], including variable-length data such as strings.
//!
//! ```
//! use chain_map::Config;
//!
//! let mut map = Config::new().expected_size(1_000).fill_factor(4.0).open::<i64, i64>();
//!
//! for x in 0..1_000 {
//!     map.put(x, x * x);
//! }
//!
//! assert_eq!(map.get(999), Some(999 * 999));
//! assert_eq!(map.len(), 1_000);
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/fjall-rs/chain-map/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/fjall-rs/chain-map/main/logo.png")]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

#[doc(hidden)]
pub type HashMap<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;

macro_rules! unwrap {
    ($x:expr) => {{
        $x.expect("should read")
    }};
}

mod alloc;

mod bucket;

mod chain;

mod concurrent;

mod config;

mod hash;

mod key;

mod map;

mod primes;

mod serializer;

pub use {
    chain::bytes::{ByteReader, ByteWriter},
    concurrent::ConcurrentChainedMap,
    config::{Config, DEFAULT_RECYCLE_BOUND},
    key::Key,
    map::ChainedMap,
    serializer::{DefaultSerializer, Serializer},
};
