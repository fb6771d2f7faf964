// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod primitive;
mod string;

use crate::chain::bytes::{ByteReader, ByteWriter};
use byteorder::ReadBytesExt;
use std::marker::PhantomData;

/// (De)serialization logic for map keys and values.
///
/// Implementing this yourself can buy extra storage savings when you know
/// special properties of your data, like values being non-negative or drawn
/// from a small range.
///
/// Chains store the first entry in absolute form and every further entry as a
/// delta against its predecessor, which is what the `*_delta` methods are
/// for. `sorted == true` promises the delta is strictly positive (keys are
/// strictly ascending), so it may be encoded unsigned; `sorted == false`
/// requires a signed encoding.
pub trait Serializer<T> {
    /// Writes a value in absolute form.
    ///
    /// Invariant: a value written by `write` and read back by `read` must
    /// compare equal to the original.
    ///
    /// # Errors
    ///
    /// Fails if the output region is exhausted, which callers prevent by
    /// sizing regions with [`Serializer::max_length`].
    fn write(&self, value: &T, out: &mut ByteWriter<'_>) -> std::io::Result<()>;

    /// Reads a value previously written by [`Serializer::write`].
    ///
    /// # Errors
    ///
    /// Fails if the region ends prematurely.
    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<T>;

    /// Writes `cur` as a delta against `prev`.
    ///
    /// # Errors
    ///
    /// Fails if the output region is exhausted.
    fn write_delta(
        &self,
        prev: &T,
        cur: &T,
        out: &mut ByteWriter<'_>,
        sorted: bool,
    ) -> std::io::Result<()>;

    /// Reads a value previously written by [`Serializer::write_delta`].
    ///
    /// # Errors
    ///
    /// Fails if the region ends prematurely.
    fn read_delta(&self, prev: &T, input: &mut ByteReader<'_>, sorted: bool)
        -> std::io::Result<T>;

    /// Skips one encoded value without materializing it.
    ///
    /// # Errors
    ///
    /// Fails if the region ends prematurely.
    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()>;

    /// Upper bound on the encoded size of `value`, absolute or delta form.
    ///
    /// Used to reserve arena space before writing. Returning too little is a
    /// correctness bug; returning slightly too much merely wastes a few
    /// bytes.
    fn max_length(&self, value: &T) -> usize;
}

/// The built-in serializer family.
///
/// Covers the primitive key/value types (varint with zigzag deltas for the
/// integers, fixed-width bits for the floats) and `String` values (varint
/// length prefix + UTF-8 bytes).
pub struct DefaultSerializer<T>(PhantomData<T>);

impl<T> Default for DefaultSerializer<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Clone for DefaultSerializer<T> {
    fn clone(&self) -> Self {
        Self(PhantomData)
    }
}

impl<T> Copy for DefaultSerializer<T> {}

impl<T> std::fmt::Debug for DefaultSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DefaultSerializer")
    }
}

/// Skips one varint, however many bytes it spans.
pub(crate) fn skip_varint(input: &mut ByteReader<'_>) -> std::io::Result<()> {
    loop {
        if input.read_u8()? & 0x80 == 0 {
            return Ok(());
        }
    }
}
