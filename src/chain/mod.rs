// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod bytes;

use crate::bucket::ChainLen;
use crate::serializer::Serializer;
use bytes::{ByteReader, ByteWriter};
use varint_rs::{VarintReader, VarintWriter};

/// Streaming decoder for one chain.
///
/// A chain is a key-sorted run of pairs: the first pair is stored in absolute
/// form, every further pair as deltas against its predecessor. If the bucket
/// code says [`ChainLen::Prefixed`], the element count sits as a varint in
/// front of the first pair and is consumed on construction.
pub struct ChainReader<'a, K, V, KS, VS> {
    keys: &'a KS,
    values: &'a VS,
    buf: ByteReader<'a>,
    elems: usize,
    cur: usize,
    prev: Option<(K, V)>,
}

impl<'a, K, V, KS, VS> ChainReader<'a, K, V, KS, VS>
where
    K: Copy,
    V: Clone,
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    /// Starts decoding at the reader's current position.
    pub fn new(keys: &'a KS, values: &'a VS, mut buf: ByteReader<'a>, len: ChainLen) -> Self {
        let elems = match len {
            ChainLen::Exact(n) => n,
            ChainLen::Prefixed => unwrap!(buf.read_u32_varint()) as usize,
        };

        Self {
            keys,
            values,
            buf,
            elems,
            cur: 0,
            prev: None,
        }
    }

    /// Rewinds to a saved byte offset and starts over (a chain that was
    /// scanned with [`ChainReader::skip`] must be restarted before it can be
    /// decoded).
    pub fn restart(&mut self, offset: usize, len: ChainLen) {
        self.buf.set_position(offset);
        self.elems = match len {
            ChainLen::Exact(n) => n,
            ChainLen::Prefixed => unwrap!(self.buf.read_u32_varint()) as usize,
        };
        self.cur = 0;
        self.prev = None;
    }

    /// Whether any entries are left.
    pub fn has_next(&self) -> bool {
        self.cur < self.elems
    }

    /// Decodes the next pair.
    pub fn advance(&mut self) -> (K, V) {
        let (k, v) = if let Some((pk, pv)) = &self.prev {
            let k = unwrap!(self.keys.read_delta(pk, &mut self.buf, true));
            let v = unwrap!(self.values.read_delta(pv, &mut self.buf, false));
            (k, v)
        } else {
            let k = unwrap!(self.keys.read(&mut self.buf));
            let v = unwrap!(self.values.read(&mut self.buf));
            (k, v)
        };

        self.cur += 1;
        self.prev = Some((k, v.clone()));
        (k, v)
    }

    /// Skips over the next pair without decoding it.
    ///
    /// Only useful for measuring a chain's byte length; interleaving `skip`
    /// and [`ChainReader::advance`] would corrupt the delta base, so restart
    /// before decoding.
    pub fn skip(&mut self) {
        unwrap!(self.keys.skip(&mut self.buf));
        unwrap!(self.values.skip(&mut self.buf));
        self.cur += 1;
    }

    /// Number of entries in this chain.
    pub fn elems(&self) -> usize {
        self.elems
    }

    /// Byte position of the underlying reader.
    pub fn position(&self) -> usize {
        self.buf.position()
    }
}

/// Streaming encoder for one chain; the exact counterpart of [`ChainReader`].
pub struct ChainWriter<'a, K, V, KS, VS> {
    keys: &'a KS,
    values: &'a VS,
    buf: ByteWriter<'a>,
    prev: Option<(K, V)>,
}

impl<'a, K, V, KS, VS> ChainWriter<'a, K, V, KS, VS>
where
    K: Copy,
    V: Clone,
    KS: Serializer<K>,
    VS: Serializer<V>,
{
    /// Starts encoding at the writer's current position.
    ///
    /// `prefixed_count` carries the element count to embed in front of the
    /// first pair, for chains too long for the bucket code's length field.
    pub fn new(
        keys: &'a KS,
        values: &'a VS,
        mut buf: ByteWriter<'a>,
        prefixed_count: Option<usize>,
    ) -> Self {
        if let Some(count) = prefixed_count {
            #[allow(clippy::cast_possible_truncation)]
            buf.write_u32_varint(count as u32)
                .expect("chain region is sized to fit");
        }

        Self {
            keys,
            values,
            buf,
            prev: None,
        }
    }

    /// Appends a pair. Keys must arrive in strictly ascending order.
    pub fn write_pair(&mut self, key: K, value: &V) {
        if let Some((pk, pv)) = &self.prev {
            // keys are sorted, so the key delta may be unsigned; values are
            // not, so their delta stays signed
            self.keys
                .write_delta(pk, &key, &mut self.buf, true)
                .expect("chain region is sized to fit");
            self.values
                .write_delta(pv, value, &mut self.buf, false)
                .expect("chain region is sized to fit");
        } else {
            self.keys
                .write(&key, &mut self.buf)
                .expect("chain region is sized to fit");
            self.values
                .write(value, &mut self.buf)
                .expect("chain region is sized to fit");
        }

        self.prev = Some((key, value.clone()));
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.position()
    }
}
