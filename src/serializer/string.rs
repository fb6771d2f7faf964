// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{DefaultSerializer, Serializer};
use crate::chain::bytes::{ByteReader, ByteWriter};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

// Strings are stored as a varint byte length followed by the UTF-8 bytes.
// Values are not ordered, so there is no useful delta form; the delta methods
// fall back to the absolute encoding.

impl Serializer<String> for DefaultSerializer<String> {
    fn write(&self, value: &String, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        out.write_u32_varint(value.len() as u32)?;
        out.write_all(value.as_bytes())
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<String> {
        let len = input.read_u32_varint()? as usize;
        let mut buf = vec![0u8; len];
        input.read_exact(&mut buf)?;

        // we only ever read bytes we wrote ourselves, but a lossy conversion
        // keeps a torn byte from turning into a panic
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn write_delta(
        &self,
        _prev: &String,
        cur: &String,
        out: &mut ByteWriter<'_>,
        _sorted: bool,
    ) -> std::io::Result<()> {
        self.write(cur, out)
    }

    fn read_delta(
        &self,
        _prev: &String,
        input: &mut ByteReader<'_>,
        _sorted: bool,
    ) -> std::io::Result<String> {
        self.read(input)
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        let len = input.read_u32_varint()? as usize;
        input.skip(len)
    }

    fn max_length(&self, value: &String) -> usize {
        5 + value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn string_roundtrip() {
        let ser = DefaultSerializer::<String>::default();

        for v in ["", "a", "hello world", "snövit äter äpplen", "\u{1f980}"] {
            let v = v.to_owned();
            let mut data = vec![0u8; ser.max_length(&v)];
            let mut w = ByteWriter::new(&mut data);
            ser.write(&v, &mut w).expect("fits");
            assert!(w.position() <= ser.max_length(&v));

            let mut r = ByteReader::new(&data);
            assert_eq!(ser.read(&mut r).expect("present"), v);
        }
    }

    #[test]
    fn string_skip_consumes_exactly_one_value() {
        let ser = DefaultSerializer::<String>::default();
        let a = "first".to_owned();
        let b = "second".to_owned();

        let mut data = vec![0u8; 32];
        let mut w = ByteWriter::new(&mut data);
        ser.write(&a, &mut w).expect("fits");
        ser.write(&b, &mut w).expect("fits");

        let mut r = ByteReader::new(&data);
        ser.skip(&mut r).expect("present");
        assert_eq!(ser.read(&mut r).expect("present"), b);
    }
}
