// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{skip_varint, DefaultSerializer, Serializer};
use crate::chain::bytes::{ByteReader, ByteWriter};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use varint_rs::{VarintReader, VarintWriter};

// The integer serializers store absolute values as zigzag'd varints and
// deltas either as a plain unsigned varint (sorted, so strictly positive) or
// zigzag'd again. Delta arithmetic wraps; the modular difference always
// round-trips.

// Zigzag folds the sign into the low bit so small negative numbers stay
// small on the wire (otherwise they would always cost the full 5/10 bytes).

fn zigzag32(v: i32) -> u32 {
    #[allow(clippy::cast_sign_loss)]
    {
        ((v << 1) ^ (v >> 31)) as u32
    }
}

fn unzigzag32(v: u32) -> i32 {
    #[allow(clippy::cast_possible_wrap)]
    {
        ((v >> 1) as i32) ^ -((v & 1) as i32)
    }
}

fn zigzag64(v: i64) -> u64 {
    #[allow(clippy::cast_sign_loss)]
    {
        ((v << 1) ^ (v >> 63)) as u64
    }
}

fn unzigzag64(v: u64) -> i64 {
    #[allow(clippy::cast_possible_wrap)]
    {
        ((v >> 1) as i64) ^ -((v & 1) as i64)
    }
}

impl Serializer<i32> for DefaultSerializer<i32> {
    fn write(&self, value: &i32, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        out.write_u32_varint(zigzag32(*value))
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<i32> {
        Ok(unzigzag32(input.read_u32_varint()?))
    }

    fn write_delta(
        &self,
        prev: &i32,
        cur: &i32,
        out: &mut ByteWriter<'_>,
        sorted: bool,
    ) -> std::io::Result<()> {
        let delta = cur.wrapping_sub(*prev);
        if sorted {
            #[allow(clippy::cast_sign_loss)]
            out.write_u32_varint(delta as u32)
        } else {
            out.write_u32_varint(zigzag32(delta))
        }
    }

    fn read_delta(
        &self,
        prev: &i32,
        input: &mut ByteReader<'_>,
        sorted: bool,
    ) -> std::io::Result<i32> {
        let delta = if sorted {
            #[allow(clippy::cast_possible_wrap)]
            {
                input.read_u32_varint()? as i32
            }
        } else {
            unzigzag32(input.read_u32_varint()?)
        };
        Ok(prev.wrapping_add(delta))
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        skip_varint(input)
    }

    fn max_length(&self, _: &i32) -> usize {
        5
    }
}

impl Serializer<u32> for DefaultSerializer<u32> {
    fn write(&self, value: &u32, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        out.write_u32_varint(*value)
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<u32> {
        input.read_u32_varint()
    }

    fn write_delta(
        &self,
        prev: &u32,
        cur: &u32,
        out: &mut ByteWriter<'_>,
        sorted: bool,
    ) -> std::io::Result<()> {
        let delta = cur.wrapping_sub(*prev);
        if sorted {
            out.write_u32_varint(delta)
        } else {
            #[allow(clippy::cast_possible_wrap)]
            out.write_u32_varint(zigzag32(delta as i32))
        }
    }

    fn read_delta(
        &self,
        prev: &u32,
        input: &mut ByteReader<'_>,
        sorted: bool,
    ) -> std::io::Result<u32> {
        let delta = if sorted {
            input.read_u32_varint()?
        } else {
            #[allow(clippy::cast_sign_loss)]
            {
                unzigzag32(input.read_u32_varint()?) as u32
            }
        };
        Ok(prev.wrapping_add(delta))
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        skip_varint(input)
    }

    fn max_length(&self, _: &u32) -> usize {
        5
    }
}

impl Serializer<i64> for DefaultSerializer<i64> {
    fn write(&self, value: &i64, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        out.write_u64_varint(zigzag64(*value))
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<i64> {
        Ok(unzigzag64(input.read_u64_varint()?))
    }

    fn write_delta(
        &self,
        prev: &i64,
        cur: &i64,
        out: &mut ByteWriter<'_>,
        sorted: bool,
    ) -> std::io::Result<()> {
        let delta = cur.wrapping_sub(*prev);
        if sorted {
            #[allow(clippy::cast_sign_loss)]
            out.write_u64_varint(delta as u64)
        } else {
            out.write_u64_varint(zigzag64(delta))
        }
    }

    fn read_delta(
        &self,
        prev: &i64,
        input: &mut ByteReader<'_>,
        sorted: bool,
    ) -> std::io::Result<i64> {
        let delta = if sorted {
            #[allow(clippy::cast_possible_wrap)]
            {
                input.read_u64_varint()? as i64
            }
        } else {
            unzigzag64(input.read_u64_varint()?)
        };
        Ok(prev.wrapping_add(delta))
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        skip_varint(input)
    }

    fn max_length(&self, _: &i64) -> usize {
        10
    }
}

impl Serializer<u64> for DefaultSerializer<u64> {
    fn write(&self, value: &u64, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        out.write_u64_varint(*value)
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<u64> {
        input.read_u64_varint()
    }

    fn write_delta(
        &self,
        prev: &u64,
        cur: &u64,
        out: &mut ByteWriter<'_>,
        sorted: bool,
    ) -> std::io::Result<()> {
        let delta = cur.wrapping_sub(*prev);
        if sorted {
            out.write_u64_varint(delta)
        } else {
            #[allow(clippy::cast_possible_wrap)]
            out.write_u64_varint(zigzag64(delta as i64))
        }
    }

    fn read_delta(
        &self,
        prev: &u64,
        input: &mut ByteReader<'_>,
        sorted: bool,
    ) -> std::io::Result<u64> {
        let delta = if sorted {
            input.read_u64_varint()?
        } else {
            #[allow(clippy::cast_sign_loss)]
            {
                unzigzag64(input.read_u64_varint()?) as u64
            }
        };
        Ok(prev.wrapping_add(delta))
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        skip_varint(input)
    }

    fn max_length(&self, _: &u64) -> usize {
        10
    }
}

// Floats store their raw bits fixed-width; delta-compressing bit patterns
// buys nothing, so the delta form is just the absolute form.

impl Serializer<f32> for DefaultSerializer<f32> {
    fn write(&self, value: &f32, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        out.write_f32::<LittleEndian>(*value)
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<f32> {
        input.read_f32::<LittleEndian>()
    }

    fn write_delta(
        &self,
        _prev: &f32,
        cur: &f32,
        out: &mut ByteWriter<'_>,
        _sorted: bool,
    ) -> std::io::Result<()> {
        self.write(cur, out)
    }

    fn read_delta(
        &self,
        _prev: &f32,
        input: &mut ByteReader<'_>,
        _sorted: bool,
    ) -> std::io::Result<f32> {
        self.read(input)
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        input.skip(4)
    }

    fn max_length(&self, _: &f32) -> usize {
        4
    }
}

impl Serializer<f64> for DefaultSerializer<f64> {
    fn write(&self, value: &f64, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        out.write_f64::<LittleEndian>(*value)
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<f64> {
        input.read_f64::<LittleEndian>()
    }

    fn write_delta(
        &self,
        _prev: &f64,
        cur: &f64,
        out: &mut ByteWriter<'_>,
        _sorted: bool,
    ) -> std::io::Result<()> {
        self.write(cur, out)
    }

    fn read_delta(
        &self,
        _prev: &f64,
        input: &mut ByteReader<'_>,
        _sorted: bool,
    ) -> std::io::Result<f64> {
        self.read(input)
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        input.skip(8)
    }

    fn max_length(&self, _: &f64) -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn roundtrip<T, S: Serializer<T>>(ser: &S, value: &T) -> T {
        let mut data = vec![0u8; 16];
        let mut w = ByteWriter::new(&mut data);
        ser.write(value, &mut w).expect("fits");
        assert!(w.position() <= ser.max_length(value));

        let mut r = ByteReader::new(&data);
        ser.read(&mut r).expect("present")
    }

    fn roundtrip_delta<T, S: Serializer<T>>(ser: &S, prev: &T, cur: &T, sorted: bool) -> T {
        let mut data = vec![0u8; 16];
        let mut w = ByteWriter::new(&mut data);
        ser.write_delta(prev, cur, &mut w, sorted).expect("fits");
        assert!(w.position() <= ser.max_length(cur));

        let mut r = ByteReader::new(&data);
        ser.read_delta(prev, &mut r, sorted).expect("present")
    }

    #[test]
    fn zigzag_is_the_protobuf_mapping() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag32(-2), 3);
        assert_eq!(zigzag64(i64::MIN), u64::MAX);

        for v in [0i64, -1, 1, i64::MIN, i64::MAX, 123_456, -987_654_321] {
            assert_eq!(unzigzag64(zigzag64(v)), v);
        }
        for v in [0i32, -1, 1, i32::MIN, i32::MAX, 40_000, -40_000] {
            assert_eq!(unzigzag32(zigzag32(v)), v);
        }
    }

    #[test]
    fn int_absolute_roundtrip() {
        let ser = DefaultSerializer::<i64>::default();
        for v in [0i64, 1, -1, 127, -128, i64::MAX, i64::MIN, 1 << 40] {
            assert_eq!(roundtrip(&ser, &v), v);
        }
    }

    #[test]
    fn small_magnitudes_encode_small() {
        let ser = DefaultSerializer::<i64>::default();
        let mut data = vec![0u8; 16];
        let mut w = ByteWriter::new(&mut data);
        ser.write(&-3, &mut w).expect("fits");
        assert_eq!(w.position(), 1);
    }

    #[test]
    fn int_sorted_delta_roundtrip() {
        let ser = DefaultSerializer::<i64>::default();
        for (prev, cur) in [(0i64, 1i64), (-5, 3), (i64::MIN, i64::MAX), (100, 101)] {
            assert_eq!(roundtrip_delta(&ser, &prev, &cur, true), cur);
        }
    }

    #[test]
    fn int_unsorted_delta_roundtrip() {
        let ser = DefaultSerializer::<i32>::default();
        for (prev, cur) in [(10i32, 3i32), (0, -1), (i32::MAX, i32::MIN), (-7, -7)] {
            assert_eq!(roundtrip_delta(&ser, &prev, &cur, false), cur);
        }
    }

    #[test]
    fn unsigned_delta_roundtrip() {
        let ser = DefaultSerializer::<u64>::default();
        for (prev, cur) in [(0u64, 1u64), (10, 3), (u64::MAX, 0), (7, 7)] {
            assert_eq!(roundtrip_delta(&ser, &prev, &cur, false), cur);
        }
        for (prev, cur) in [(0u64, 1u64), (3, 10), (0, u64::MAX)] {
            assert_eq!(roundtrip_delta(&ser, &prev, &cur, true), cur);
        }
    }

    #[test]
    fn skip_consumes_exactly_one_value() {
        let ser = DefaultSerializer::<u64>::default();
        let mut data = vec![0u8; 32];
        let mut w = ByteWriter::new(&mut data);
        ser.write(&300, &mut w).expect("fits");
        ser.write(&7, &mut w).expect("fits");

        let mut r = ByteReader::new(&data);
        ser.skip(&mut r).expect("present");
        assert_eq!(ser.read(&mut r).expect("present"), 7);
    }

    #[test]
    fn float_roundtrip() {
        let ser = DefaultSerializer::<f64>::default();
        for v in [0.0f64, -0.0, 1.5, f64::MIN_POSITIVE, f64::MAX, -123.456] {
            assert_eq!(roundtrip(&ser, &v).to_bits(), v.to_bits());
        }
    }
}
