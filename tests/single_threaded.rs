use chain_map::{ByteReader, ByteWriter, Config, DefaultSerializer, Key, Serializer};
use std::cell::Cell;
use std::rc::Rc;
use test_log::test;

const FILL_FACTORS: [f32; 6] = [0.25, 0.5, 1.0, 2.0, 5.0, 16.0];
const SIZE: i64 = 10_000;

#[test]
fn put_then_get() {
    for ff in FILL_FACTORS {
        let mut map = Config::new().expected_size(100).fill_factor(ff).open::<i64, i64>();

        for x in 0..SIZE {
            assert_eq!(map.put(x, x), None, "ff = {ff}");
            assert_eq!(map.len(), (x + 1) as u64, "ff = {ff}");
            assert_eq!(map.get(x), Some(x), "ff = {ff}");
        }

        assert_eq!(map.len(), SIZE as u64);
        for x in 0..SIZE {
            assert_eq!(map.get(x), Some(x), "ff = {ff}");
        }
    }
}

#[test]
fn put_negative_keys() {
    for ff in FILL_FACTORS {
        let mut map = Config::new().expected_size(100).fill_factor(ff).open::<i64, i64>();

        for x in 0..SIZE {
            map.put(-x, -x);
            assert_eq!(map.get(-x), Some(-x), "ff = {ff}");
        }

        assert_eq!(map.len(), SIZE as u64);
        for x in 0..SIZE {
            assert_eq!(map.get(-x), Some(-x), "ff = {ff}");
        }
    }
}

#[test]
fn put_then_update() {
    for ff in FILL_FACTORS {
        let mut map = Config::new().expected_size(100).fill_factor(ff).open::<i64, i64>();

        for x in 0..SIZE {
            map.put(x, x);
        }
        for x in 0..SIZE {
            assert_eq!(map.put(x, x + 1), Some(x), "ff = {ff}");
            assert_eq!(map.len(), SIZE as u64, "ff = {ff}");
        }
        for x in 0..SIZE {
            assert_eq!(map.get(x), Some(x + 1), "ff = {ff}");
        }
    }
}

#[test]
fn put_random_keys() {
    use rand::seq::SliceRandom;

    let mut keys: Vec<i64> = (0..SIZE).map(|x| x * 17 - SIZE).collect();
    keys.shuffle(&mut rand::rng());

    for ff in [0.5, 2.0, 16.0] {
        let mut map = Config::new().expected_size(100).fill_factor(ff).open::<i64, i64>();

        for (i, k) in keys.iter().enumerate() {
            assert_eq!(map.put(*k, !*k), None);
            assert_eq!(map.len(), (i + 1) as u64);
        }
        for k in &keys {
            assert_eq!(map.get(*k), Some(!*k), "ff = {ff}");
        }
    }
}

#[test]
fn remove_and_reinsert() {
    for ff in FILL_FACTORS {
        let mut map = Config::new().expected_size(100).fill_factor(ff).open::<i64, i64>();

        for x in 0..SIZE {
            map.put(x, x);
        }

        // remove odd keys
        for x in (1..SIZE).step_by(2) {
            assert_eq!(map.remove(x), Some(x), "ff = {ff}");
        }
        assert_eq!(map.len(), (SIZE / 2) as u64);

        for x in 0..SIZE {
            let expected = (x % 2 == 0).then_some(x);
            assert_eq!(map.get(x), expected, "ff = {ff}");
        }

        for x in (1..SIZE).step_by(2) {
            assert_eq!(map.put(x, x), None, "ff = {ff}");
        }
        assert_eq!(map.len(), SIZE as u64);
    }
}

#[test]
fn remove_absent_key_is_a_no_op() {
    let mut map = Config::new().expected_size(100).open::<i64, i64>();

    assert_eq!(map.remove(5), None);
    assert_eq!(map.len(), 0);

    map.put(5, 55);
    assert_eq!(map.remove(6), None);
    assert_eq!(map.remove(-5), None);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(5), Some(55));
}

#[test]
fn growth_from_minimal_capacity() {
    let mut map = Config::new().expected_size(1).fill_factor(1.0).open::<i64, i64>();

    for x in 0..SIZE {
        map.put(x, x * 2);
    }

    assert_eq!(map.len(), SIZE as u64);
    for x in 0..SIZE {
        assert_eq!(map.get(x), Some(x * 2));
    }
}

#[test]
fn string_values() {
    let mut map = Config::new().expected_size(100).fill_factor(2.0).open::<i64, String>();

    let mut expected = vec![];
    for x in 0..1_000i64 {
        let value = nanoid::nanoid!();
        map.put(x, value.clone());
        expected.push(value);
    }

    for (x, value) in expected.iter().enumerate() {
        assert_eq!(map.get(x as i64).as_deref(), Some(value.as_str()));
    }
}

// the example scenario: put / update / get / remove on one key
#[test]
fn single_key_lifecycle() {
    let mut map = Config::new().expected_size(100).fill_factor(1.0).open::<i64, String>();

    assert_eq!(map.put(5, "a".to_owned()), None);
    assert_eq!(map.len(), 1);

    assert_eq!(map.put(5, "b".to_owned()).as_deref(), Some("a"));
    assert_eq!(map.len(), 1);

    assert_eq!(map.get(5).as_deref(), Some("b"));

    assert_eq!(map.remove(5).as_deref(), Some("b"));
    assert_eq!(map.len(), 0);
    assert_eq!(map.get(5), None);
}

#[test]
fn float_keys_and_values() {
    let mut map = Config::new().expected_size(100).fill_factor(2.0).open::<f64, f32>();

    for x in 0..1_000 {
        let key = f64::from(x) * 0.25;
        map.put(key, x as f32);
    }

    for x in 0..1_000 {
        let key = f64::from(x) * 0.25;
        assert_eq!(map.get(key), Some(x as f32));
    }
}

/// Finds `count` ascending keys that land in the same bucket of a table with
/// `capacity` slots, starting the probe at `from`.
fn colliding_keys(capacity: usize, bucket: usize, from: i64, count: usize) -> Vec<i64> {
    (from..)
        .filter(|k| k.bucket_index(capacity) == bucket)
        .take(count)
        .collect()
}

#[test]
fn chains_longer_than_the_length_field() {
    // size 100 @ ff 1.0 = 103 buckets, growth at 100 entries; 10 colliding
    // keys overflow the narrow length field (max 6) without triggering growth
    let mut map = Config::new().expected_size(100).fill_factor(1.0).open::<i64, i64>();

    let keys = colliding_keys(103, 0, 0, 10);
    for k in &keys {
        map.put(*k, *k + 1);
    }

    assert_eq!(map.len(), 10);
    for k in &keys {
        assert_eq!(map.get(*k), Some(*k + 1));
    }

    // removing from a count-prefixed chain rewrites it correctly
    let middle = keys[4];
    assert_eq!(map.remove(middle), Some(middle + 1));
    assert_eq!(map.get(middle), None);
    for k in keys.iter().filter(|k| **k != middle) {
        assert_eq!(map.get(*k), Some(*k + 1));
    }
}

#[test]
fn oversized_values_migrate_the_table_to_wide_codes() {
    let mut map = Config::new().expected_size(100).fill_factor(1.0).open::<i64, String>();

    // a count-prefixed chain, which must survive sentinel translation
    let keys = colliding_keys(103, 0, 0, 8);
    for k in &keys {
        map.put(*k, format!("v{k}"));
    }

    // values beyond the narrow encoding's 4 KiB block size force an
    // oversized block; rewriting the chain inside it leaves the append
    // cursor past what 12 bits can address, so the next chain lands at an
    // offset the narrow codes cannot express
    let big = "x".repeat(4_500);
    map.put(1_000_003, "y".repeat(4_500));
    map.put(1_000_003, big.clone());
    map.put(1_000_007, "small".to_owned());
    map.put(1_000_033, "smaller".to_owned());

    assert_eq!(map.get(1_000_003), Some(big));
    assert_eq!(map.get(1_000_007).as_deref(), Some("small"));
    assert_eq!(map.get(1_000_033).as_deref(), Some("smaller"));

    // everything stored before the migration is intact
    for k in &keys {
        assert_eq!(map.get(*k), Some(format!("v{k}")));
    }

    // and the map still behaves after it
    for x in 0..1_000i64 {
        map.put(x + 2_000_000, format!("post{x}"));
    }
    for x in 0..1_000i64 {
        assert_eq!(map.get(x + 2_000_000), Some(format!("post{x}")));
    }
}

/// A serializer that counts how many values it decodes; lets tests observe
/// how far a chain scan actually went.
#[derive(Clone, Default)]
struct CountingI64 {
    inner: DefaultSerializer<i64>,
    reads: Rc<Cell<usize>>,
}

impl Serializer<i64> for CountingI64 {
    fn write(&self, value: &i64, out: &mut ByteWriter<'_>) -> std::io::Result<()> {
        self.inner.write(value, out)
    }

    fn read(&self, input: &mut ByteReader<'_>) -> std::io::Result<i64> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read(input)
    }

    fn write_delta(
        &self,
        prev: &i64,
        cur: &i64,
        out: &mut ByteWriter<'_>,
        sorted: bool,
    ) -> std::io::Result<()> {
        self.inner.write_delta(prev, cur, out, sorted)
    }

    fn read_delta(
        &self,
        prev: &i64,
        input: &mut ByteReader<'_>,
        sorted: bool,
    ) -> std::io::Result<i64> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read_delta(prev, input, sorted)
    }

    fn skip(&self, input: &mut ByteReader<'_>) -> std::io::Result<()> {
        self.inner.skip(input)
    }

    fn max_length(&self, value: &i64) -> usize {
        self.inner.max_length(value)
    }
}

#[test]
fn sorted_chains_short_circuit_lookups() {
    let keys = CountingI64::default();
    let key_reads = keys.reads.clone();

    // size 1 @ ff 16 = 5 buckets and no growth below 64 entries
    let mut map = Config::new()
        .expected_size(1)
        .fill_factor(16.0)
        .open_with::<i64, i64, _, _>(keys, DefaultSerializer::default());

    // one bucket: store every other colliding key, so the gaps leave bucket-0
    // keys that are absent from the chain, plus a far-away sentinel key
    let candidates = colliding_keys(5, 0, 0, 16);
    let mut keys: Vec<i64> = candidates.iter().copied().step_by(2).collect();
    let sentinel = colliding_keys(5, 0, 1 << 40, 1)[0];
    keys.push(sentinel);

    for k in &keys {
        map.put(*k, 0);
    }

    // probe an unstored key between the 2nd and 3rd stored key
    let probe = candidates[3];
    assert!(keys[1] < probe && probe < keys[2]);

    key_reads.set(0);
    assert_eq!(map.get(probe), None);

    // the scan must stop at the first key greater than the probe instead of
    // decoding all 9 entries
    assert_eq!(key_reads.get(), 3);
}

#[test]
fn len_is_exact_for_single_threaded_maps() {
    let mut map = Config::new().expected_size(10).open::<i64, i64>();
    assert!(map.is_empty());

    map.put(1, 1);
    map.put(2, 2);
    map.put(2, 3);
    assert_eq!(map.len(), 2);

    map.remove(1);
    map.remove(1);
    assert_eq!(map.len(), 1);
    assert!(!map.is_empty());
}

#[test]
#[should_panic(expected = "fill factor")]
fn rejects_fill_factor_above_16() {
    let _ = Config::new().fill_factor(16.5).open::<i64, i64>();
}

#[test]
#[should_panic(expected = "fill factor")]
fn rejects_tiny_fill_factor() {
    let _ = Config::new().fill_factor(0.01).open::<i64, i64>();
}
