use chain_map::Config;
use criterion::{criterion_group, criterion_main, Criterion};

fn map_get_hit(c: &mut Criterion) {
    let mut map = Config::new()
        .expected_size(1_000_000)
        .fill_factor(4.0)
        .open::<i64, i64>();

    for x in 0..1_000_000 {
        map.put(x, !x);
    }

    c.bench_function("map get", |b| {
        let mut x = 0;
        b.iter(|| {
            x = (x + 7_919) % 1_000_000;
            assert_eq!(map.get(x), Some(!x));
        });
    });
}

fn map_get_miss(c: &mut Criterion) {
    let mut map = Config::new()
        .expected_size(1_000_000)
        .fill_factor(4.0)
        .open::<i64, i64>();

    for x in 0..1_000_000 {
        map.put(x, !x);
    }

    c.bench_function("map get miss", |b| {
        let mut x = 0;
        b.iter(|| {
            x = (x + 7_919) % 1_000_000;
            assert_eq!(map.get(x + 2_000_000), None);
        });
    });
}

fn map_put_overwrite(c: &mut Criterion) {
    let mut map = Config::new()
        .expected_size(1_000_000)
        .fill_factor(4.0)
        .open::<i64, i64>();

    for x in 0..1_000_000 {
        map.put(x, !x);
    }

    c.bench_function("map put overwrite", |b| {
        let mut x = 0;
        b.iter(|| {
            x = (x + 7_919) % 1_000_000;
            map.put(x, x);
        });
    });
}

fn concurrent_map_get_hit(c: &mut Criterion) {
    let map = Config::new()
        .expected_size(1_000_000)
        .fill_factor(4.0)
        .open_concurrent::<i64, i64>();

    for x in 0..1_000_000 {
        map.put(x, !x);
    }

    c.bench_function("concurrent map get", |b| {
        let mut x = 0;
        b.iter(|| {
            x = (x + 7_919) % 1_000_000;
            assert_eq!(map.get(x), Some(!x));
        });
    });
}

criterion_group!(
    benches,
    map_get_hit,
    map_get_miss,
    map_put_overwrite,
    concurrent_map_get_hit,
);
criterion_main!(benches);
