use criterion::{criterion_group, criterion_main, Criterion};
use rand::{distributions::Alphanumeric, Rng};
use tempfile::TempDir;

use kvblob::{engine::BlobEngine, log_store::LogStore, sled::SledStore};

fn generate_random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(1..length);
    (&mut rng)
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn bench_put(c: &mut Criterion) {
    let values: Vec<_> = (0..100).map(|_| generate_random_string(10000)).collect();

    let tmp_dir = TempDir::new().unwrap();
    let sled = SledStore::open(tmp_dir.path()).unwrap();

    let log_tmp_dir = TempDir::new().unwrap();
    let log_store = LogStore::open(log_tmp_dir.path()).unwrap();

    let mut group = c.benchmark_group("put");

    group.bench_function("sled_put", |b| {
        b.iter(|| {
            values.iter().for_each(|value| {
                sled.put(value.to_owned()).unwrap();
            })
        })
    });

    group.bench_function("log_put", |b| {
        b.iter(|| {
            values.iter().for_each(|value| {
                log_store.put(value.to_owned()).unwrap();
            })
        })
    });

    group.finish();
}

pub fn bench_get(c: &mut Criterion) {
    let values: Vec<_> = (0..100).map(|_| generate_random_string(10000)).collect();

    let tmp_dir = TempDir::new().unwrap();
    let sled = SledStore::open(tmp_dir.path()).unwrap();
    let sled_ids: Vec<_> = values
        .iter()
        .map(|value| sled.put(value.to_owned()).unwrap())
        .collect();

    let log_tmp_dir = TempDir::new().unwrap();
    let log_store = LogStore::open(log_tmp_dir.path()).unwrap();
    let log_ids: Vec<_> = values
        .iter()
        .map(|value| log_store.put(value.to_owned()).unwrap())
        .collect();

    let mut group = c.benchmark_group("get");

    group.bench_function("sled_get", |b| {
        b.iter(|| {
            sled_ids.iter().for_each(|id| {
                sled.get(*id).unwrap();
            })
        })
    });

    group.bench_function("log_get", |b| {
        b.iter(|| {
            log_ids.iter().for_each(|id| {
                log_store.get(*id).unwrap();
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
