//! Uncontended costs of each access mode.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stamped_lock::StampedLock;

fn optimistic_read(c: &mut Criterion) {
    let lock = StampedLock::new();
    c.bench_function("optimistic read + validate", |b| {
        b.iter(|| {
            let stamp = lock.try_optimistic_read();
            black_box(lock.validate(black_box(stamp)))
        })
    });
}

fn read_lock(c: &mut Criterion) {
    let lock = StampedLock::new();
    c.bench_function("read lock + unlock", |b| {
        b.iter(|| {
            let stamp = lock.read_lock();
            lock.unlock_read(black_box(stamp))
        })
    });
}

fn write_lock(c: &mut Criterion) {
    let lock = StampedLock::new();
    c.bench_function("write lock + unlock", |b| {
        b.iter(|| {
            let stamp = lock.write_lock();
            lock.unlock_write(black_box(stamp))
        })
    });
}

criterion_group!(benches, optimistic_read, read_lock, write_lock);
criterion_main!(benches);
