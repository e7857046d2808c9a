//! Uncontended costs of the synchronization primitives

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ox_sync::{Cond, Mutex, Semaphore};

fn bench_mutex(c: &mut Criterion) {
    let mutex = Mutex::new().unwrap();

    c.bench_function("mutex_lock_unlock", |b| {
        b.iter(|| {
            mutex.lock().unwrap();
            unsafe { mutex.unlock().unwrap() };
        })
    });

    c.bench_function("mutex_guard", |b| {
        b.iter(|| {
            let guard = mutex.guard().unwrap();
            black_box(&guard);
        })
    });
}

fn bench_semaphore(c: &mut Criterion) {
    let sem = Semaphore::new().unwrap();

    c.bench_function("semaphore_post_wait", |b| {
        b.iter(|| {
            sem.post().unwrap();
            sem.wait().unwrap();
        })
    });
}

fn bench_cond(c: &mut Criterion) {
    let cond = Cond::new().unwrap();

    c.bench_function("cond_signal_no_waiters", |b| {
        b.iter(|| cond.signal().unwrap())
    });

    c.bench_function("cond_broadcast_no_waiters", |b| {
        b.iter(|| cond.broadcast().unwrap())
    });
}

fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_destroy");

    group.bench_function("semaphore", |b| {
        b.iter(|| black_box(Semaphore::with_count(1).unwrap()))
    });
    group.bench_function("mutex", |b| b.iter(|| black_box(Mutex::new().unwrap())));
    group.bench_function("cond", |b| b.iter(|| black_box(Cond::new().unwrap())));

    group.finish();
}

criterion_group!(
    benches,
    bench_mutex,
    bench_semaphore,
    bench_cond,
    bench_lifecycle
);
criterion_main!(benches);
