use std::collections::HashMap;
use std::sync::Mutex;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SIZE: usize = 10_000;

#[derive(Clone, Copy)]
struct RandomKeys {
    state: usize,
}

impl RandomKeys {
    fn new() -> Self {
        RandomKeys { state: 0 }
    }
}

impl Iterator for RandomKeys {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        // Add 1 then multiply by some 32 bit prime.
        self.state = self.state.wrapping_add(1).wrapping_mul(3_787_392_781);
        Some(self.state)
    }
}

fn read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    group.bench_function("syncmap", |b| {
        let m = syncmap::SyncMap::<usize, usize>::new();

        for i in RandomKeys::new().take(SIZE) {
            m.pin().store(i, i);
        }

        // Promote every key into the read snapshot.
        m.pin().range(|_, _| true);

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.pin().load(&i), Some(&i)));
            }
        });
    });

    group.bench_function("std", |b| {
        let mut m = HashMap::<usize, usize>::default();
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.get(&i), Some(&i)));
            }
        });
    });

    group.bench_function("std (mutex)", |b| {
        let m = Mutex::new(HashMap::<usize, usize>::default());
        for i in RandomKeys::new().take(SIZE) {
            m.lock().unwrap().insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(m.lock().unwrap().get(&i), Some(&i)));
            }
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::default();
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(assert_eq!(*m.get(&i).unwrap(), i));
            }
        });
    });

    group.finish();
}

fn overwrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("overwrite");

    group.bench_function("syncmap", |b| {
        let m = syncmap::SyncMap::<usize, usize>::new();

        for i in RandomKeys::new().take(SIZE) {
            m.pin().store(i, i);
        }
        m.pin().range(|_, _| true);

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.pin().store(i, i + 1));
            }
        });
    });

    group.bench_function("std (mutex)", |b| {
        let m = Mutex::new(HashMap::<usize, usize>::default());
        for i in RandomKeys::new().take(SIZE) {
            m.lock().unwrap().insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.lock().unwrap().insert(i, i + 1));
            }
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::default();
        for i in RandomKeys::new().take(SIZE) {
            m.insert(i, i);
        }

        b.iter(|| {
            for i in RandomKeys::new().take(SIZE) {
                black_box(m.insert(i, i + 1));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, read, overwrite);
criterion_main!(benches);
