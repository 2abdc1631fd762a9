#![allow(dead_code)]

use syncmap::{Collector, SyncMap};

// Run the test on different configurations of a `SyncMap`.
pub fn with_map<K, V>(mut test: impl FnMut(&dyn Fn() -> SyncMap<K, V>)) {
    // Default collector.
    if !cfg!(syncmap_stress) {
        test(&(|| SyncMap::new()));
    }

    // Retire every object eagerly to stress memory reclamation of values and snapshots.
    test(
        &(|| {
            SyncMap::builder()
                .collector(Collector::new().batch_size(1))
                .build()
        }),
    );

    // A medium-sized batch to promote interference between reclamation and promotion.
    test(
        &(|| {
            SyncMap::builder()
                .collector(Collector::new().batch_size(128))
                .build()
        }),
    );
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two()
    }
}
