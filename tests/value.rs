use syncmap::{AnyValue, AtomicValue, Collector, StoreError};

use std::sync::Barrier;
use std::thread;

mod common;
use common::threads;

#[test]
fn load_empty() {
    let value = AtomicValue::new();
    assert!(value.pin().load::<usize>().is_none());
    assert!(value.pin().load_any().is_none());
}

#[test]
fn store_and_load() {
    let value = AtomicValue::new();
    value.store(1_usize);
    assert_eq!(value.pin().load::<usize>(), Some(&1));

    value.store(2_usize);
    assert_eq!(value.pin().load::<usize>(), Some(&2));

    // Loading as a different type finds nothing.
    assert_eq!(value.pin().load::<u32>(), None);
}

#[test]
fn swap() {
    let value = AtomicValue::new();
    let guard = value.guard();

    assert_eq!(value.swap(String::from("a"), &guard), None);
    assert_eq!(
        value.swap(String::from("b"), &guard).map(String::as_str),
        Some("a")
    );
    assert_eq!(
        value.load::<String>(&guard).map(String::as_str),
        Some("b")
    );
}

#[test]
#[should_panic(expected = "store of inconsistently typed value into AtomicValue")]
fn inconsistent_type() {
    let value = AtomicValue::new();
    value.store(1_usize);
    value.store("one");
}

#[test]
#[should_panic(expected = "store of inconsistently typed value into AtomicValue")]
fn inconsistent_swap() {
    let value = AtomicValue::new();
    value.store(1_u64);
    value.pin().swap(1_i64);
}

#[test]
#[should_panic(expected = "store of an empty value into AtomicValue")]
fn empty_store() {
    let value = AtomicValue::new();
    value.store_any(None);
}

#[test]
fn try_store() {
    let value = AtomicValue::new();
    assert_eq!(value.try_store(1_u8), Ok(()));
    assert_eq!(
        value.try_store(1_u16),
        Err(StoreError::InconsistentType {
            expected: "u8",
            found: "u16",
        })
    );
    assert_eq!(value.try_store_any(None), Err(StoreError::Empty));

    // The rejected stores leave the value untouched.
    assert_eq!(value.pin().load::<u8>(), Some(&1));
}

#[test]
fn error_display() {
    let err = StoreError::InconsistentType {
        expected: "u8",
        found: "u16",
    };
    assert_eq!(
        err.to_string(),
        "store of inconsistently typed value into AtomicValue: expected `u8`, found `u16`"
    );
    assert_eq!(
        StoreError::Empty.to_string(),
        "store of an empty value into AtomicValue"
    );
}

#[test]
fn store_any() {
    let value = AtomicValue::new();
    value.store_any(Some(Box::new(7_i32)));
    assert_eq!(value.pin().load::<i32>(), Some(&7));

    // Statically and dynamically typed stores agree on the type.
    value.store(8_i32);
    value.store_any(Some(Box::new(9_i32) as Box<AnyValue>));
    assert_eq!(value.pin().load::<i32>(), Some(&9));

    let err = value.try_store_any(Some(Box::new(1.0_f64))).unwrap_err();
    assert!(matches!(err, StoreError::InconsistentType { found: "dyn Any", .. }));

    let pinned = value.pin();
    let any = pinned.load_any().unwrap();
    assert_eq!(any.downcast_ref::<i32>(), Some(&9));
}

#[test]
fn debug() {
    let value = AtomicValue::new();
    assert_eq!(
        format!("{value:?}"),
        "AtomicValue { published: false, type: None }"
    );

    value.store(1_u32);
    assert_eq!(
        format!("{value:?}"),
        "AtomicValue { published: true, type: Some(\"u32\") }"
    );
}

#[test]
#[should_panic(expected = "Attempted to access AtomicValue with incorrect guard")]
fn foreign_guard() {
    let value = AtomicValue::new();
    let collector = Collector::new();

    let guard = collector.enter();
    value.load::<usize>(&guard);
}

#[test]
fn drop_values() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));

    let value = AtomicValue::with_collector(Collector::new().batch_size(1));
    for _ in 0..10 {
        value.store(Tracked(drops.clone()));
    }
    drop(value);

    assert_eq!(drops.load(Ordering::Relaxed), 10);
}

#[test]
fn concurrent_first_store() {
    const ITERATIONS: usize = if cfg!(miri) { 4 } else { 256 };

    for _ in 0..ITERATIONS {
        let value = AtomicValue::new();
        let threads = threads().max(2);
        let barrier = Barrier::new(threads);

        thread::scope(|s| {
            for t in 0..threads {
                let (value, barrier) = (&value, &barrier);

                s.spawn(move || {
                    barrier.wait();
                    value.store(t);
                    assert!(value.pin().load::<usize>().is_some_and(|&v| v < threads));
                });
            }
        });

        assert!(value.pin().load::<usize>().is_some());
    }
}

#[test]
fn concurrent_type_race() {
    const ITERATIONS: usize = if cfg!(miri) { 4 } else { 256 };

    for _ in 0..ITERATIONS {
        let value = AtomicValue::new();
        let barrier = Barrier::new(2);

        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| {
                barrier.wait();
                value.try_store(1_u32)
            });

            let b = s.spawn(|| {
                barrier.wait();
                value.try_store(String::from("one"))
            });

            (a.join().unwrap(), b.join().unwrap())
        });

        // Exactly one type wins the first store.
        assert!(a.is_ok() != b.is_ok());

        let pinned = value.pin();
        match a {
            Ok(()) => assert_eq!(pinned.load::<u32>(), Some(&1)),
            Err(_) => assert_eq!(pinned.load::<String>().map(String::as_str), Some("one")),
        }
    }
}
