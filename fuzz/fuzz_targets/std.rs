#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use std::collections::HashMap as StdHashMap;
use syncmap::{LoadOrStore, SyncMap};

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    Store(K, V),
    Swap(K, V),
    LoadOrStore(K, V),
    LoadAndDelete(K),
    Delete(K),
    Load(K),
    Contains(K),
    CompareAndSwap(K, V, V),
    CompareAndDelete(K, V),
    Range,
    Clear,
    Len,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    operations: Vec<Operation<u8, u8>>,
}

fn fuzz_syncmap(input: FuzzInput) {
    let mut std_map = StdHashMap::new();
    let sync_raw = SyncMap::new();
    let sync_map = sync_raw.pin();

    for op in input.operations {
        match op {
            Operation::Store(k, v) => {
                std_map.insert(k, v);
                sync_map.store(k, v);
            }
            Operation::Swap(k, v) => {
                let std_result = std_map.insert(k, v);
                let sync_result = sync_map.swap(k, v);
                assert_eq!(std_result.as_ref(), sync_result);
            }
            Operation::LoadOrStore(k, v) => {
                let std_result = *std_map.entry(k).or_insert(v);
                let sync_result = match sync_map.load_or_store(k, v) {
                    LoadOrStore::Loaded(v) | LoadOrStore::Stored(v) => *v,
                };
                assert_eq!(std_result, sync_result);
            }
            Operation::LoadAndDelete(k) => {
                let std_result = std_map.remove(&k);
                let sync_result = sync_map.load_and_delete(&k);
                assert_eq!(std_result.as_ref(), sync_result);
            }
            Operation::Delete(k) => {
                std_map.remove(&k);
                sync_map.delete(&k);
            }
            Operation::Load(k) => {
                let std_result = std_map.get(&k);
                let sync_result = sync_map.load(&k);
                assert_eq!(std_result, sync_result);
            }
            Operation::Contains(k) => {
                let std_result = std_map.contains_key(&k);
                let sync_result = sync_map.contains_key(&k);
                assert_eq!(std_result, sync_result);
            }
            Operation::CompareAndSwap(k, old, new) => {
                let std_result = match std_map.get_mut(&k) {
                    Some(value) if *value == old => {
                        *value = new;
                        true
                    }
                    _ => false,
                };
                let sync_result = sync_map.compare_and_swap(&k, &old, new);
                assert_eq!(std_result, sync_result);
            }
            Operation::CompareAndDelete(k, old) => {
                let std_result = std_map.get(&k) == Some(&old);
                if std_result {
                    std_map.remove(&k);
                }
                let sync_result = sync_map.compare_and_delete(&k, &old);
                assert_eq!(std_result, sync_result);
            }
            Operation::Range => {
                let mut visited = 0;
                sync_map.range(|k, v| {
                    assert_eq!(std_map.get(k), Some(v));
                    visited += 1;
                    true
                });
                assert_eq!(visited, std_map.len());
            }
            Operation::Clear => {
                std_map.clear();
                sync_map.clear();
            }
            Operation::Len => {
                assert_eq!(std_map.len(), sync_map.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), sync_map.is_empty());
            }
        }
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        let sync_result = sync_map.load(k);
        assert_eq!(Some(v), sync_result);
    }
    assert_eq!(std_map.len(), sync_map.len());
    assert_eq!(std_map.is_empty(), sync_map.is_empty());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_syncmap(data);
});
