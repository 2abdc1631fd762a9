#![allow(unstable_name_collisions)]
#![doc = include_str!("../README.md")]

mod map;
mod raw;
mod value;

#[cfg(feature = "serde")]
mod serde_impls;

pub use map::{Iter, Keys, LoadOrStore, SyncMap, SyncMapBuilder, SyncMapRef, Values};
pub use seize::{Collector, Guard, LocalGuard, OwnedGuard};
pub use value::{AnyValue, AtomicValue, AtomicValueRef, StoreError};
