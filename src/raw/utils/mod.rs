mod tagged;

pub use tagged::{StrictProvenance, Tagged, Unpack};

use std::sync::{Mutex, MutexGuard, PoisonError};

// Acquire a mutex, ignoring poisoning.
//
// The dirty map is consistent even if user code panicked while holding the lock.
#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
