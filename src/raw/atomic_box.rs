use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use seize::{reclaim, Guard};

/// A single-slot publication cell.
///
/// Readers perform a protected load of the current allocation and may keep
/// the reference for as long as their guard is held. Writers swap in a new
/// allocation and retire the previous one through the guard's collector.
pub struct AtomicBox<T> {
    ptr: AtomicPtr<T>,
    _value: PhantomData<T>,
}

impl<T> AtomicBox<T> {
    /// Creates an empty box.
    #[inline]
    pub const fn empty() -> AtomicBox<T> {
        AtomicBox {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _value: PhantomData,
        }
    }

    /// Creates a box holding `value`.
    #[inline]
    pub fn new(value: T) -> AtomicBox<T> {
        AtomicBox {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _value: PhantomData,
        }
    }

    /// Returns the most recently published value.
    ///
    /// # Safety
    ///
    /// The guard must belong to the collector that retires values from this box.
    #[inline]
    pub unsafe fn load<'g>(&self, guard: &'g impl Guard) -> Option<&'g T> {
        let ptr = guard.protect(&self.ptr, Ordering::Acquire);

        // Safety: Published values are valid allocations that are only
        // retired through the guard's collector, so they remain valid
        // for as long as we hold the guard.
        unsafe { ptr.as_ref() }
    }

    /// Publishes a new value, returning a reference to the one it replaced.
    ///
    /// # Safety
    ///
    /// The guard must belong to the collector that retires values from this box.
    #[inline]
    pub unsafe fn swap<'g>(&self, value: T, guard: &'g impl Guard) -> Option<&'g T> {
        let new = Box::into_raw(Box::new(value));
        let old = guard.swap(&self.ptr, new, Ordering::AcqRel);

        if old.is_null() {
            return None;
        }

        // Safety: The old value is unreachable from this box after the swap above,
        // and any readers are protected by their own guards.
        unsafe { guard.defer_retire(old, reclaim::boxed::<T>) };

        // Safety: The value was retired through our guard, so it is not reclaimed
        // before the guard is dropped.
        unsafe { Some(&*old) }
    }

    /// Publishes a new value.
    ///
    /// # Safety
    ///
    /// The guard must belong to the collector that retires values from this box.
    #[inline]
    pub unsafe fn store(&self, value: T, guard: &impl Guard) {
        unsafe { self.swap(value, guard) };
    }
}

impl<T> Drop for AtomicBox<T> {
    fn drop(&mut self) {
        let ptr = *self.ptr.get_mut();

        if !ptr.is_null() {
            // Safety: We have unique access to the box and the current
            // value was never retired.
            let _ = unsafe { Box::from_raw(ptr) };
        }
    }
}
