use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use super::utils::{StrictProvenance, Tagged, Unpack};

use seize::{reclaim, Guard};

/// Tag bit of an entry that was expunged from the dirty map.
pub const EXPUNGED: usize = 0b1;

// A heap allocated value, referenced by the pointer of an entry.
#[repr(C, align(8))] // Leaves room for the pointer tag bits.
pub struct Slot<V> {
    pub value: V,
}

impl<V> Unpack for Slot<V> {
    // Mask for a slot pointer, ignoring the tag bits.
    const MASK: usize = !EXPUNGED;
}

/// The value slot bound to a single key.
///
/// The slot pointer encodes the state of the entry:
///
/// - A non-null pointer is a live value.
/// - A null pointer means the key was deleted, but the entry may still be
///   reachable from the read snapshot, and from the dirty map if one exists.
/// - A null pointer tagged with `EXPUNGED` means the key was deleted and the
///   entry was left out of the dirty map. It must be registered in the dirty
///   map, under the lock, before it can be written to again.
pub struct Entry<V> {
    ptr: AtomicPtr<Slot<V>>,
    _value: PhantomData<V>,
}

/// The observed state of an entry.
pub enum EntryState<'g, V> {
    /// The entry holds a value.
    Live(Tagged<Slot<V>>, &'g V),

    /// The entry was deleted.
    Deleted,

    /// The entry was deleted and is not present in the dirty map.
    Expunged,
}

/// The result of `Entry::try_load_or_store`.
pub enum LoadOrStore<'g, V> {
    /// Found an existing value.
    Loaded(&'g V),

    /// Stored the given value.
    Stored(&'g V),

    /// The entry is expunged, the value was not stored.
    Expunged(V),
}

// An expunged slot pointer.
#[inline]
fn expunged<V>() -> *mut Slot<V> {
    ptr::null_mut::<Slot<V>>().map_addr(|addr| addr | EXPUNGED)
}

// Allocate a slot for the given value.
#[inline]
fn alloc<V>(value: V) -> *mut Slot<V> {
    Box::into_raw(Box::new(Slot { value }))
}

impl<V> Entry<V> {
    /// Creates an entry holding a value.
    #[inline]
    pub fn new(value: V) -> Entry<V> {
        Entry {
            ptr: AtomicPtr::new(alloc(value)),
            _value: PhantomData,
        }
    }

    /// Load the state of the entry.
    #[inline]
    pub fn state<'g>(&self, guard: &'g impl Guard) -> EntryState<'g, V> {
        let slot = guard.protect(&self.ptr, Ordering::Acquire).unpack();
        self.status(slot)
    }

    // Returns the state for the given slot pointer.
    #[inline]
    fn status<'g>(&self, slot: Tagged<Slot<V>>) -> EntryState<'g, V> {
        if slot.tag() & EXPUNGED != 0 {
            return EntryState::Expunged;
        }

        if slot.ptr.is_null() {
            return EntryState::Deleted;
        }

        // Safety: Slots are only ever retired through the collector after being
        // made unreachable, and we performed a protected load with a guard
        // belonging to that collector.
        EntryState::Live(slot, unsafe { &(*slot.ptr).value })
    }

    /// Returns the value of the entry, if it is live.
    #[inline]
    pub fn load<'g>(&self, guard: &'g impl Guard) -> Option<&'g V> {
        match self.state(guard) {
            EntryState::Live(_, value) => Some(value),
            EntryState::Deleted | EntryState::Expunged => None,
        }
    }

    /// Returns a reference to the value stored in the given slot, after
    /// retiring it.
    ///
    /// # Safety
    ///
    /// The slot must have just been made unreachable from this entry.
    #[inline]
    unsafe fn retire<'g>(&self, slot: *mut Slot<V>, guard: &'g impl Guard) -> &'g V {
        // Safety: Guaranteed by the caller. The slot is not reclaimed until
        // the guard is dropped.
        unsafe {
            guard.defer_retire(slot, reclaim::boxed::<Slot<V>>);
            &(*slot).value
        }
    }

    /// Swaps a value into the entry unless it is expunged.
    ///
    /// Returns `Err(value)` if the entry was expunged, otherwise the previous value.
    #[inline]
    pub fn try_swap<'g>(&self, value: V, guard: &'g impl Guard) -> Result<Option<&'g V>, V> {
        let mut current = guard.protect(&self.ptr, Ordering::Acquire);
        let new = alloc(value);

        loop {
            if current.unpack().tag() & EXPUNGED != 0 {
                // Safety: The slot was never published.
                let slot = unsafe { Box::from_raw(new) };
                return Err(slot.value);
            }

            match guard.compare_exchange_weak(
                &self.ptr,
                current,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if current.is_null() => return Ok(None),
                // Safety: The previous slot is now unreachable from this entry.
                Ok(_) => return Ok(Some(unsafe { self.retire(current, guard) })),
                Err(found) => current = found,
            }
        }
    }

    /// Clears the expunged marker, leaving the entry deleted.
    ///
    /// Returns `true` if the entry was expunged. The entry must be present in the
    /// dirty map before the lock is released.
    ///
    /// Must be called with the lock held.
    #[inline]
    pub fn unexpunge_locked(&self) -> bool {
        self.ptr
            .compare_exchange(
                expunged(),
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Unconditionally swaps a value into the entry, returning the previous value.
    ///
    /// The entry must be known not to be expunged. Must be called with the lock held.
    #[inline]
    pub fn swap_locked<'g>(&self, value: V, guard: &'g impl Guard) -> Option<&'g V> {
        let old = guard.swap(&self.ptr, alloc(value), Ordering::AcqRel);

        if old.is_null() {
            return None;
        }

        debug_assert!(old.unpack().tag() & EXPUNGED == 0);

        // Safety: The previous slot is now unreachable from this entry.
        Some(unsafe { self.retire(old, guard) })
    }

    /// Stores the value if the entry is deleted, or returns the current value.
    ///
    /// If the entry is expunged the value is handed back untouched.
    #[inline]
    pub fn try_load_or_store<'g>(&self, value: V, guard: &'g impl Guard) -> LoadOrStore<'g, V> {
        let mut current = guard.protect(&self.ptr, Ordering::Acquire).unpack();

        // Avoid allocating a slot if the entry is already live or expunged.
        match self.status(current) {
            EntryState::Live(_, value) => return LoadOrStore::Loaded(value),
            EntryState::Expunged => return LoadOrStore::Expunged(value),
            EntryState::Deleted => {}
        }

        let new = alloc(value);

        loop {
            match guard.compare_exchange_weak(
                &self.ptr,
                current.raw,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // Safety: The slot was published and can only be retired through the
                // collector, which respects our guard.
                Ok(_) => return LoadOrStore::Stored(unsafe { &(*new).value }),
                Err(found) => current = found.unpack(),
            }

            match self.status(current) {
                EntryState::Deleted => continue,
                state => {
                    // Safety: The slot was never published.
                    let slot = unsafe { Box::from_raw(new) };

                    return match state {
                        EntryState::Live(_, value) => LoadOrStore::Loaded(value),
                        _ => LoadOrStore::Expunged(slot.value),
                    };
                }
            }
        }
    }

    /// Deletes the value of the entry, returning it.
    #[inline]
    pub fn delete<'g>(&self, guard: &'g impl Guard) -> Option<&'g V> {
        let mut current = guard.protect(&self.ptr, Ordering::Acquire);

        loop {
            if current.is_null() || current.unpack().tag() & EXPUNGED != 0 {
                return None;
            }

            match guard.compare_exchange_weak(
                &self.ptr,
                current,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // Safety: The slot is now unreachable from this entry.
                Ok(_) => return Some(unsafe { self.retire(current, guard) }),
                Err(found) => current = found,
            }
        }
    }

    /// Marks a deleted entry as expunged.
    ///
    /// Returns `true` if the entry is expunged, meaning it must be left out of the
    /// dirty map. Must be called with the lock held.
    #[inline]
    pub fn try_expunge_locked(&self) -> bool {
        let mut current = self.ptr.load(Ordering::Acquire);

        while current.is_null() {
            match self.ptr.compare_exchange(
                ptr::null_mut(),
                expunged(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(found) => current = found,
            }
        }

        current.unpack().tag() & EXPUNGED != 0
    }
}

impl<V: PartialEq> Entry<V> {
    /// Swaps in `new` if the entry currently holds a value equal to `old`.
    ///
    /// Expunged and deleted entries never compare equal.
    #[inline]
    pub fn try_compare_and_swap(&self, old: &V, new: V, guard: &impl Guard) -> bool {
        let mut current = match self.state(guard) {
            EntryState::Live(slot, value) if value == old => slot,
            _ => return false,
        };

        let new = alloc(new);

        loop {
            match guard.compare_exchange_weak(
                &self.ptr,
                current.raw,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Safety: The previous slot is now unreachable from this entry.
                    unsafe { self.retire(current.ptr, guard) };
                    return true;
                }
                Err(found) => match self.status(found.unpack()) {
                    EntryState::Live(slot, value) if value == old => current = slot,
                    _ => {
                        // Safety: The slot was never published.
                        drop(unsafe { Box::from_raw(new) });
                        return false;
                    }
                },
            }
        }
    }

    /// Deletes the value of the entry if it is equal to `old`.
    #[inline]
    pub fn try_compare_and_delete(&self, old: &V, guard: &impl Guard) -> bool {
        let mut current = self.state(guard);

        loop {
            let slot = match current {
                EntryState::Live(slot, value) if value == old => slot,
                _ => return false,
            };

            match guard.compare_exchange_weak(
                &self.ptr,
                slot.raw,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // Safety: The slot is now unreachable from this entry.
                    unsafe { self.retire(slot.ptr, guard) };
                    return true;
                }
                Err(found) => current = self.status(found.unpack()),
            }
        }
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        let slot = self.ptr.get_mut().unpack();

        if slot.tag() & EXPUNGED == 0 && !slot.ptr.is_null() {
            // Safety: The entry is no longer reachable by any thread, so the live
            // slot is not either.
            let _ = unsafe { Box::from_raw(slot.ptr) };
        }
    }
}
