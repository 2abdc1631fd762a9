use crate::raw::AtomicBox;

use std::any::{self, Any, TypeId};
use std::cell::UnsafeCell;
use std::fmt;
use std::hint;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};

use seize::{Collector, Guard, LocalGuard, OwnedGuard};

/// A type-erased value stored in an [`AtomicValue`].
pub type AnyValue = dyn Any + Send + Sync;

/// An error returned by [`AtomicValue::try_store`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Attempted to store no value.
    #[error("store of an empty value into AtomicValue")]
    Empty,

    /// Attempted to store a value of a different type than the first stored value.
    #[error("store of inconsistently typed value into AtomicValue: expected `{expected}`, found `{found}`")]
    InconsistentType {
        /// The type established by the first store.
        expected: &'static str,

        /// The type of the rejected value.
        found: &'static str,
    },
}

/// A box that atomically publishes a value of a consistent type.
///
/// Values are loaded without locking and stay valid for as long as the guard
/// they were loaded with is held. The first store establishes the concrete type
/// of the box, and every later store must use that same type.
///
/// # Examples
///
/// ```
/// use syncmap::AtomicValue;
///
/// #[derive(Debug, PartialEq)]
/// struct Config {
///     workers: usize,
/// }
///
/// let value = AtomicValue::new();
/// assert_eq!(value.pin().load::<Config>(), None);
///
/// value.store(Config { workers: 4 });
/// assert_eq!(value.pin().load::<Config>(), Some(&Config { workers: 4 }));
/// ```
pub struct AtomicValue {
    /// The publication state of the box.
    state: AtomicU32,

    /// The type of the stored value.
    ///
    /// Written once by the thread that claims the box, and only read after
    /// the box is published.
    ty: UnsafeCell<MaybeUninit<ValueType>>,

    /// The current value.
    value: AtomicBox<Box<AnyValue>>,

    /// Collector for memory reclamation.
    collector: Collector,
}

// Safety: `ty` is written once before `state` is set to `PUBLISHED` with release ordering,
// and only read after observing `PUBLISHED` with acquire ordering. Stored values are
// `Send + Sync`.
unsafe impl Send for AtomicValue {}
unsafe impl Sync for AtomicValue {}

#[derive(Clone, Copy)]
struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    // The type of a statically known value.
    fn of<T: Any>() -> ValueType {
        ValueType {
            id: TypeId::of::<T>(),
            name: any::type_name::<T>(),
        }
    }

    // The type of an erased value, whose name is not known.
    fn erased(value: &AnyValue) -> ValueType {
        ValueType {
            // Dispatches to the concrete type rather than the box.
            id: (*value).type_id(),
            name: "dyn Any",
        }
    }
}

impl AtomicValue {
    /// Nothing has been stored yet.
    const EMPTY: u32 = 0;

    /// A thread has claimed the first store and is publishing its value.
    const CLAIMING: u32 = 1;

    /// A value has been published.
    const PUBLISHED: u32 = 2;

    /// The number of times to spin on a claimed box before blocking.
    const SPIN_LIMIT: usize = 64;

    /// Creates an empty `AtomicValue`.
    pub fn new() -> AtomicValue {
        AtomicValue::with_collector(Collector::new())
    }

    /// Creates an empty `AtomicValue` using the given collector for memory reclamation.
    ///
    /// Note that all `Guard` references used to access the value must be produced by
    /// the provided `collector`.
    pub fn with_collector(collector: Collector) -> AtomicValue {
        AtomicValue {
            state: AtomicU32::new(AtomicValue::EMPTY),
            ty: UnsafeCell::new(MaybeUninit::uninit()),
            value: AtomicBox::empty(),
            collector,
        }
    }

    /// Returns a pinned reference to the value.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held.
    #[inline]
    pub fn pin(&self) -> AtomicValueRef<'_, LocalGuard<'_>> {
        AtomicValueRef {
            guard: self.guard(),
            value: self,
        }
    }

    /// Returns a pinned reference to the value that implements `Send` and `Sync`.
    #[inline]
    pub fn pin_owned(&self) -> AtomicValueRef<'_, OwnedGuard<'_>> {
        AtomicValueRef {
            guard: self.owned_guard(),
            value: self,
        }
    }

    /// Returns a guard for use with this value.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Returns an owned guard for use with this value.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.collector.enter_owned()
    }

    #[inline]
    fn check_guard(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "Attempted to access AtomicValue with incorrect guard"
        );
    }

    /// Returns the type established by the first store, if it was published.
    #[inline]
    fn published_type(&self) -> Option<ValueType> {
        if self.state.load(Ordering::Acquire) != AtomicValue::PUBLISHED {
            return None;
        }

        // Safety: The type is initialized before the box is published, and never
        // written again.
        Some(unsafe { (*self.ty.get()).assume_init() })
    }

    /// Returns the most recently stored value, or `None` if no value was
    /// stored yet.
    #[inline]
    pub fn load_any<'g>(&self, guard: &'g impl Guard) -> Option<&'g AnyValue> {
        self.check_guard(guard);

        match self.state.load(Ordering::Acquire) {
            AtomicValue::EMPTY => return None,
            // A first store is in progress, its value is about to be published.
            AtomicValue::CLAIMING => self.wait_claimed(),
            _ => {}
        }

        // Safety: Checked the guard above.
        unsafe { self.value.load(guard) }.map(|value| &**value)
    }

    /// Returns the most recently stored value if it is of type `T`.
    ///
    /// Returns `None` if no value was stored yet, or if the box holds values
    /// of a different type.
    #[inline]
    pub fn load<'g, T>(&self, guard: &'g impl Guard) -> Option<&'g T>
    where
        T: Any,
    {
        self.load_any(guard)?.downcast_ref::<T>()
    }

    /// Stores a value.
    ///
    /// # Panics
    ///
    /// Panics if the box already holds values of a different type.
    #[inline]
    pub fn store<T>(&self, value: T)
    where
        T: Any + Send + Sync,
    {
        if let Err(err) = self.try_store(value) {
            panic!("{err}");
        }
    }

    /// Stores a value, returning an error if the box holds values of a different type.
    #[inline]
    pub fn try_store<T>(&self, value: T) -> Result<(), StoreError>
    where
        T: Any + Send + Sync,
    {
        let guard = self.guard();
        self.publish(Box::new(value), ValueType::of::<T>(), &guard)
            .map(drop)
    }

    /// Stores a type-erased value.
    ///
    /// # Panics
    ///
    /// Panics if `value` is `None`, or if its concrete type differs from the
    /// values previously stored in the box.
    #[inline]
    pub fn store_any(&self, value: Option<Box<AnyValue>>) {
        if let Err(err) = self.try_store_any(value) {
            panic!("{err}");
        }
    }

    /// Stores a type-erased value, returning an error instead of panicking.
    pub fn try_store_any(&self, value: Option<Box<AnyValue>>) -> Result<(), StoreError> {
        let value = value.ok_or(StoreError::Empty)?;
        let ty = ValueType::erased(&*value);

        let guard = self.guard();
        self.publish(value, ty, &guard).map(drop)
    }

    /// Stores a value, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if the box already holds values of a different type.
    #[inline]
    pub fn swap<'g, T>(&self, value: T, guard: &'g impl Guard) -> Option<&'g T>
    where
        T: Any + Send + Sync,
    {
        self.check_guard(guard);

        match self.publish(Box::new(value), ValueType::of::<T>(), guard) {
            Ok(previous) => previous.and_then(|value| value.downcast_ref::<T>()),
            Err(err) => panic!("{err}"),
        }
    }

    /// Publishes the first value and its type.
    ///
    /// # Safety
    ///
    /// The caller must have moved the state from `EMPTY` to `CLAIMING`, and the
    /// guard must be valid to use with this value.
    unsafe fn publish_claimed(&self, value: Box<AnyValue>, ty: ValueType, guard: &impl Guard) {
        // Safety: No other thread reads the type until it is published.
        unsafe { (*self.ty.get()).write(ty) };

        // Safety: Guaranteed by caller.
        unsafe { self.value.store(value, guard) };

        self.state.store(AtomicValue::PUBLISHED, Ordering::Release);
        atomic_wait::wake_all(&self.state);

        tracing::trace!(ty = ty.name, "published first value");
    }

    // Waits until a claimed first store is published. The claimed window never
    // blocks, so spin for a while before parking.
    fn wait_claimed(&self) {
        let mut spins = 0;

        while self.state.load(Ordering::Acquire) == AtomicValue::CLAIMING {
            if spins < AtomicValue::SPIN_LIMIT {
                spins += 1;
                hint::spin_loop();
            } else {
                atomic_wait::wait(&self.state, AtomicValue::CLAIMING);
            }
        }
    }

    // Publish a value, returning the previous one.
    fn publish<'g>(
        &self,
        value: Box<AnyValue>,
        ty: ValueType,
        guard: &'g impl Guard,
    ) -> Result<Option<&'g AnyValue>, StoreError> {
        loop {
            match self.state.load(Ordering::Acquire) {
                AtomicValue::EMPTY => {
                    if self
                        .state
                        .compare_exchange(
                            AtomicValue::EMPTY,
                            AtomicValue::CLAIMING,
                            Ordering::Acquire,
                            Ordering::Acquire,
                        )
                        .is_err()
                    {
                        continue;
                    }

                    // Safety: We claimed the box above.
                    unsafe { self.publish_claimed(value, ty, guard) };
                    return Ok(None);
                }

                // Another thread is publishing the first value.
                AtomicValue::CLAIMING => self.wait_claimed(),

                _ => {
                    // Safety: Observed `PUBLISHED` with acquire ordering.
                    let expected = unsafe { (*self.ty.get()).assume_init() };

                    if expected.id != ty.id {
                        return Err(StoreError::InconsistentType {
                            expected: expected.name,
                            found: ty.name,
                        });
                    }

                    // Safety: The guard was verified by the caller.
                    let previous = unsafe { self.value.swap(value, guard) };
                    return Ok(previous.map(|value| &**value));
                }
            }
        }
    }
}

impl Default for AtomicValue {
    fn default() -> Self {
        AtomicValue::new()
    }
}

impl fmt::Debug for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.published_type();

        f.debug_struct("AtomicValue")
            .field("published", &ty.is_some())
            .field("type", &ty.map(|ty| ty.name))
            .finish()
    }
}

impl Drop for AtomicValue {
    fn drop(&mut self) {
        // Safety: We have a unique reference to the collector.
        unsafe { self.collector.reclaim_all() };
    }
}

/// A pinned reference to an [`AtomicValue`].
///
/// This type is created with [`AtomicValue::pin`] and can be used to access the value
/// without passing a guard to every call.
pub struct AtomicValueRef<'a, G> {
    guard: G,
    value: &'a AtomicValue,
}

impl<G> AtomicValueRef<'_, G>
where
    G: Guard,
{
    /// Returns the most recently stored value if it is of type `T`.
    #[inline]
    pub fn load<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.value.load(&self.guard)
    }

    /// Returns the most recently stored value.
    #[inline]
    pub fn load_any(&self) -> Option<&AnyValue> {
        self.value.load_any(&self.guard)
    }

    /// Stores a value, returning the previous one.
    #[inline]
    pub fn swap<T>(&self, value: T) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.value.swap(value, &self.guard)
    }
}

impl<G> fmt::Debug for AtomicValueRef<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.value, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{AtomicValue, ValueType};

    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn load_waits_for_first_store() {
        let value = AtomicValue::new();
        value.state.store(AtomicValue::CLAIMING, Ordering::Relaxed);

        thread::scope(|s| {
            let reader = s.spawn(|| value.pin().load::<u32>().copied());

            // Give the reader a chance to park on the claimed state.
            thread::sleep(Duration::from_millis(20));

            let guard = value.guard();
            // Safety: The state was claimed above, and the guard belongs to this value.
            unsafe { value.publish_claimed(Box::new(7_u32), ValueType::of::<u32>(), &guard) };

            assert_eq!(reader.join().unwrap(), Some(7));
        });
    }
}
