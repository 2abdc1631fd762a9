use crate::raw;

use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

pub use crate::raw::LoadOrStore;

/// A concurrent map optimized for read-mostly workloads.
///
/// The map keeps an immutable snapshot of its entries that readers access without
/// locking, and a dirty map protected by a mutex that holds keys added since the
/// snapshot was taken. Reads of keys in the snapshot and writes to existing keys
/// never take the lock. Reads that have to fall back to the dirty map are counted,
/// and once they add up to the size of the dirty map it is promoted to become the
/// new snapshot.
///
/// This makes `SyncMap` a good fit when entries are written once and read many
/// times, as in caches that only grow, or when threads read, write, and overwrite
/// entries for disjoint sets of keys. For other workloads a map behind a single
/// lock may perform better.
///
/// Most operations require a [`Guard`], which can be acquired through
/// [`SyncMap::guard`] or using the [`SyncMap::pin`] API. See the [crate-level
/// documentation](crate) for details.
pub struct SyncMap<K, V, S = RandomState> {
    raw: raw::SyncMap<K, V, S>,
}

/// A builder for a [`SyncMap`].
///
/// # Examples
///
/// ```rust
/// use syncmap::SyncMap;
/// use seize::Collector;
/// use std::collections::hash_map::RandomState;
///
/// let map: SyncMap<i32, i32> = SyncMap::builder()
///     // Set the hasher.
///     .hasher(RandomState::new())
///     // Set a custom garbage collector.
///     .collector(Collector::new().batch_size(128))
///     // Construct the map.
///     .build();
/// ```
pub struct SyncMapBuilder<K, V, S = RandomState> {
    hasher: S,
    collector: Collector,
    _kv: PhantomData<(K, V)>,
}

impl<K, V> SyncMapBuilder<K, V> {
    /// Set the hash builder used to hash keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow maps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    pub fn hasher<S>(self, hasher: S) -> SyncMapBuilder<K, V, S> {
        SyncMapBuilder {
            hasher,
            collector: self.collector,
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> SyncMapBuilder<K, V, S> {
    /// Set the [`seize::Collector`] used for garbage collection.
    ///
    /// This method may be useful when you want more control over garbage collection.
    ///
    /// Note that all `Guard` references used to access the map must be produced by
    /// the provided `collector`.
    pub fn collector(self, collector: Collector) -> Self {
        SyncMapBuilder {
            collector,
            hasher: self.hasher,
            _kv: PhantomData,
        }
    }

    /// Construct a [`SyncMap`] from the builder, using the configured options.
    pub fn build(self) -> SyncMap<K, V, S>
    where
        S: Clone,
    {
        SyncMap {
            raw: raw::SyncMap::new(self.hasher, self.collector),
        }
    }
}

impl<K, V, S> fmt::Debug for SyncMapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncMapBuilder")
            .field("collector", &self.collector)
            .finish()
    }
}

impl<K, V> SyncMap<K, V> {
    /// Creates an empty `SyncMap`.
    ///
    /// The map does not allocate entries until it is first stored into.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    /// let map: SyncMap<&str, i32> = SyncMap::new();
    /// ```
    pub fn new() -> SyncMap<K, V> {
        SyncMap::with_hasher(RandomState::new())
    }

    /// Returns a builder for a `SyncMap`.
    ///
    /// The builder can be used for more complex configuration, such as using
    /// a custom [`Collector`].
    pub fn builder() -> SyncMapBuilder<K, V> {
        SyncMapBuilder {
            hasher: RandomState::default(),
            collector: Collector::new(),
            _kv: PhantomData,
        }
    }
}

impl<K, V, S> Default for SyncMap<K, V, S>
where
    S: Default + Clone,
{
    fn default() -> Self {
        SyncMap::with_hasher(S::default())
    }
}

impl<K, V, S> SyncMap<K, V, S>
where
    S: Clone,
{
    /// Creates an empty `SyncMap` which will use the given hash builder to hash
    /// keys.
    ///
    /// Warning: `hash_builder` is normally randomly generated, and is designed
    /// to allow maps to be resistant to attacks that cause many collisions
    /// and very poor performance. Setting it manually using this function can
    /// expose a DoS attack vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    /// use std::hash::RandomState;
    ///
    /// let s = RandomState::new();
    /// let map = SyncMap::with_hasher(s);
    /// map.pin().store(1, 2);
    /// ```
    pub fn with_hasher(hash_builder: S) -> SyncMap<K, V, S> {
        SyncMap {
            raw: raw::SyncMap::new(hash_builder, Collector::new()),
        }
    }
}

impl<K, V, S> SyncMap<K, V, S> {
    /// Returns a pinned reference to the map.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held. See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn pin(&self) -> SyncMapRef<'_, K, V, S, LocalGuard<'_>> {
        SyncMapRef {
            guard: self.guard(),
            map: self,
        }
    }

    /// Returns a pinned reference to the map.
    ///
    /// Unlike [`SyncMap::pin`], the returned reference implements `Send` and `Sync`,
    /// allowing it to be held across `.await` points in work-stealing schedulers.
    /// This is especially useful for iterators.
    ///
    /// The returned reference manages a guard internally, preventing garbage collection
    /// for as long as it is held. See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn pin_owned(&self) -> SyncMapRef<'_, K, V, S, OwnedGuard<'_>> {
        SyncMapRef {
            guard: self.owned_guard(),
            map: self,
        }
    }

    /// Returns a guard for use with this map.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.raw.guard()
    }

    /// Returns an owned guard for use with this map.
    ///
    /// Owned guards implement `Send` and `Sync`, allowing them to be held across
    /// `.await` points in work-stealing schedulers. This is especially useful
    /// for iterators.
    ///
    /// Note that holding on to a guard prevents garbage collection.
    /// See the [crate-level documentation](crate#usage) for details.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.raw.owned_guard()
    }

    /// Returns a reference to the collector used by this map.
    #[inline]
    pub fn collector(&self) -> &Collector {
        self.raw.collector()
    }

    /// Returns a reference to the map's [`BuildHasher`].
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.raw.hasher
    }
}

impl<K, V, S> SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
{
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store(1, "a");
    /// assert_eq!(map.pin().load(&1), Some(&"a"));
    /// assert_eq!(map.pin().load(&2), None);
    /// ```
    #[inline]
    pub fn load<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.load(key, guard) }
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store(1, "a");
    /// assert_eq!(map.pin().contains_key(&1), true);
    /// assert_eq!(map.pin().contains_key(&2), false);
    /// ```
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.load(key, guard).is_some()
    }

    /// Sets the value for a key.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store(37, "a");
    /// map.pin().store(37, "b");
    /// assert_eq!(map.pin().load(&37), Some(&"b"));
    /// ```
    #[inline]
    pub fn store(&self, key: K, value: V, guard: &impl Guard) {
        self.swap(key, value, guard);
    }

    /// Sets the value for a key, returning the previous value if the key was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// assert_eq!(map.pin().swap(37, "a"), None);
    /// assert_eq!(map.pin().swap(37, "b"), Some(&"a"));
    /// ```
    #[inline]
    pub fn swap<'g>(&self, key: K, value: V, guard: &'g impl Guard) -> Option<&'g V> {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.swap(key, value, guard) }
    }

    /// Returns the existing value for the key if present. Otherwise, stores and
    /// returns the given value.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::{LoadOrStore, SyncMap};
    ///
    /// let map = SyncMap::new();
    /// assert_eq!(map.pin().load_or_store("a", 1), LoadOrStore::Stored(&1));
    /// assert_eq!(map.pin().load_or_store("a", 2), LoadOrStore::Loaded(&1));
    /// ```
    #[inline]
    pub fn load_or_store<'g>(&self, key: K, value: V, guard: &'g impl Guard) -> LoadOrStore<'g, V> {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.load_or_store(key, value, guard) }
    }

    /// Deletes the value for a key, returning it if the key was present.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store(1, "a");
    /// assert_eq!(map.pin().load_and_delete(&1), Some(&"a"));
    /// assert_eq!(map.pin().load_and_delete(&1), None);
    /// ```
    #[inline]
    pub fn load_and_delete<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.load_and_delete(key, guard) }
    }

    /// Deletes the value for a key.
    #[inline]
    pub fn delete<Q>(&self, key: &Q, guard: &impl Guard)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.load_and_delete(key, guard);
    }

    /// Calls `f` for each key and value in the map, stopping early if `f` returns `false`.
    ///
    /// Each key is visited at most once, but the visit does not correspond to a
    /// consistent snapshot of the whole map: a value stored or deleted concurrently
    /// may or may not be observed. See [`SyncMap::iter`] for details.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store(1, 10);
    /// map.pin().store(2, 20);
    ///
    /// let mut sum: i32 = 0;
    /// map.pin().range(|_, value| {
    ///     sum += value;
    ///     true
    /// });
    /// assert_eq!(sum, 30);
    /// ```
    #[inline]
    pub fn range<F>(&self, mut f: F, guard: &impl Guard)
    where
        F: FnMut(&K, &V) -> bool,
    {
        for (key, value) in self.iter(guard) {
            if !f(key, value) {
                break;
            }
        }
    }

    /// An iterator visiting all key-value pairs in arbitrary order.
    ///
    /// Keys added since the last promotion are promoted into the read snapshot
    /// before iterating, which takes the lock once. Iterating already costs as
    /// much as the promotion.
    ///
    /// Each key is yielded at most once. The value yielded for a key is the value
    /// it held at some point during iteration.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store("a", 1);
    /// map.pin().store("b", 2);
    ///
    /// let guard = map.guard();
    /// for (key, val) in map.iter(&guard) {
    ///     println!("key: {key} val: {val}");
    /// }
    /// ```
    #[inline]
    pub fn iter<'g, G>(&self, guard: &'g G) -> Iter<'g, K, V, G>
    where
        G: Guard,
        S: 'g,
    {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        Iter {
            raw: unsafe { self.raw.iter(guard) },
        }
    }

    /// An iterator visiting all keys in arbitrary order.
    #[inline]
    pub fn keys<'g, G>(&self, guard: &'g G) -> Keys<'g, K, V, G>
    where
        G: Guard,
        S: 'g,
    {
        Keys {
            iter: self.iter(guard),
        }
    }

    /// An iterator visiting all values in arbitrary order.
    #[inline]
    pub fn values<'g, G>(&self, guard: &'g G) -> Values<'g, K, V, G>
    where
        G: Guard,
        S: 'g,
    {
        Values {
            iter: self.iter(guard),
        }
    }

    /// Returns the number of live entries in the map.
    ///
    /// This iterates over the map, and the result may be stale by the time it is
    /// returned if the map is modified concurrently.
    #[inline]
    pub fn len(&self) -> usize {
        self.iter(&self.guard()).count()
    }

    /// Returns `true` if the map contains no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.iter(&self.guard()).next().is_none()
    }

    /// Removes every entry from the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store(1, "a");
    /// map.pin().clear();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    pub fn clear(&self, guard: &impl Guard) {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.clear(guard) }
    }
}

impl<K, V, S> SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: PartialEq,
    S: BuildHasher + Clone,
{
    /// Swaps the value for a key if the current value is equal to `old`.
    ///
    /// Returns `true` if the value was swapped. The key is never inserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store("a", 1);
    /// assert!(!map.pin().compare_and_swap(&"a", &2, 3));
    /// assert!(map.pin().compare_and_swap(&"a", &1, 3));
    /// assert_eq!(map.pin().load(&"a"), Some(&3));
    /// ```
    #[inline]
    pub fn compare_and_swap<Q>(&self, key: &Q, old: &V, new: V, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.compare_and_swap(key, old, new, guard) }
    }

    /// Deletes the value for a key if it is equal to `old`.
    ///
    /// Returns `true` if the value was deleted.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncmap::SyncMap;
    ///
    /// let map = SyncMap::new();
    /// map.pin().store("a", 1);
    /// assert!(!map.pin().compare_and_delete(&"a", &2));
    /// assert!(map.pin().compare_and_delete(&"a", &1));
    /// assert_eq!(map.pin().load(&"a"), None);
    /// ```
    #[inline]
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.raw.check_guard(guard);

        // Safety: Checked the guard above.
        unsafe { self.raw.compare_and_delete(key, old, guard) }
    }
}

impl<K, V, S> fmt::Debug for SyncMap<K, V, S>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.guard();
        f.debug_map().entries(self.iter(&guard)).finish()
    }
}

impl<K, V, S> PartialEq for SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: PartialEq,
    S: BuildHasher + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        let (guard1, guard2) = (&self.guard(), &other.guard());

        let mut iter = self.iter(guard1);
        iter.all(|(key, value)| other.load(key, guard2).is_some_and(|v| *value == *v))
    }
}

impl<K, V, S> Eq for SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Eq,
    S: BuildHasher + Clone,
{
}

impl<K, V, S> Extend<(K, V)> for &SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let guard = self.guard();

        for (key, value) in iter {
            self.store(key, value, &guard);
        }
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for &SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        let guard = self.guard();

        for (key, value) in iter {
            self.store(key.clone(), value.clone(), &guard);
        }
    }
}

impl<K, V, S> From<HashMap<K, V, S>> for SyncMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Creates a map from a `HashMap`, reusing its hasher.
    ///
    /// Every entry starts out in the read snapshot, so loads never take the lock
    /// until a new key is stored.
    fn from(entries: HashMap<K, V, S>) -> Self {
        SyncMap {
            raw: raw::SyncMap::from_entries(entries, Collector::new()),
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for SyncMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut entries = HashMap::with_hasher(S::default());
        entries.extend(iter);
        SyncMap::from(entries)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for SyncMap<K, V, RandomState>
where
    K: Hash + Eq,
{
    fn from(arr: [(K, V); N]) -> Self {
        SyncMap::from_iter(arr)
    }
}

/// A pinned reference to a [`SyncMap`].
///
/// This type is created with [`SyncMap::pin`] and can be used to easily access a [`SyncMap`]
/// without explicitly managing a guard. See the [crate-level documentation](crate#usage) for details.
pub struct SyncMapRef<'map, K, V, S, G> {
    guard: G,
    map: &'map SyncMap<K, V, S>,
}

impl<'map, K, V, S, G> SyncMapRef<'map, K, V, S, G>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
    G: Guard,
{
    /// Returns a reference to the inner [`SyncMap`].
    #[inline]
    pub fn map(&self) -> &'map SyncMap<K, V, S> {
        self.map
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn load<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.load(key, &self.guard)
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key, &self.guard)
    }

    /// Sets the value for a key.
    #[inline]
    pub fn store(&self, key: K, value: V) {
        self.map.store(key, value, &self.guard)
    }

    /// Sets the value for a key, returning the previous value.
    #[inline]
    pub fn swap(&self, key: K, value: V) -> Option<&V> {
        self.map.swap(key, value, &self.guard)
    }

    /// Returns the existing value for the key if present, otherwise stores the given value.
    #[inline]
    pub fn load_or_store(&self, key: K, value: V) -> LoadOrStore<'_, V> {
        self.map.load_or_store(key, value, &self.guard)
    }

    /// Deletes the value for a key, returning it if the key was present.
    #[inline]
    pub fn load_and_delete<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.load_and_delete(key, &self.guard)
    }

    /// Deletes the value for a key.
    #[inline]
    pub fn delete<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.delete(key, &self.guard)
    }

    /// Calls `f` for each key and value in the map, stopping early if `f` returns `false`.
    #[inline]
    pub fn range<F>(&self, f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.map.range(f, &self.guard)
    }

    /// An iterator visiting all key-value pairs in arbitrary order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V, G> {
        self.map.iter(&self.guard)
    }

    /// An iterator visiting all keys in arbitrary order.
    #[inline]
    pub fn keys(&self) -> Keys<'_, K, V, G> {
        self.map.keys(&self.guard)
    }

    /// An iterator visiting all values in arbitrary order.
    #[inline]
    pub fn values(&self) -> Values<'_, K, V, G> {
        self.map.values(&self.guard)
    }

    /// Returns the number of live entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if the map contains no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Removes every entry from the map.
    #[inline]
    pub fn clear(&self) {
        self.map.clear(&self.guard)
    }
}

impl<K, V, S, G> SyncMapRef<'_, K, V, S, G>
where
    K: Hash + Eq + Clone,
    V: PartialEq,
    S: BuildHasher + Clone,
    G: Guard,
{
    /// Swaps the value for a key if the current value is equal to `old`.
    #[inline]
    pub fn compare_and_swap<Q>(&self, key: &Q, old: &V, new: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.compare_and_swap(key, old, new, &self.guard)
    }

    /// Deletes the value for a key if it is equal to `old`.
    #[inline]
    pub fn compare_and_delete<Q>(&self, key: &Q, old: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.compare_and_delete(key, old, &self.guard)
    }
}

impl<K, V, S, G> fmt::Debug for SyncMapRef<'_, K, V, S, G>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher + Clone,
    G: Guard,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S, G> IntoIterator for &'a SyncMapRef<'_, K, V, S, G>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
    G: Guard,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, G>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over a map's entries.
///
/// This struct is created by the [`iter`](SyncMap::iter) method on [`SyncMap`]. See its
/// documentation for details.
pub struct Iter<'g, K, V, G> {
    raw: raw::Iter<'g, K, V, G>,
}

impl<'g, K: 'g, V: 'g, G> Iterator for Iter<'g, K, V, G>
where
    G: Guard,
{
    type Item = (&'g K, &'g V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next()
    }
}

/// An iterator over a map's keys.
///
/// This struct is created by the [`keys`](SyncMap::keys) method on [`SyncMap`]. See its
/// documentation for details.
pub struct Keys<'g, K, V, G> {
    iter: Iter<'g, K, V, G>,
}

impl<'g, K: 'g, V: 'g, G> Iterator for Keys<'g, K, V, G>
where
    G: Guard,
{
    type Item = &'g K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (key, _) = self.iter.next()?;
        Some(key)
    }
}

/// An iterator over a map's values.
///
/// This struct is created by the [`values`](SyncMap::values) method on [`SyncMap`]. See its
/// documentation for details.
pub struct Values<'g, K, V, G> {
    iter: Iter<'g, K, V, G>,
}

impl<'g, K: 'g, V: 'g, G> Iterator for Values<'g, K, V, G>
where
    G: Guard,
{
    type Item = &'g V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (_, value) = self.iter.next()?;
        Some(value)
    }
}
