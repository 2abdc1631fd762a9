mod atomic_box;
mod entry;
mod utils;

pub use atomic_box::AtomicBox;

use std::borrow::Borrow;
use std::collections::hash_map;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::{Arc, Mutex};

use self::entry::{Entry, EntryState};
use self::utils::lock;

use seize::{reclaim, Collector, Guard, LocalGuard, OwnedGuard};

/// A concurrent map with a lock-free read snapshot and a locked dirty overlay.
pub struct SyncMap<K, V, S> {
    /// The read snapshot.
    ///
    /// Always non-null. Readers can access it without holding the lock, and
    /// entries in it can be updated in place without the lock as well.
    read: AtomicBox<ReadOnly<K, V, S>>,

    /// The dirty map and miss counter.
    dirty: Mutex<Dirty<K, V, S>>,

    /// Collector for memory reclamation.
    collector: Collector,

    /// Hasher for the read and dirty maps.
    pub hasher: S,
}

type Entries<K, V, S> = HashMap<K, Arc<Entry<V>>, S>;

/// An immutable snapshot of the map.
struct ReadOnly<K, V, S> {
    /// The entries of the snapshot.
    ///
    /// Shared with any snapshot that was republished with a different
    /// `amended` flag.
    entries: Arc<Entries<K, V, S>>,

    /// The dirty map contains keys that are not in `entries`.
    amended: bool,
}

/// State protected by the lock.
struct Dirty<K, V, S> {
    /// Every non-expunged entry of the read snapshot, along with any new keys.
    ///
    /// `None` until the first new key is stored after a promotion.
    entries: Option<Entries<K, V, S>>,

    /// The number of loads that had to take the lock since the last promotion.
    misses: usize,
}

/// The result of a `load_or_store` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrStore<'g, V> {
    /// The key was present, the given value was not stored.
    Loaded(&'g V),

    /// The key was absent and the given value was stored.
    Stored(&'g V),
}

impl<K, V, S> SyncMap<K, V, S>
where
    S: Clone,
{
    /// Creates an empty map.
    pub fn new(hasher: S, collector: Collector) -> SyncMap<K, V, S> {
        SyncMap {
            read: AtomicBox::new(ReadOnly {
                entries: Arc::new(HashMap::with_hasher(hasher.clone())),
                amended: false,
            }),
            dirty: Mutex::new(Dirty {
                entries: None,
                misses: 0,
            }),
            collector,
            hasher,
        }
    }
}

impl<K, V, S> SyncMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Creates a map holding the given entries, all of them in the read snapshot.
    pub fn from_entries(entries: HashMap<K, V, S>, collector: Collector) -> SyncMap<K, V, S> {
        let hasher = entries.hasher().clone();

        let mut read = HashMap::with_capacity_and_hasher(entries.len(), hasher.clone());
        read.extend(
            entries
                .into_iter()
                .map(|(key, value)| (key, Arc::new(Entry::new(value)))),
        );

        SyncMap {
            read: AtomicBox::new(ReadOnly {
                entries: Arc::new(read),
                amended: false,
            }),
            dirty: Mutex::new(Dirty {
                entries: None,
                misses: 0,
            }),
            collector,
            hasher,
        }
    }
}

impl<K, V, S> SyncMap<K, V, S> {
    /// Returns a guard for this collector.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Returns an owned guard for this collector.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.collector.enter_owned()
    }

    /// Returns a reference to the collector.
    #[inline]
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Verify a guard is valid to use with this map.
    #[inline]
    pub fn check_guard(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "Attempted to access map with incorrect guard"
        );
    }

    /// Returns the current read snapshot.
    #[inline]
    fn read<'g>(&self, guard: &'g impl Guard) -> &'g ReadOnly<K, V, S> {
        // Safety: The caller verified the guard, and the snapshot is initialized
        // in `new` and only ever replaced afterwards.
        match unsafe { self.read.load(guard) } {
            Some(read) => read,
            None => unreachable!("the read snapshot is never null"),
        }
    }

    /// Publishes a new read snapshot.
    ///
    /// Must be called with the lock held.
    #[inline]
    fn publish_locked(&self, read: ReadOnly<K, V, S>, guard: &impl Guard) {
        // Safety: The caller verified the guard.
        unsafe { self.read.store(read, guard) };
    }

    /// Promotes the dirty map to the read snapshot.
    ///
    /// Must be called with the lock held.
    fn promote_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &impl Guard) {
        let entries = dirty.entries.take();
        dirty.misses = 0;

        if let Some(entries) = entries {
            self.publish_locked(
                ReadOnly {
                    entries: Arc::new(entries),
                    amended: false,
                },
                guard,
            );
        }
    }

    /// Records a load that could not be satisfied by the read snapshot.
    ///
    /// Once the cost of the misses has covered the cost of copying the dirty map,
    /// the dirty map is promoted. Must be called with the lock held.
    fn miss_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &impl Guard) {
        dirty.misses += 1;

        let len = dirty.entries.as_ref().map_or(0, HashMap::len);
        if dirty.misses < len {
            return;
        }

        tracing::trace!(misses = dirty.misses, entries = len, "promoting dirty map");
        self.promote_locked(dirty, guard);
    }

    /// Defers dropping a value until no readers can observe it.
    #[inline]
    fn defer_drop<T>(&self, value: T, guard: &impl Guard) {
        let value = Box::into_raw(Box::new(value));

        // Safety: The value was just allocated and is owned by us.
        unsafe { guard.defer_retire(value, reclaim::boxed::<T>) };
    }
}

impl<K, V, S> SyncMap<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
{
    /// Ensures the dirty map exists, seeding it from the read snapshot.
    ///
    /// Deleted entries of the snapshot are expunged and left out. Must be called
    /// with the lock held.
    fn seed_dirty_locked(&self, dirty: &mut Dirty<K, V, S>, guard: &impl Guard) {
        if dirty.entries.is_some() {
            return;
        }

        let read = self.read(guard);
        let mut entries =
            HashMap::with_capacity_and_hasher(read.entries.len(), self.hasher.clone());

        // A panic in user code would leave the snapshot expunged without a dirty map.
        let mut expunged = Unexpunge(Vec::new());

        for (key, entry) in read.entries.iter() {
            if entry.try_expunge_locked() {
                expunged.0.push(entry);
            } else {
                entries.insert(key.clone(), entry.clone());
            }
        }

        expunged.0.clear();

        tracing::trace!(
            snapshot = read.entries.len(),
            seeded = entries.len(),
            "seeded dirty map"
        );

        dirty.entries = Some(entries);
    }

    /// Registers an expunged entry of the read snapshot in the dirty map.
    ///
    /// Does nothing if the entry is not expunged. Must be called with the lock held.
    fn unexpunge_locked(
        &self,
        dirty: &mut Dirty<K, V, S>,
        key: K,
        entry: &Arc<Entry<V>>,
        guard: &impl Guard,
    ) {
        if !matches!(entry.state(guard), EntryState::Expunged) {
            return;
        }

        // Insert before clearing the marker, so the entry stays expunged if
        // hashing the key panics.
        match dirty.entries.as_mut() {
            Some(entries) => entries.insert(key, entry.clone()),
            None => unreachable!("entries are only expunged when seeding the dirty map"),
        };

        entry.unexpunge_locked();
    }

    /// Inserts a new entry into the dirty map, marking the read snapshot as amended.
    ///
    /// Must be called with the lock held, and the key must not be present in the
    /// read snapshot or dirty map.
    fn insert_locked<'g>(
        &self,
        dirty: &mut Dirty<K, V, S>,
        key: K,
        value: V,
        guard: &'g impl Guard,
    ) -> &'g V {
        let read = self.read(guard);

        if !read.amended {
            self.seed_dirty_locked(dirty, guard);
            self.publish_locked(
                ReadOnly {
                    entries: read.entries.clone(),
                    amended: true,
                },
                guard,
            );
        }

        let entry = Arc::new(Entry::new(value));
        let stored = entry.load(guard);

        match dirty.entries.as_mut() {
            Some(entries) => entries.insert(key, entry),
            None => unreachable!("the dirty map is seeded before it is amended"),
        };

        match stored {
            Some(value) => value,
            None => unreachable!("a new entry always holds a value"),
        }
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn load<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            return entry.load(guard);
        }

        if !read.amended {
            return None;
        }

        let mut dirty = lock(&self.dirty);

        // The snapshot may have been promoted while we were waiting for the lock.
        let read = self.read(guard);
        if let Some(entry) = read.entries.get(key) {
            return entry.load(guard);
        }

        if !read.amended {
            return None;
        }

        let value = dirty
            .entries
            .as_ref()
            .and_then(|entries| entries.get(key))
            .and_then(|entry| entry.load(guard));

        self.miss_locked(&mut dirty, guard);
        value
    }

    /// Sets the value for a key, returning the previous value.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn swap<'g>(&self, key: K, value: V, guard: &'g impl Guard) -> Option<&'g V> {
        let read = self.read(guard);

        let value = match read.entries.get(&key) {
            Some(entry) => match entry.try_swap(value, guard) {
                Ok(previous) => return previous,
                // The entry was expunged, we have to register it in the dirty map.
                Err(value) => value,
            },
            None => value,
        };

        let mut dirty = lock(&self.dirty);
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(&key) {
            self.unexpunge_locked(&mut dirty, key, entry, guard);

            return entry.swap_locked(value, guard);
        }

        if let Some(entry) = dirty.entries.as_ref().and_then(|entries| entries.get(&key)) {
            return entry.swap_locked(value, guard);
        }

        self.insert_locked(&mut dirty, key, value, guard);
        None
    }

    /// Returns the existing value for the key if present, otherwise stores the
    /// given value.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn load_or_store<'g>(
        &self,
        key: K,
        value: V,
        guard: &'g impl Guard,
    ) -> LoadOrStore<'g, V> {
        let read = self.read(guard);

        let value = match read.entries.get(&key) {
            Some(entry) => match entry.try_load_or_store(value, guard) {
                entry::LoadOrStore::Loaded(value) => return LoadOrStore::Loaded(value),
                entry::LoadOrStore::Stored(value) => return LoadOrStore::Stored(value),
                entry::LoadOrStore::Expunged(value) => value,
            },
            None => value,
        };

        let mut dirty = lock(&self.dirty);
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(&key) {
            self.unexpunge_locked(&mut dirty, key, entry, guard);

            return match entry.try_load_or_store(value, guard) {
                entry::LoadOrStore::Loaded(value) => LoadOrStore::Loaded(value),
                entry::LoadOrStore::Stored(value) => LoadOrStore::Stored(value),
                entry::LoadOrStore::Expunged(_) => {
                    unreachable!("entries cannot be expunged while the lock is held")
                }
            };
        }

        if let Some(entry) = dirty.entries.as_ref().and_then(|entries| entries.get(&key)) {
            let result = match entry.try_load_or_store(value, guard) {
                entry::LoadOrStore::Loaded(value) => LoadOrStore::Loaded(value),
                entry::LoadOrStore::Stored(value) => LoadOrStore::Stored(value),
                entry::LoadOrStore::Expunged(_) => {
                    unreachable!("entries in the dirty map are never expunged")
                }
            };

            self.miss_locked(&mut dirty, guard);
            return result;
        }

        LoadOrStore::Stored(self.insert_locked(&mut dirty, key, value, guard))
    }

    /// Deletes the value for a key, returning the previous value.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn load_and_delete<'g, Q>(&self, key: &Q, guard: &'g impl Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            return entry.delete(guard);
        }

        if !read.amended {
            return None;
        }

        let mut dirty = lock(&self.dirty);
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            drop(dirty);
            return entry.delete(guard);
        }

        if !read.amended {
            return None;
        }

        // Keys only in the dirty map are removed outright, readers never
        // access the dirty map without the lock.
        let removed = dirty
            .entries
            .as_mut()
            .and_then(|entries| entries.remove(key));

        let value = removed.map(|entry| {
            let value = entry.delete(guard);
            self.defer_drop(entry, guard);
            value
        });

        self.miss_locked(&mut dirty, guard);
        value.flatten()
    }

    /// Visits every live entry of the map, promoting the dirty map first.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn iter<'g, G>(&self, guard: &'g G) -> Iter<'g, K, V, G>
    where
        G: Guard,
        S: 'g,
    {
        let read = self.read(guard);

        if read.amended {
            let mut dirty = lock(&self.dirty);

            // Ranging already costs as much as copying the dirty map, so the
            // promotion is amortized by this call.
            if self.read(guard).amended {
                tracing::trace!(
                    misses = dirty.misses,
                    "promoting dirty map before iteration"
                );

                self.promote_locked(&mut dirty, guard);
            }
        }

        Iter {
            raw: self.read(guard).entries.iter(),
            guard,
        }
    }

    /// Removes every entry from the map.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn clear(&self, guard: &impl Guard) {
        let read = self.read(guard);

        if read.entries.is_empty() && !read.amended {
            return;
        }

        let mut dirty = lock(&self.dirty);
        let read = self.read(guard);

        if !read.entries.is_empty() || read.amended {
            self.publish_locked(
                ReadOnly {
                    entries: Arc::new(HashMap::with_hasher(self.hasher.clone())),
                    amended: false,
                },
                guard,
            );
        }

        if let Some(entries) = dirty.entries.take() {
            tracing::trace!(entries = entries.len(), "cleared dirty map");
            self.defer_drop(entries, guard);
        }

        dirty.misses = 0;
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
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn compare_and_swap<Q>(&self, key: &Q, old: &V, new: V, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            return entry.try_compare_and_swap(old, new, guard);
        }

        if !read.amended {
            return false;
        }

        let mut dirty = lock(&self.dirty);
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            return entry.try_compare_and_swap(old, new, guard);
        }

        let swapped = match dirty.entries.as_ref().and_then(|entries| entries.get(key)) {
            Some(entry) => entry.try_compare_and_swap(old, new, guard),
            None => return false,
        };

        self.miss_locked(&mut dirty, guard);
        swapped
    }

    /// Deletes the value for a key if it is equal to `old`.
    ///
    /// # Safety
    ///
    /// The guard must be valid to use with this map.
    #[inline]
    pub unsafe fn compare_and_delete<Q>(&self, key: &Q, old: &V, guard: &impl Guard) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            return entry.try_compare_and_delete(old, guard);
        }

        if !read.amended {
            return false;
        }

        let mut dirty = lock(&self.dirty);
        let read = self.read(guard);

        if let Some(entry) = read.entries.get(key) {
            drop(dirty);
            return entry.try_compare_and_delete(old, guard);
        }

        if !read.amended {
            return false;
        }

        // The key stays in the dirty map, the comparison may fail.
        let deleted = dirty
            .entries
            .as_ref()
            .and_then(|entries| entries.get(key))
            .is_some_and(|entry| entry.try_compare_and_delete(old, guard));

        self.miss_locked(&mut dirty, guard);
        deleted
    }
}

// Clears the expunged marker of the given entries when dropped.
struct Unexpunge<'a, V>(Vec<&'a Arc<Entry<V>>>);

impl<V> Drop for Unexpunge<'_, V> {
    fn drop(&mut self) {
        for entry in self.0.drain(..) {
            entry.unexpunge_locked();
        }
    }
}

/// An iterator over the live entries of a read snapshot.
pub struct Iter<'g, K, V, G> {
    raw: hash_map::Iter<'g, K, Arc<Entry<V>>>,
    guard: &'g G,
}

impl<'g, K, V, G> Iterator for Iter<'g, K, V, G>
where
    G: Guard,
{
    type Item = (&'g K, &'g V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, entry) = self.raw.next()?;

            match entry.state(self.guard) {
                EntryState::Live(_, value) => return Some((key, value)),
                EntryState::Deleted | EntryState::Expunged => continue,
            }
        }
    }
}

impl<K, V, S> Drop for SyncMap<K, V, S> {
    fn drop(&mut self) {
        // Make sure all retired snapshots, slots and entries are reclaimed before
        // the current snapshot and dirty map are dropped.
        //
        // Safety: We have a unique reference to the collector.
        unsafe { self.collector.reclaim_all() };
    }
}
