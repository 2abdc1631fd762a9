use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::collections::HashMap;
use std::fmt::{self, Formatter};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::{Guard, SyncMap, SyncMapRef};

const MAX_PREALLOCATED: usize = 4096;

struct MapVisitor<K, V, S> {
    _marker: PhantomData<SyncMap<K, V, S>>,
}

impl<K, V, S, G> Serialize for SyncMapRef<'_, K, V, S, G>
where
    K: Serialize + Hash + Eq + Clone,
    V: Serialize,
    G: Guard,
    S: BuildHasher + Clone,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        serializer.collect_map(self)
    }
}

impl<K, V, S> Serialize for SyncMap<K, V, S>
where
    K: Serialize + Hash + Eq + Clone,
    V: Serialize,
    S: BuildHasher + Clone,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.pin().serialize(serializer)
    }
}

impl<'de, K, V, S> Deserialize<'de> for SyncMap<K, V, S>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
    S: Default + BuildHasher + Clone,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(MapVisitor::new())
    }
}

impl<K, V, S> MapVisitor<K, V, S> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<'de, K, V, S> Visitor<'de> for MapVisitor<K, V, S>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
    S: Default + BuildHasher + Clone,
{
    type Value = SyncMap<K, V, S>;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a map")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        // Size hints come from the input, don't trust them with large allocations.
        let capacity = access.size_hint().unwrap_or(0).min(MAX_PREALLOCATED);
        let mut entries = HashMap::with_capacity_and_hasher(capacity, S::default());

        while let Some((key, value)) = access.next_entry()? {
            entries.insert(key, value);
        }

        // Everything lands in the read snapshot, no promotion needed.
        Ok(SyncMap::from(entries))
    }
}
