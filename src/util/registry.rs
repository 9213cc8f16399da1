//! Identity-keyed shared collection
//!
//! Every shared collection in the server (connections, players, spores) is a
//! `Registry`. A single lock guards the map and the id counter. Iteration works
//! on a copy taken under the lock and runs callbacks with the lock released, so
//! callbacks may call back into the registry, including to mutate it.

use hashbrown::HashMap;
use parking_lot::Mutex;

/// Identity of an entry in a registry
pub type EntityId = u64;

struct Inner<T> {
    objects: HashMap<EntityId, T>,
    next_id: EntityId,
}

/// Thread-safe map from auto-incrementing ids to values
pub struct Registry<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                objects: HashMap::with_capacity(capacity),
                next_id: 1,
            }),
        }
    }

    /// Insert a value and return its id
    ///
    /// With `Some(id)` the value is stored under that id, replacing any value
    /// already there. With `None` the next unused id is allocated; allocated ids
    /// are strictly increasing and never handed out twice.
    pub fn insert(&self, value: T, id: Option<EntityId>) -> EntityId {
        let mut inner = self.inner.lock();

        let id = match id {
            Some(id) => id,
            None => {
                while inner.objects.contains_key(&inner.next_id) {
                    inner.next_id += 1;
                }
                let id = inner.next_id;
                inner.next_id += 1;
                id
            }
        };

        inner.objects.insert(id, value);
        id
    }

    /// Remove an entry, returning it if it was present
    pub fn remove(&self, id: EntityId) -> Option<T> {
        self.inner.lock().objects.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<T> {
        self.inner.lock().objects.get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.inner.lock().objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> Vec<(EntityId, T)> {
        let inner = self.inner.lock();
        inner
            .objects
            .iter()
            .map(|(id, value)| (*id, value.clone()))
            .collect()
    }

    /// Call `callback` for every entry of a snapshot, with the lock released
    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(EntityId, &T),
    {
        for (id, value) in self.snapshot() {
            callback(id, &value);
        }
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
