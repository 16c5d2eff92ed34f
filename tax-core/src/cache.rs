//! Bounded read-through cache shared by the calculation components.
//!
//! Every value the engine memoizes is a pure function of its key, so
//! entries never go stale; the bound only limits memory as the
//! (jurisdiction, year) key space grows. Eviction is least-recently-used.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Entries<K, V> {
    map: HashMap<K, V>,
    recency: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> Entries<K, V> {
    fn touch(
        &mut self,
        key: &K,
    ) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key.clone());
    }
}

pub struct BoundedCache<K, V> {
    inner: Mutex<Entries<K, V>>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Entries {
                map: HashMap::new(),
                recency: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries<K, V>> {
        // Entries stay consistent even if a holder panicked mid-insert.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        let mut entries = self.lock();
        let value = entries.map.get(key).cloned()?;
        entries.touch(key);
        Some(value)
    }

    pub fn insert(
        &self,
        key: K,
        value: V,
    ) {
        let mut entries = self.lock();
        entries.map.insert(key.clone(), value);
        entries.touch(&key);
        while entries.recency.len() > self.capacity {
            if let Some(oldest) = entries.recency.pop_front() {
                entries.map.remove(&oldest);
            }
        }
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// The lock is not held while `compute` runs, so concurrent misses on
    /// the same key may compute twice; both produce the same value. Errors
    /// are returned as-is and nothing is stored.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.recency.clear();
    }
}
