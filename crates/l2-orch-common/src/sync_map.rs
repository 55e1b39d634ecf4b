//! Type-safe map wrapper that prevents auto-vivification bugs.
//!
//! In C++, `map[key].field = x` creates a default-constructed entry when
//! `key` does not exist. Applied to a membership table, that turns a
//! lookup of an unknown bridge or LAG into the silent creation of an
//! empty one. `SyncMap` provides explicit methods that never create
//! entries implicitly:
//!
//! - `get()` / `get_mut()` return `Option`
//! - entry creation only happens through `insert()` or
//!   `get_or_insert_with()`

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Error type for SyncMap operations.
#[derive(Debug, Clone, Error)]
pub enum SyncMapError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key already present")]
    DuplicateKey,
}

/// A type-safe map wrapper that prevents auto-vivification bugs.
///
/// Unlike `HashMap`, this type never creates entries implicitly.
/// All operations that might create entries are explicit.
///
/// # Example
///
/// ```
/// use l2_orch_common::SyncMap;
///
/// let mut map: SyncMap<String, i32> = SyncMap::new();
///
/// // get() returns None for missing keys (doesn't create entry)
/// assert!(map.get(&"missing".to_string()).is_none());
///
/// // Must explicitly insert
/// map.insert("key".to_string(), 42);
/// assert_eq!(map.get(&"key".to_string()), Some(&42));
/// ```
#[derive(Debug, Clone)]
pub struct SyncMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns true if the map contains the given key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns a reference to the value for the given key.
    ///
    /// Returns `None` if the key is not present.
    /// **This never creates entries.**
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns a mutable reference to the value for the given key.
    ///
    /// Returns `None` if the key is not present.
    /// **This never creates entries.**
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns the old value if the key was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Inserts a key-value pair only if the key is not already present.
    ///
    /// Returns `Err(DuplicateKey)` without touching the map otherwise.
    /// This is the right call for lifecycle events (LAG created, bridge
    /// announced) where a duplicate means the event stream is confused.
    pub fn insert_new(&mut self, key: K, value: V) -> Result<(), SyncMapError> {
        if self.inner.contains_key(&key) {
            return Err(SyncMapError::DuplicateKey);
        }
        self.inner.insert(key, value);
        Ok(())
    }

    /// Removes a key from the map.
    ///
    /// Returns the removed value if the key was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    /// Clears all entries from the map.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Returns an iterator over key-value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    /// Returns an iterator over keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    /// Returns an iterator over values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    /// Returns a mutable iterator over values.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.inner.values_mut()
    }

    /// Gets the value for a key, or inserts the value produced by `f`.
    ///
    /// Unlike `get()`, this method **will** create an entry if the key
    /// is not present. Use this when you explicitly want this behavior.
    pub fn get_or_insert_with<F>(&mut self, key: K, f: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        self.inner.entry(key).or_insert_with(f)
    }
}

impl<K, V> Default for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
