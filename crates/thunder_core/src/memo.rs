//! Single-evaluation caches.
//!
//! `Memo` holds one lazily computed value, `MemoMap` holds one per key. Both
//! evaluate their initializer at most once per slot, even when shared across
//! threads, and hand out clones afterwards.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// A cell whose value is computed on first access.
pub struct Memo<T> {
    cell: OnceCell<T>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Memo<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Return the cached value, computing it with `init` the first time.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        self.cell.get_or_init(init)
    }

    /// Fallible variant of [`Memo::get_or_init`]. A failed initialization is
    /// not cached; the next call runs `init` again.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        self.cell.get_or_try_init(init)
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("Memo").field(value).finish(),
            None => f.write_str("Memo(<uninit>)"),
        }
    }
}

/// A keyed cache where each key is computed at most once.
///
/// The map lock is only held while locating the slot for a key, so an
/// initializer may itself consult the map for other keys.
pub struct MemoMap<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for MemoMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MemoMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: K) -> Arc<OnceCell<V>> {
        self.slots.lock().entry(key).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots
            .lock()
            .get(key)
            .map_or(false, |slot| slot.get().is_some())
    }
}

impl<K, V> MemoMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Return the value cached for `key`, computing it with `init` the first time.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> V {
        self.slot(key).get_or_init(init).clone()
    }

    /// Fallible variant of [`MemoMap::get_or_insert_with`]; errors are not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        self.slot(key).get_or_try_init(init).cloned()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.slots.lock().get(key).and_then(|slot| slot.get().cloned())
    }
}

impl<K: fmt::Debug, V> fmt::Debug for MemoMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoMap")
            .field("keys", &self.slots.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
