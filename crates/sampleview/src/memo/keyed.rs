use super::CacheStats;
use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::time::Instant;

/// An `Rc` that hashes and compares by address.
///
/// Holding the `Rc` keeps the allocation alive, so an address stored in a
/// cache key can never be reused by a different value while the key exists.
#[derive(Debug)]
pub struct ByAddress<T: ?Sized>(pub Rc<T>);

impl<T: ?Sized> Clone for ByAddress<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: ?Sized> PartialEq for ByAddress<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for ByAddress<T> {}

impl<T: ?Sized> Hash for ByAddress<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

/// Unbounded cache of every result computed for a key.
///
/// Entries are never evicted; the cache lives exactly as long as its owner.
pub struct KeyedCache<K, V> {
    name: &'static str,
    entries: RefCell<HashMap<K, V>>,
    stats: Cell<CacheStats>,
}

impl<K: Eq + Hash, V: Clone> KeyedCache<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RefCell::new(HashMap::new()),
            stats: Cell::new(CacheStats::default()),
        }
    }

    /// Look `key` up, computing and storing the value on a miss. A failed
    /// computation stores nothing.
    pub fn get_or_try_insert_with(&self, key: K, compute: impl FnOnce(&K) -> Result<V>) -> Result<V> {
        if let Some(value) = self.entries.borrow().get(&key) {
            self.stats.set(self.stats.get().hit());
            log::trace!("keyed cache hit: {}", self.name);
            return Ok(value.clone());
        }

        let started = Instant::now();
        let value = compute(&key)?;
        self.stats.set(self.stats.get().miss());
        log::debug!(
            "keyed cache fill: {} ({:.2?}, {} entries)",
            self.name,
            started.elapsed(),
            self.entries.borrow().len() + 1
        );

        self.entries.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }
}

impl<K, V> fmt::Debug for KeyedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("name", &self.name)
            .field("entries", &self.entries.borrow().len())
            .field("stats", &self.stats.get())
            .finish()
    }
}
