//! Per-run font build cache.
//!
//! Generated fonts are cached per `(input_entity, output_entity)` pair and
//! prebuilt pair files per `(source, target)` codepoint pair. Builds for
//! distinct keys run concurrently; a build for one key runs at most once,
//! guarded by a per-key lock rather than a lock over the whole cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cache of generated strategy fonts keyed by entity pair.
pub type EntityFontCache = FontCache<(String, String), Vec<Vec<u8>>>;

/// Cache of prebuilt pair fonts keyed by codepoint pair.
pub type PairFontCache = FontCache<(char, char), Vec<u8>>;

type Slot<V> = Arc<Mutex<Option<Arc<V>>>>;

/// A keyed once-build cache.
#[derive(Debug, Default)]
pub struct FontCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<K: Eq + Hash + Clone, V> FontCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, building it if absent.
    ///
    /// The build runs under the key's own lock, so concurrent callers for
    /// the same key wait for the one build instead of duplicating it,
    /// while other keys proceed. A failed build caches nothing; the next
    /// caller retries.
    pub fn get_or_build<F, E>(&self, key: K, build: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = {
            let mut slots = lock_ignoring_poison(&self.slots);
            slots.entry(key).or_default().clone()
        };

        let mut guard = lock_ignoring_poison(&slot);
        if let Some(value) = guard.as_ref() {
            return Ok(value.clone());
        }
        let value = Arc::new(build()?);
        *guard = Some(value.clone());
        Ok(value)
    }

    /// The cached value for `key`, if a build completed.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = lock_ignoring_poison(&self.slots).get(key).cloned()?;
        let guard = lock_ignoring_poison(&slot);
        guard.clone()
    }

    /// Number of keys with a completed build.
    pub fn len(&self) -> usize {
        let slots = lock_ignoring_poison(&self.slots);
        slots
            .values()
            .filter(|slot| lock_ignoring_poison(slot).is_some())
            .count()
    }

    /// Whether no build has completed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
