//! Keyed map of reclaimable entries.
//!
//! The map never keeps a value alive on its own. Each slot holds a weak
//! reference, so a value lives exactly as long as some caller holds an `Arc`
//! to it. Once the last holder lets go the slot is dead and the next lookup
//! derives the value again.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::{InventoryError, Result};

/// Weak handle to a shared value.
#[derive(Debug)]
pub struct ReclaimableRef<T> {
    weak: Weak<T>,
}

impl<T> ReclaimableRef<T> {
    pub fn new(value: &Arc<T>) -> Self {
        Self {
            weak: Arc::downgrade(value),
        }
    }

    /// Strong handle, if the value is still held somewhere.
    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.weak.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.weak.strong_count() > 0
    }
}

impl<T> Clone for ReclaimableRef<T> {
    fn clone(&self) -> Self {
        Self {
            weak: Weak::clone(&self.weak),
        }
    }
}

/// Outcome of publishing a freshly derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The new value now occupies the slot.
    Inserted,
    /// Another caller published a live value first; the new one was discarded.
    Existing,
}

/// Map from key to reclaimable value.
///
/// The lock is held only for slot lookups and updates, never while a value
/// is being derived.
#[derive(Debug)]
pub struct ReclaimableMap<K, T> {
    slots: Mutex<HashMap<K, ReclaimableRef<T>>>,
}

impl<K: Eq + Hash, T> Default for ReclaimableMap<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, T> ReclaimableMap<K, T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> Result<MutexGuard<'_, HashMap<K, ReclaimableRef<T>>>> {
        self.slots
            .lock()
            .map_err(|e| InventoryError::Other(format!("Failed to lock reclaimable map: {}", e)))
    }

    /// Live value for `key`, if any.
    pub fn get(&self, key: &K) -> Result<Option<Arc<T>>> {
        Ok(self.slots()?.get(key).and_then(ReclaimableRef::upgrade))
    }

    /// Publish `value` under `key` unless a live value is already there.
    ///
    /// Returns the value every caller should use from now on together with
    /// whether `value` itself was kept. Dead slots are pruned on the way.
    pub fn publish(&self, key: K, value: Arc<T>) -> Result<(Arc<T>, Publish)> {
        let mut slots = self.slots()?;
        if let Some(existing) = slots.get(&key).and_then(ReclaimableRef::upgrade) {
            return Ok((existing, Publish::Existing));
        }
        slots.retain(|_, slot| slot.is_live());
        slots.insert(key, ReclaimableRef::new(&value));
        Ok((value, Publish::Inserted))
    }

    /// Drop every dead slot. Returns how many were removed.
    pub fn purge(&self) -> Result<usize> {
        let mut slots = self.slots()?;
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live());
        Ok(before - slots.len())
    }

    /// Number of live and dead slots.
    pub fn counts(&self) -> Result<(usize, usize)> {
        let slots = self.slots()?;
        let live = slots.values().filter(|slot| slot.is_live()).count();
        Ok((live, slots.len() - live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_lives_while_held() {
        let map = ReclaimableMap::new();
        let value = Arc::new(7);
        map.publish("a", Arc::clone(&value)).unwrap();

        let found = map.get(&"a").unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &value));
        assert_eq!(map.counts().unwrap(), (1, 0));
    }

    #[test]
    fn test_slot_dies_after_last_holder() {
        let map = ReclaimableMap::new();
        let (value, _) = map.publish("a", Arc::new(7)).unwrap();
        let weak = ReclaimableRef::new(&value);
        drop(value);

        assert!(!weak.is_live());
        assert!(map.get(&"a").unwrap().is_none());
        assert_eq!(map.counts().unwrap(), (0, 1));
        assert_eq!(map.purge().unwrap(), 1);
        assert_eq!(map.counts().unwrap(), (0, 0));
    }

    #[test]
    fn test_second_publisher_gets_existing() {
        let map = ReclaimableMap::new();
        let (first, outcome) = map.publish("a", Arc::new(1)).unwrap();
        assert_eq!(outcome, Publish::Inserted);

        let (second, outcome) = map.publish("a", Arc::new(2)).unwrap();
        assert_eq!(outcome, Publish::Existing);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 1);
    }

    #[test]
    fn test_publish_replaces_dead_slot() {
        let map = ReclaimableMap::new();
        drop(map.publish("a", Arc::new(1)).unwrap());
        let (value, outcome) = map.publish("a", Arc::new(2)).unwrap();
        assert_eq!(outcome, Publish::Inserted);
        assert_eq!(*value, 2);
    }

    #[test]
    fn test_publish_prunes_other_dead_slots() {
        let map = ReclaimableMap::new();
        drop(map.publish("a", Arc::new(1)).unwrap());
        let _held = map.publish("b", Arc::new(2)).unwrap();
        assert_eq!(map.counts().unwrap(), (1, 0));
    }
}
