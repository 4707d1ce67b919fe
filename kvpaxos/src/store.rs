//! # Summary
//!
//! In-memory key/value map replicated by the cluster. Only the learner
//! writes to it; reads go straight to the map without any coordination,
//! so a node may briefly lag behind writes it has not learned yet.

use hashbrown::HashMap as Map;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct Store(RwLock<Map<String, String>>);

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.0.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    /// Returns the value previously stored under `key`.
    pub fn put(&self, key: String, value: String) -> Option<String> {
        self.0.write().insert(key, value)
    }

    /// Returns the removed value, if `key` was present.
    pub fn delete(&self, key: &str) -> Option<String> {
        self.0.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every entry.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries = self.0.read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Vec<_>>();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = Store::new();
        assert_eq!(store.get("x"), None);
        assert_eq!(store.put("x".into(), "1".into()), None);
        assert_eq!(store.put("x".into(), "2".into()), Some("1".into()));
        assert_eq!(store.get("x"), Some("2".into()));
        assert!(store.contains("x"));
        assert_eq!(store.delete("x"), Some("2".into()));
        assert_eq!(store.delete("x"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn entries_are_sorted() {
        let store = Store::new();
        store.put("b".into(), "2".into());
        store.put("a".into(), "1".into());
        assert_eq!(
            store.entries(),
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())],
        );
    }
}
