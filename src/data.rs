use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct Bag {
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// The shared key-value bag steps read from and write to.
///
/// `WorkflowData` is the sole channel of inter-step communication: every step
/// in a run observes the cumulative effect of the steps that wrote before it.
/// Values are [`serde_json::Value`], so anything a configuration file can
/// express can flow through the bag. A separate metadata map carries
/// diagnostic entries that are not step payload.
///
/// The bag uses an interior lock so one instance can be shared across the
/// parallel tasks of a single run. The lock guards each individual operation;
/// it does not make concurrent writes to the *same* key meaningful: in
/// parallel mode overlapping writes are last-writer-wins, and steps executed
/// concurrently must write disjoint key sets. That discipline is the caller's
/// contract, not something the bag enforces.
///
/// # Examples
///
/// ```
/// use stepflow::WorkflowData;
/// use serde_json::json;
///
/// let data = WorkflowData::new();
/// data.set("topic", json!("spring"));
///
/// assert_eq!(data.get("topic"), Some(json!("spring")));
/// assert_eq!(data.get("missing"), None);
/// assert_eq!(data.get_or("style", json!("classical")), json!("classical"));
/// ```
#[derive(Debug, Default)]
pub struct WorkflowData {
    inner: RwLock<Bag>,
}

impl WorkflowData {
    /// Creates a new empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag seeded with the given entries.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            inner: RwLock::new(Bag {
                data,
                metadata: Map::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Bag> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Bag> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a clone of the value for the given key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().data.get(key).cloned()
    }

    /// Returns the value for the given key, or `default` if absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Sets a value, replacing any previous value for the key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.write().data.insert(key.into(), value);
    }

    /// Merges the given entries into the bag, overwriting existing keys.
    pub fn update(&self, entries: Map<String, Value>) {
        self.write().data.extend(entries);
    }

    /// Returns `true` if the bag contains the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.read().data.contains_key(key)
    }

    /// Removes a value by key and returns it.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().data.remove(key)
    }

    /// Returns all keys currently in the bag.
    pub fn keys(&self) -> Vec<String> {
        self.read().data.keys().cloned().collect()
    }

    /// Returns the number of entries in the bag.
    pub fn len(&self) -> usize {
        self.read().data.len()
    }

    /// Returns `true` if the bag contains no entries.
    pub fn is_empty(&self) -> bool {
        self.read().data.is_empty()
    }

    /// Sets a metadata entry.
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.write().metadata.insert(key.into(), value);
    }

    /// Returns a clone of the metadata value for the given key.
    pub fn get_metadata(&self, key: &str) -> Option<Value> {
        self.read().metadata.get(key).cloned()
    }

    /// Returns a point-in-time copy of all data entries.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.read().data.clone()
    }

    /// Returns a point-in-time copy of all metadata entries.
    pub fn metadata_snapshot(&self) -> Map<String, Value> {
        self.read().metadata.clone()
    }
}

impl Clone for WorkflowData {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.read().clone()),
        }
    }
}

impl PartialEq for WorkflowData {
    fn eq(&self, other: &Self) -> bool {
        *self.read() == *other.read()
    }
}

impl Serialize for WorkflowData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WorkflowData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bag = Bag::deserialize(deserializer)?;
        Ok(Self {
            inner: RwLock::new(bag),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_operations() {
        let data = WorkflowData::new();

        data.set("key1", json!("value1"));
        assert_eq!(data.get("key1"), Some(json!("value1")));
        assert_eq!(data.get("nonexistent"), None);
        assert!(data.contains("key1"));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_get_or_default() {
        let data = WorkflowData::new();
        data.set("present", json!(1));

        assert_eq!(data.get_or("present", json!(0)), json!(1));
        assert_eq!(data.get_or("absent", json!(0)), json!(0));
    }

    #[test]
    fn test_update_merges_entries() {
        let data = WorkflowData::new();
        data.set("a", json!(1));

        let mut entries = Map::new();
        entries.insert("a".to_string(), json!(2));
        entries.insert("b".to_string(), json!(3));
        data.update(entries);

        assert_eq!(data.get("a"), Some(json!(2)));
        assert_eq!(data.get("b"), Some(json!(3)));
    }

    #[test]
    fn test_remove() {
        let data = WorkflowData::new();
        data.set("key", json!("value"));

        assert_eq!(data.remove("key"), Some(json!("value")));
        assert!(!data.contains("key"));
        assert_eq!(data.remove("key"), None);
    }

    #[test]
    fn test_metadata_operations() {
        let data = WorkflowData::new();

        data.set_metadata("source", json!("test"));
        assert_eq!(data.get_metadata("source"), Some(json!("test")));
        assert_eq!(data.get_metadata("nonexistent"), None);
        // Metadata lives apart from the data entries.
        assert!(data.is_empty());
    }

    #[test]
    fn test_from_map_seeds_entries() {
        let mut seed = Map::new();
        seed.insert("topic".to_string(), json!("spring"));

        let data = WorkflowData::from_map(seed);
        assert_eq!(data.get("topic"), Some(json!("spring")));
        assert_eq!(data.keys(), vec!["topic".to_string()]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let data = WorkflowData::new();
        data.set("a", json!("hi"));
        data.set_metadata("run", json!(1));

        let encoded = serde_json::to_string(&data).expect("serializes");
        let decoded: WorkflowData = serde_json::from_str(&encoded).expect("deserializes");

        assert_eq!(decoded, data);
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let data = Arc::new(WorkflowData::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let data = Arc::clone(&data);
                std::thread::spawn(move || data.set(format!("key{i}"), json!(i)))
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        assert_eq!(data.len(), 4);
    }
}
