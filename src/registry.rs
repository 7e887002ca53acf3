//! Local registry of controllable trains.
//!
//! The registry holds the last-known-reconciled view of the train
//! controller's inventory. It is written only by the inventory reconciler
//! and read by the command dispatch path and the status surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Train Record
// ============================================================================

/// One train known to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRecord {
    /// Unique loco id, the registry key.
    pub loco_id: String,
    /// Opaque parameters as last reported by the controller.
    pub parms: Value,
}

impl TrainRecord {
    /// Create a record.
    pub fn new(loco_id: impl Into<String>, parms: Value) -> Self {
        Self {
            loco_id: loco_id.into(),
            parms,
        }
    }
}

// ============================================================================
// Train Registry
// ============================================================================

/// Mapping of loco id to train record.
///
/// Plain data; thread safety is the owner's job (the reconciler wraps one
/// instance in a mutex and performs each diff-and-apply pass atomically).
#[derive(Debug, Default)]
pub struct TrainRegistry {
    trains: HashMap<String, TrainRecord>,
}

impl TrainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a train, replacing any previous record.
    pub fn upsert(&mut self, record: TrainRecord) {
        self.trains.insert(record.loco_id.clone(), record);
    }

    /// Remove a train. Returns the record if it existed.
    pub fn remove(&mut self, loco_id: &str) -> Option<TrainRecord> {
        self.trains.remove(loco_id)
    }

    /// Look up a train by loco id.
    pub fn get(&self, loco_id: &str) -> Option<&TrainRecord> {
        self.trains.get(loco_id)
    }

    /// Whether a loco id is present.
    pub fn contains(&self, loco_id: &str) -> bool {
        self.trains.contains_key(loco_id)
    }

    /// All loco ids currently registered.
    pub fn loco_ids(&self) -> Vec<String> {
        self.trains.keys().cloned().collect()
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<TrainRecord> {
        self.trains.values().cloned().collect()
    }

    /// Number of registered trains.
    pub fn len(&self) -> usize {
        self.trains.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.trains.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_starts_empty() {
        let registry = TrainRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.loco_ids().is_empty());
    }

    #[test]
    fn test_upsert_creates() {
        let mut registry = TrainRegistry::new();
        registry.upsert(TrainRecord::new("5", json!({"speed": 0})));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("5"));
        assert_eq!(registry.get("5").unwrap().parms["speed"], 0);
    }

    #[test]
    fn test_upsert_replaces() {
        let mut registry = TrainRegistry::new();
        registry.upsert(TrainRecord::new("5", json!({"speed": 0})));
        registry.upsert(TrainRecord::new("5", json!({"speed": 40})));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("5").unwrap().parms["speed"], 40);
    }

    #[test]
    fn test_remove() {
        let mut registry = TrainRegistry::new();
        registry.upsert(TrainRecord::new("5", json!({})));

        let removed = registry.remove("5");
        assert!(removed.is_some());
        assert!(registry.is_empty());

        // Removing again is a no-op
        assert!(registry.remove("5").is_none());
    }

    #[test]
    fn test_clear() {
        let mut registry = TrainRegistry::new();
        registry.upsert(TrainRecord::new("5", json!({})));
        registry.upsert(TrainRecord::new("7", json!({})));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_loco_ids() {
        let mut registry = TrainRegistry::new();
        registry.upsert(TrainRecord::new("5", json!({})));
        registry.upsert(TrainRecord::new("7", json!({})));

        let mut ids = registry.loco_ids();
        ids.sort();
        assert_eq!(ids, vec!["5", "7"]);
    }
}
