//! In-memory deployment registry

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::deployment::Deployment;

/// Concurrency-safe map of live deployment records, keyed by instance id.
/// Field mutation goes through `update` and is issued only by the one poller
/// task owning the entry; the map itself is shared with the HTTP layer.
pub struct DeploymentRegistry {
    entries: RwLock<HashMap<String, Deployment>>,
}

impl DeploymentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new deployment record
    pub fn insert(&self, deployment: Deployment) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(deployment.id.clone(), deployment);
    }

    /// Get a snapshot of a deployment
    pub fn get(&self, id: &str) -> Option<Deployment> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(id).cloned()
    }

    /// Check whether an id is tracked
    pub fn contains(&self, id: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(id)
    }

    /// Mutate a record in place. Returns false when the id is unknown.
    pub fn update<F>(&self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Deployment),
    {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(id) {
            Some(deployment) => {
                mutate(deployment);
                true
            }
            None => false,
        }
    }

    /// Remove a deployment record
    pub fn remove(&self, id: &str) -> Option<Deployment> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(id)
    }

    /// Snapshots of all tracked deployments
    pub fn all(&self) -> Vec<Deployment> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.values().cloned().collect()
    }

    /// Number of tracked deployments
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeploymentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::deployment::DeploymentStatus;

    #[test]
    fn test_insert_get_remove() {
        let registry = DeploymentRegistry::new();
        assert!(registry.is_empty());

        registry.insert(Deployment::new("42", Utc::now(), None));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("42"));

        let snapshot = registry.get("42").unwrap();
        assert_eq!(snapshot.status, DeploymentStatus::Creating);

        assert!(registry.remove("42").is_some());
        assert!(registry.get("42").is_none());
        assert!(registry.remove("42").is_none());
    }

    #[test]
    fn test_update_unknown_id() {
        let registry = DeploymentRegistry::new();
        assert!(!registry.update("missing", |d| d.detail = Some("x".to_string())));

        registry.insert(Deployment::new("42", Utc::now(), None));
        assert!(registry.update("42", |d| d.detail = Some("x".to_string())));
        assert_eq!(registry.get("42").unwrap().detail.as_deref(), Some("x"));
    }
}
