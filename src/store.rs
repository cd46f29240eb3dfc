//! Persistence boundary.
//!
//! The core never implements storage; it calls through [`ResourceStore`].
//! [`MemoryStore`] is the reference implementation used by tests and
//! single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::resource::ResourceType;

/// Abstract persistence contract consumed by the resolver and portal
/// facade. Implementations are expected to be cheap to clone and safe to
/// share across tasks.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn exists(&self, resource_type: ResourceType, id: &str) -> Result<bool>;
    async fn get(&self, resource_type: ResourceType, id: &str) -> Result<Option<Value>>;
    async fn put(&self, resource_type: ResourceType, id: &str, body: Value) -> Result<()>;
    async fn delete(&self, resource_type: ResourceType, id: &str) -> Result<()>;
}

/// In-memory [`ResourceStore`] keyed by (type, id).
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: Arc<RwLock<HashMap<(ResourceType, String), Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.resources.write().await.clear();
    }

    /// All stored bodies of one resource type, in arbitrary order.
    pub async fn list(&self, resource_type: ResourceType) -> Vec<Value> {
        self.resources
            .read()
            .await
            .iter()
            .filter(|((rt, _), _)| *rt == resource_type)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn exists(&self, resource_type: ResourceType, id: &str) -> Result<bool> {
        let resources = self.resources.read().await;
        Ok(resources.contains_key(&(resource_type, id.to_string())))
    }

    async fn get(&self, resource_type: ResourceType, id: &str) -> Result<Option<Value>> {
        let resources = self.resources.read().await;
        Ok(resources.get(&(resource_type, id.to_string())).cloned())
    }

    async fn put(&self, resource_type: ResourceType, id: &str, body: Value) -> Result<()> {
        let mut resources = self.resources.write().await;
        resources.insert((resource_type, id.to_string()), body);
        Ok(())
    }

    async fn delete(&self, resource_type: ResourceType, id: &str) -> Result<()> {
        let mut resources = self.resources.write().await;
        resources.remove(&(resource_type, id.to_string()));
        Ok(())
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            resources: Arc::clone(&self.resources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_exists_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        store
            .put(ResourceType::Patient, "p1", json!({"id": "p1"}))
            .await
            .unwrap();
        assert!(store.exists(ResourceType::Patient, "p1").await.unwrap());
        assert!(!store.exists(ResourceType::Condition, "p1").await.unwrap());
        assert_eq!(
            store.get(ResourceType::Patient, "p1").await.unwrap(),
            Some(json!({"id": "p1"}))
        );

        store.delete(ResourceType::Patient, "p1").await.unwrap();
        assert!(!store.exists(ResourceType::Patient, "p1").await.unwrap());
    }

    #[tokio::test]
    async fn clones_share_the_same_map() {
        let store = MemoryStore::new();
        let other = store.clone();
        other
            .put(ResourceType::Condition, "c1", json!({"id": "c1"}))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }
}
