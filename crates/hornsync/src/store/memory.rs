use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use super::StoreError;
use super::TwinDocument;
use super::TwinStore;
use crate::horn::HornState;
use crate::horn::HornStatus;

/// Twin store kept entirely in memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTwinStore {
    things: Mutex<BTreeMap<String, TwinDocument>>,
}

impl MemoryTwinStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TwinStore for MemoryTwinStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<TwinDocument>, StoreError> {
        Ok(self.things.lock().await.values().cloned().collect())
    }

    async fn get(&self, thing_id: &str) -> Result<Option<TwinDocument>, StoreError> {
        Ok(self.things.lock().await.get(thing_id).cloned())
    }

    async fn insert(&self, mut doc: TwinDocument) -> Result<TwinDocument, StoreError> {
        let mut things = self.things.lock().await;
        if things.contains_key(doc.thing_id()) {
            return Err(StoreError::AlreadyExists(doc.thing_id().to_string()));
        }
        doc.stamp_created(Utc::now());
        things.insert(doc.thing_id().to_string(), doc.clone());
        Ok(doc)
    }

    async fn replace(&self, thing_id: &str, doc: TwinDocument) -> Result<TwinDocument, StoreError> {
        let mut things = self.things.lock().await;
        let slot = things
            .get_mut(thing_id)
            .ok_or_else(|| StoreError::NotFound(thing_id.to_string()))?;
        *slot = doc.replacing(slot, Utc::now())?;
        Ok(slot.clone())
    }

    async fn merge(&self, thing_id: &str, patch: Value) -> Result<TwinDocument, StoreError> {
        let mut things = self.things.lock().await;
        let doc = things
            .get_mut(thing_id)
            .ok_or_else(|| StoreError::NotFound(thing_id.to_string()))?;
        let mut updated = doc.clone();
        updated.merge(&patch, Utc::now())?;
        *doc = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, thing_id: &str) -> Result<(), StoreError> {
        self.things
            .lock()
            .await
            .remove(thing_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(thing_id.to_string()))
    }

    async fn set_horn_state(
        &self,
        thing_id: &str,
        state: HornState,
    ) -> Result<HornStatus, StoreError> {
        let mut things = self.things.lock().await;
        let doc = things
            .get_mut(thing_id)
            .ok_or_else(|| StoreError::NotFound(thing_id.to_string()))?;
        Ok(doc.set_horn_state(state, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        super::super::tests::exercise_store(&MemoryTwinStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_writes() {
        super::super::tests::exercise_concurrent_writes(Arc::new(MemoryTwinStore::new())).await;
    }
}
