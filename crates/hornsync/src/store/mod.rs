//! Digital twin storage.
//!
//! A [`TwinStore`] holds twin documents keyed by thing id. Three backends
//! exist: an in-process map, a directory of JSON files, and a remote
//! hornsync API reached over HTTP.

mod document;
mod file;
mod http;
mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hornsync_config::StoreBackend;
use serde_json::Value;

pub use document::timestamp;
pub use document::TwinDocument;
pub use file::FileTwinStore;
pub use http::HttpTwinStore;
pub use memory::MemoryTwinStore;

use crate::horn::HornState;
use crate::horn::HornStatus;

/// Errors produced by twin store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("thing '{0}' not found")]
    NotFound(String),

    #[error("thing '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid twin document: {0}")]
    InvalidDocument(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize twin document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("twin store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("twin store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for twin documents.
///
/// Every mutating operation is an atomic read-modify-write on a single
/// document: concurrent writers to the same thing never lose each other's
/// updates.
#[async_trait]
pub trait TwinStore: Send + Sync {
    /// Short backend name for logs and health output
    fn kind(&self) -> &'static str;

    async fn list(&self) -> Result<Vec<TwinDocument>, StoreError>;

    async fn get(&self, thing_id: &str) -> Result<Option<TwinDocument>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if the id is taken.
    async fn insert(&self, doc: TwinDocument) -> Result<TwinDocument, StoreError>;

    /// Fails with [`StoreError::NotFound`] if there is nothing to replace.
    async fn replace(&self, thing_id: &str, doc: TwinDocument) -> Result<TwinDocument, StoreError>;

    async fn merge(&self, thing_id: &str, patch: Value) -> Result<TwinDocument, StoreError>;

    async fn delete(&self, thing_id: &str) -> Result<(), StoreError>;

    /// Records a new horn state, updating the activation statistics and
    /// revision markers in the same write.
    async fn set_horn_state(
        &self,
        thing_id: &str,
        state: HornState,
    ) -> Result<HornStatus, StoreError>;

    /// The twin's horn state, or `None` when it cannot be determined.
    ///
    /// Never fails: a missing document, a malformed state or an unreachable
    /// store all read as unknown.
    async fn get_state(&self, thing_id: &str) -> Option<HornState> {
        match self.get(thing_id).await {
            Ok(Some(doc)) => {
                let state = doc.horn_state();
                if state.is_none() {
                    tracing::debug!("Twin {} has no readable horn state", thing_id);
                }
                state
            }
            Ok(None) => {
                tracing::debug!("Twin {} does not exist", thing_id);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to read twin {}: {}", thing_id, e);
                None
            }
        }
    }
}

/// Opens the store selected in the configuration.
pub async fn open(backend: &StoreBackend) -> Result<Arc<dyn TwinStore>, StoreError> {
    let store: Arc<dyn TwinStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryTwinStore::new()),
        StoreBackend::File { dir } => Arc::new(FileTwinStore::open(dir).await?),
        StoreBackend::Http { url, timeout } => Arc::new(HttpTwinStore::new(url, *timeout)?),
    };
    tracing::info!("Opened {} twin store", store.kind());
    Ok(store)
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    /// Runs the behaviour every backend must share.
    pub(crate) async fn exercise_store(store: &dyn TwinStore) {
        let doc = TwinDocument::from_value(json!({
            "thingId": "car:horn-car-001",
            "attributes": { "manufacturer": "Example Motors" },
            "features": {
                "horn": { "properties": { "status": { "state": "OFF", "activationCount": 0 } } }
            }
        }))
        .unwrap();

        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get("car:horn-car-001").await.unwrap().is_none());
        assert_eq!(store.get_state("car:horn-car-001").await, None);

        let inserted = store.insert(doc.clone()).await.unwrap();
        assert_eq!(inserted.revision(), 1);
        assert!(inserted.pointer(&["_created"]).is_some());
        assert!(matches!(
            store.insert(doc.clone()).await,
            Err(StoreError::AlreadyExists(_))
        ));

        assert_eq!(store.get_state("car:horn-car-001").await, Some(HornState::Off));

        let status = store
            .set_horn_state("car:horn-car-001", HornState::On)
            .await
            .unwrap();
        assert_eq!(status.state, Some(HornState::On));
        assert_eq!(status.activation_count, 1);
        assert!(status.last_activated.is_some());

        let stored = store.get("car:horn-car-001").await.unwrap().unwrap();
        assert_eq!(stored.horn_status(), status);
        assert_eq!(stored.revision(), 2);
        assert_eq!(
            stored.pointer(&["attributes", "manufacturer"]),
            Some(&json!("Example Motors"))
        );

        let merged = store
            .merge("car:horn-car-001", json!({"attributes": {"color": "red"}}))
            .await
            .unwrap();
        assert_eq!(merged.pointer(&["attributes", "color"]), Some(&json!("red")));
        assert_eq!(merged.revision(), 3);

        let replaced = store.replace("car:horn-car-001", doc.clone()).await.unwrap();
        assert_eq!(replaced.revision(), 4);
        assert_eq!(replaced.pointer(&["attributes", "color"]), None);
        assert_eq!(store.get_state("car:horn-car-001").await, Some(HornState::Off));

        assert!(matches!(
            store.set_horn_state("car:missing", HornState::On).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.replace("car:missing", TwinDocument::new("car:missing")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.merge("car:missing", json!({})).await,
            Err(StoreError::NotFound(_))
        ));

        store.insert(TwinDocument::new("car:second")).await.unwrap();
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|d| d.thing_id().to_string())
            .collect();
        assert_eq!(ids, vec!["car:horn-car-001", "car:second"]);

        store.delete("car:second").await.unwrap();
        assert!(matches!(
            store.delete("car:second").await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    /// Many concurrent ON writes must all be counted.
    pub(crate) async fn exercise_concurrent_writes(store: Arc<dyn TwinStore>) {
        store.insert(TwinDocument::new("car:busy")).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.set_horn_state("car:busy", HornState::On).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let doc = store.get("car:busy").await.unwrap().unwrap();
        assert_eq!(doc.horn_status().activation_count, 20);
        // insert stamps revision 1, then one bump per write
        assert_eq!(doc.revision(), 21);
    }
}
