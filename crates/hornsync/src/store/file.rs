use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::StoreError;
use super::TwinDocument;
use super::TwinStore;
use crate::horn::HornState;
use crate::horn::HornStatus;

/// Twin store backed by a directory with one pretty-printed JSON file per
/// thing.
///
/// All access from this process is serialized through a single lock. A
/// write goes to a temporary file that is synced to disk before it is
/// renamed over the document, so readers see either the old or the new
/// content in full.
#[derive(Debug)]
pub struct FileTwinStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileTwinStore {
    /// Opens (creating if needed) the store directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// `car:horn-car-001` is stored as `car%3Ahorn-car-001.json`.
    fn path_for(&self, thing_id: &str) -> PathBuf {
        let mut name = String::with_capacity(thing_id.len() + 5);
        for byte in thing_id.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    async fn read(&self, thing_id: &str) -> Result<Option<TwinDocument>, StoreError> {
        read_document(&self.path_for(thing_id)).await
    }

    async fn read_existing(&self, thing_id: &str) -> Result<TwinDocument, StoreError> {
        self.read(thing_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(thing_id.to_string()))
    }

    async fn write(&self, doc: &TwinDocument) -> Result<(), StoreError> {
        let path = self.path_for(doc.thing_id());
        let tmp = path.with_extension("json.tmp");
        let mut content = serde_json::to_vec_pretty(doc)?;
        content.push(b'\n');

        let tmp_err = |source| StoreError::Io {
            path: tmp.clone(),
            source,
        };
        let mut file = tokio::fs::File::create(&tmp).await.map_err(tmp_err)?;
        file.write_all(&content).await.map_err(tmp_err)?;
        file.sync_all().await.map_err(tmp_err)?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(())
    }
}

async fn read_document(path: &Path) -> Result<Option<TwinDocument>, StoreError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let value: Value = serde_json::from_slice(&content)?;
    TwinDocument::from_value(value).map(Some)
}

#[async_trait]
impl TwinStore for FileTwinStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn list(&self) -> Result<Vec<TwinDocument>, StoreError> {
        let _guard = self.lock.lock().await;

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_document(&path).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable twin file {}: {}", path.display(), e),
            }
        }

        docs.sort_by(|a, b| a.thing_id().cmp(b.thing_id()));
        Ok(docs)
    }

    async fn get(&self, thing_id: &str) -> Result<Option<TwinDocument>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read(thing_id).await
    }

    async fn insert(&self, mut doc: TwinDocument) -> Result<TwinDocument, StoreError> {
        let _guard = self.lock.lock().await;
        if self.read(doc.thing_id()).await?.is_some() {
            return Err(StoreError::AlreadyExists(doc.thing_id().to_string()));
        }
        doc.stamp_created(Utc::now());
        self.write(&doc).await?;
        tracing::debug!("Created twin file {}", self.path_for(doc.thing_id()).display());
        Ok(doc)
    }

    async fn replace(&self, thing_id: &str, doc: TwinDocument) -> Result<TwinDocument, StoreError> {
        let _guard = self.lock.lock().await;
        let previous = self.read_existing(thing_id).await?;
        let doc = doc.replacing(&previous, Utc::now())?;
        self.write(&doc).await?;
        Ok(doc)
    }

    async fn merge(&self, thing_id: &str, patch: Value) -> Result<TwinDocument, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_existing(thing_id).await?;
        doc.merge(&patch, Utc::now())?;
        self.write(&doc).await?;
        Ok(doc)
    }

    async fn delete(&self, thing_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(thing_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(thing_id.to_string()))
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn set_horn_state(
        &self,
        thing_id: &str,
        state: HornState,
    ) -> Result<HornStatus, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_existing(thing_id).await?;
        let status = doc.set_horn_state(state, Utc::now());
        self.write(&doc).await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTwinStore::open(temp_dir.path().join("things")).await.unwrap();
        super::super::tests::exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_file_store_concurrent_writes() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
        super::super::tests::exercise_concurrent_writes(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn test_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
        store.insert(TwinDocument::new("car:horn-car-001")).await.unwrap();

        let path = temp_dir.path().join("car%3Ahorn-car-001.json");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\n  \""));
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["thingId"], "car:horn-car-001");
    }

    #[tokio::test]
    async fn test_writes_leave_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
        store.insert(TwinDocument::new("car:horn-car-001")).await.unwrap();
        for state in [HornState::On, HornState::Off, HornState::On] {
            store.set_horn_state("car:horn-car-001", state).await.unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["car%3Ahorn-car-001.json"]);

        let doc = store.get("car:horn-car-001").await.unwrap().unwrap();
        assert_eq!(doc.horn_status().activation_count, 2);
        assert_eq!(doc.revision(), 4);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
            store.insert(TwinDocument::new("car:horn-car-001")).await.unwrap();
            store
                .set_horn_state("car:horn-car-001", HornState::On)
                .await
                .unwrap();
        }

        let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(store.get_state("car:horn-car-001").await, Some(HornState::On));
    }

    #[tokio::test]
    async fn test_list_skips_foreign_and_broken_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
        store.insert(TwinDocument::new("car:ok")).await.unwrap();

        std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(
            temp_dir.path().join("anonymous.json"),
            json!({"features": {}}).to_string(),
        )
        .unwrap();

        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].thing_id(), "car:ok");
    }

    #[tokio::test]
    async fn test_malformed_file_reads_as_unknown_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTwinStore::open(temp_dir.path()).await.unwrap();
        std::fs::write(temp_dir.path().join("car%3Abroken.json"), "not json").unwrap();

        assert!(store.get("car:broken").await.is_err());
        assert_eq!(store.get_state("car:broken").await, None);
    }
}
