//! File-backed primary store
//!
//! Keeps the records in memory and rewrites a JSON snapshot after every
//! mutation. A mutation only counts as committed once the snapshot has been
//! renamed into place; if the write fails the in-memory state is rolled back.

use async_trait::async_trait;
use person_sync_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// On-disk snapshot layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<Person>,
}

const SNAPSHOT_VERSION: u32 = 1;

/// JSON snapshot primary store
pub struct FileRecordStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, Person>>,
    running: AtomicBool,
}

impl FileRecordStore {
    /// Create a store over `path`; call `start` to load existing records
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: RwLock::new(BTreeMap::new()),
            running: AtomicBool::new(false),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, Person>> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    SyncError::store_with_source(
                        format!("Failed to parse snapshot {}", self.path.display()),
                        e,
                    )
                })?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(SyncError::store(format!(
                        "Unsupported snapshot version {}",
                        snapshot.version
                    )));
                }
                let mut records = BTreeMap::new();
                for person in snapshot.records {
                    let id = person.require_id()?.to_string();
                    records.insert(id, person);
                }
                info!(count = records.len(), path = ?self.path, "Loaded records");
                Ok(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?self.path, "No snapshot file, starting empty");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(SyncError::store_with_source("Failed to read snapshot", e)),
        }
    }

    async fn persist(&self, records: &BTreeMap<String, Person>) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            records: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| SyncError::store_with_source("Failed to encode snapshot", e))?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::store_with_source("Failed to create snapshot directory", e)
            })?;
        }

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, bytes)
            .await
            .map_err(|e| SyncError::store_with_source("Failed to write snapshot", e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| SyncError::store_with_source("Failed to rename snapshot", e))?;

        debug!(count = records.len(), "Saved snapshot");
        Ok(())
    }

    /// Apply `mutate` and persist, restoring the previous state on failure
    async fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, Person>) -> T,
    ) -> Result<T> {
        let mut records = self.records.write().await;
        let previous = records.clone();
        let out = mutate(&mut *records);
        if let Err(e) = self.persist(&records).await {
            *records = previous;
            return Err(e);
        }
        Ok(out)
    }
}

#[async_trait]
impl Lifecycle for FileRecordStore {
    async fn start(&self) -> Result<()> {
        let loaded = self.load().await?;
        *self.records.write().await = loaded;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for FileRecordStore {
    async fn health_check(&self) -> Result<()> {
        if !self.is_running() {
            return Err(SyncError::store("file record store not started"));
        }
        Ok(())
    }

    fn component_name(&self) -> &'static str {
        "file_record_store"
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn create(&self, mut person: Person) -> Result<Person> {
        let id = Uuid::new_v4().to_string();
        person.id = Some(id.clone());
        let committed = person.clone();
        self.mutate(move |records| {
            records.insert(id, person);
        })
        .await?;
        Ok(committed)
    }

    async fn save(&self, person: Person) -> Result<Person> {
        let id = person.require_id()?.to_string();
        let committed = person.clone();
        self.mutate(move |records| {
            records.insert(id, person);
        })
        .await?;
        Ok(committed)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Person>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(id))
    }

    async fn find_page(&self, page: &PageRequest) -> Result<Vec<Person>> {
        let mut all: Vec<Person> = self.records.read().await.values().cloned().collect();
        if let Some(sort) = page.sort() {
            all.sort_by(|a, b| sort.compare(a, b));
        }
        Ok(page.slice(&all))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.mutate(move |records| {
            records.remove(&id);
        })
        .await
    }
}
