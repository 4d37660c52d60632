//! In-process vector store backend with an optional JSON snapshot.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{VectorStore, generate_key, similarity, validate_index_name};
use crate::error::VectorStoreError;
use crate::models::{
    DistanceMetric, IndexSchema, Metadata, MetadataFilter, Record, VectorDriver,
};
use crate::services::embedding::Embedder;

const SNAPSHOT_FILE: &str = "vector_store.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    key: String,
    content: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredIndex {
    schema: IndexSchema,
    distance: DistanceMetric,
    records: Vec<StoredRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    indexes: BTreeMap<String, StoredIndex>,
}

/// Brute-force store held in memory for the process lifetime.
///
/// With a snapshot directory, every call reloads `vector_store.json` under the
/// lock and mutating calls write it back before releasing it, so calls in one
/// process never interleave their load/save pairs. Writers in other processes
/// are not coordinated.
pub struct InMemoryVectorStore {
    state: Mutex<Snapshot>,
    snapshot_path: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, snapshot_dir: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(Snapshot::default()),
            snapshot_path: snapshot_dir.map(|dir| dir.join(SNAPSHOT_FILE)),
            embedder,
        }
    }

    async fn reload(&self, state: &mut Snapshot) -> Result<(), VectorStoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                *state = serde_json::from_slice(&bytes).map_err(|e| {
                    VectorStoreError::SnapshotError(format!("{}: {}", path.display(), e))
                })?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VectorStoreError::SnapshotError(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn persist(&self, state: &Snapshot) -> Result<(), VectorStoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot_err = |e: std::io::Error| {
            VectorStoreError::SnapshotError(format!("{}: {}", path.display(), e))
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(snapshot_err)?;
        }
        let bytes = serde_json::to_vec(state)
            .map_err(|e| VectorStoreError::SnapshotError(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(snapshot_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(snapshot_err)?;
        debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        Ok(true)
    }

    async fn create_index(
        &self,
        name: &str,
        schema: &IndexSchema,
        distance: DistanceMetric,
    ) -> Result<(), VectorStoreError> {
        validate_index_name(name)?;
        schema.validate()?;

        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        if state.indexes.contains_key(name) {
            return Err(VectorStoreError::AlreadyExists(name.to_string()));
        }
        state.indexes.insert(
            name.to_string(),
            StoredIndex {
                schema: schema.clone(),
                distance,
                records: Vec::new(),
            },
        );
        self.persist(&state).await
    }

    async fn drop_index(&self, name: &str) -> Result<(), VectorStoreError> {
        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        if state.indexes.remove(name).is_none() {
            return Err(VectorStoreError::NotFound(name.to_string()));
        }
        self.persist(&state).await
    }

    async fn check_existing_index(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        if let Err(e) = self.reload(&mut state).await {
            warn!(index = name, error = %e, "existence check could not reload snapshot");
        }
        state.indexes.contains_key(name)
    }

    async fn list_indexes(&self) -> Result<Vec<String>, VectorStoreError> {
        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        Ok(state.indexes.keys().cloned().collect())
    }

    async fn count(&self, index: &str) -> Result<u64, VectorStoreError> {
        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        state
            .indexes
            .get(index)
            .map(|i| i.records.len() as u64)
            .ok_or_else(|| VectorStoreError::NotFound(index.to_string()))
    }

    async fn add_documents(
        &self,
        records: Vec<Record>,
        index: &str,
    ) -> Result<Vec<String>, VectorStoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        // Embed before taking the lock; only the load/mutate/save bracket is exclusive.
        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self.embedder.embed_documents(texts).await?;

        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        let stored = state
            .indexes
            .get_mut(index)
            .ok_or_else(|| VectorStoreError::NotFound(index.to_string()))?;

        for record in &records {
            stored.schema.check(&record.metadata)?;
        }

        let mut positions: HashMap<String, usize> = stored
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key.clone(), i))
            .collect();

        let mut keys = Vec::with_capacity(records.len());
        for (record, vector) in records.into_iter().zip(vectors) {
            let key = record.key.unwrap_or_else(generate_key);
            let entry = StoredRecord {
                key: key.clone(),
                content: record.content,
                metadata: record.metadata,
                vector,
            };
            match positions.get(&key) {
                Some(&pos) => stored.records[pos] = entry,
                None => {
                    positions.insert(key.clone(), stored.records.len());
                    stored.records.push(entry);
                }
            }
            keys.push(key);
        }

        debug!(index, added = keys.len(), total = stored.records.len(), "records stored");
        self.persist(&state).await?;
        Ok(keys)
    }

    async fn delete_where(
        &self,
        filter: &MetadataFilter,
        index: &str,
    ) -> Result<(), VectorStoreError> {
        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        let stored = state
            .indexes
            .get_mut(index)
            .ok_or_else(|| VectorStoreError::NotFound(index.to_string()))?;
        if filter.is_empty() {
            return Ok(());
        }

        let before = stored.records.len();
        stored.records.retain(|r| !filter.matches(&r.metadata));
        let removed = before - stored.records.len();
        if removed == 0 {
            return Ok(());
        }
        debug!(index, removed, "records deleted");
        self.persist(&state).await
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        index: &str,
    ) -> Result<Vec<(Record, f32)>, VectorStoreError> {
        let query_vector = if query.trim().is_empty() {
            None
        } else {
            Some(self.embedder.embed_query(query).await?)
        };

        let mut state = self.state.lock().await;
        self.reload(&mut state).await?;
        let stored = state
            .indexes
            .get(index)
            .ok_or_else(|| VectorStoreError::NotFound(index.to_string()))?;

        let matching = stored
            .records
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)));

        let mut hits: Vec<(&StoredRecord, f32)> = match &query_vector {
            Some(qv) => matching
                .map(|r| (r, similarity(stored.distance, qv, &r.vector)))
                .collect(),
            None => matching.take(k).map(|r| (r, 0.0)).collect(),
        };

        if query_vector.is_some() {
            hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(k);
        }

        Ok(hits
            .into_iter()
            .map(|(r, score)| {
                (
                    Record {
                        key: Some(r.key.clone()),
                        content: r.content.clone(),
                        metadata: r.metadata.clone(),
                    },
                    score,
                )
            })
            .collect())
    }

    async fn clear_snapshot(&self) -> Result<(), VectorStoreError> {
        let mut state = self.state.lock().await;
        *state = Snapshot::default();
        if let Some(path) = &self.snapshot_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "snapshot removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(VectorStoreError::SnapshotError(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
        Ok(())
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Memory
    }
}
