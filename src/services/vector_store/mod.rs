//! Vector store abstraction layer.
//!
//! A [`VectorStore`] owns named indices of `(text, metadata, vector)` records.
//! Two backends implement the same contract: an in-process store with an
//! optional JSON snapshot, and Qdrant. Callers pick one through
//! [`create_vector_store`] and never touch backend internals.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::VectorStoreError;
use crate::models::{
    DistanceMetric, IndexSchema, Metadata, MetadataFilter, Record, VectorDriver, VectorStoreConfig,
};
use crate::services::embedding::Embedder;

/// Contract shared by every backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Create an index. Fails with `AlreadyExists` when the name is in use.
    async fn create_index(
        &self,
        name: &str,
        schema: &IndexSchema,
        distance: DistanceMetric,
    ) -> Result<(), VectorStoreError>;

    /// Drop an index and all its records. Fails with `NotFound` when absent.
    async fn drop_index(&self, name: &str) -> Result<(), VectorStoreError>;

    /// Non-failing existence check.
    async fn check_existing_index(&self, name: &str) -> bool;

    async fn list_indexes(&self) -> Result<Vec<String>, VectorStoreError>;

    /// Number of records in an index.
    async fn count(&self, index: &str) -> Result<u64, VectorStoreError>;

    /// Embed and store records. Records with a key overwrite any record with
    /// the same key; the rest get a store-generated key. Returns the keys.
    async fn add_documents(
        &self,
        records: Vec<Record>,
        index: &str,
    ) -> Result<Vec<String>, VectorStoreError>;

    async fn add_texts(
        &self,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
        index: &str,
        keys: Option<Vec<String>>,
    ) -> Result<Vec<String>, VectorStoreError> {
        let records = zip_records(texts, metadatas, keys)?;
        self.add_documents(records, index).await
    }

    /// Remove every record matching `filter`. An empty filter removes nothing.
    async fn delete_where(
        &self,
        filter: &MetadataFilter,
        index: &str,
    ) -> Result<(), VectorStoreError>;

    /// Up to `k` records matching `filter`, by descending similarity to `query`.
    /// A blank query skips embedding and returns matches in backend order with score 0.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        index: &str,
    ) -> Result<Vec<(Record, f32)>, VectorStoreError>;

    /// Remove any local snapshot. No-op for backends without one.
    async fn clear_snapshot(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    fn driver(&self) -> VectorDriver;
}

/// Build the configured backend around an embedder.
pub fn create_vector_store(
    config: &VectorStoreConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Memory => Ok(Arc::new(InMemoryVectorStore::new(
            embedder,
            config.snapshot_dir.clone(),
        ))),
        VectorDriver::Qdrant => Ok(Arc::new(QdrantVectorStore::new(config, embedder)?)),
    }
}

/// Fixed-parameter search over one index.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    index: String,
    k: usize,
    filter: Option<MetadataFilter>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, index: impl Into<String>, k: usize) -> Self {
        Self {
            store,
            index: index.into(),
            k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<(Record, f32)>, VectorStoreError> {
        self.store
            .similarity_search(query, self.k, self.filter.as_ref(), &self.index)
            .await
    }
}

/// Deterministic point id for a caller key.
pub fn point_id(key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

pub fn generate_key() -> String {
    Uuid::new_v4().to_string()
}

pub fn validate_index_name(name: &str) -> Result<(), VectorStoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(VectorStoreError::InvalidSchema(format!(
            "invalid index name `{}`",
            name
        )))
    }
}

/// Similarity where higher is better.
pub fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        DistanceMetric::Euclidean => {
            let d = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            1.0 / (1.0 + d)
        }
    }
}

fn zip_records(
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
    keys: Option<Vec<String>>,
) -> Result<Vec<Record>, VectorStoreError> {
    if metadatas.len() != texts.len() {
        return Err(VectorStoreError::UpsertError(format!(
            "{} texts but {} metadata entries",
            texts.len(),
            metadatas.len()
        )));
    }
    if let Some(keys) = &keys
        && keys.len() != texts.len()
    {
        return Err(VectorStoreError::UpsertError(format!(
            "{} texts but {} keys",
            texts.len(),
            keys.len()
        )));
    }

    let mut keys = keys.map(Vec::into_iter);
    Ok(texts
        .into_iter()
        .zip(metadatas)
        .map(|(content, metadata)| Record {
            key: keys.as_mut().and_then(Iterator::next),
            content,
            metadata,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::HashingEmbedder;

    #[test]
    fn test_point_id_is_deterministic() {
        let a = point_id("session:3");
        assert_eq!(a, point_id("session:3"));
        assert_ne!(a, point_id("session:4"));
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_similarity_metrics() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((similarity(DistanceMetric::Cosine, &a, &a) - 1.0).abs() < 1e-6);
        assert!(similarity(DistanceMetric::Cosine, &a, &b).abs() < 1e-6);
        assert_eq!(similarity(DistanceMetric::Cosine, &[0.0, 0.0], &a), 0.0);
        assert_eq!(similarity(DistanceMetric::Dot, &[2.0, 1.0], &[3.0, 4.0]), 10.0);
        assert_eq!(similarity(DistanceMetric::Euclidean, &a, &a), 1.0);
        assert!(similarity(DistanceMetric::Euclidean, &a, &b) < 1.0);
    }

    #[test]
    fn test_validate_index_name() {
        assert!(validate_index_name("kb").is_ok());
        assert!(validate_index_name("chat-history_2").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("a/b").is_err());
    }

    #[test]
    fn test_zip_records_length_checks() {
        let texts = vec!["a".to_string(), "b".to_string()];
        assert!(zip_records(texts.clone(), vec![Metadata::new()], None).is_err());
        assert!(
            zip_records(
                texts.clone(),
                vec![Metadata::new(), Metadata::new()],
                Some(vec!["k".to_string()])
            )
            .is_err()
        );
        let records = zip_records(
            texts,
            vec![Metadata::new(), Metadata::new()],
            Some(vec!["k1".to_string(), "k2".to_string()]),
        )
        .unwrap();
        assert_eq!(records[1].key.as_deref(), Some("k2"));
    }

    #[tokio::test]
    async fn test_retriever_delegates_with_filter() {
        let store: Arc<dyn VectorStore> =
            Arc::new(InMemoryVectorStore::new(Arc::new(HashingEmbedder::new(64)), None));
        store
            .create_index("kb", &IndexSchema::documents(), DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .add_documents(
                vec![
                    Record::new("Paris is in France").with_meta("source", "a.txt"),
                    Record::new("Berlin is in Germany").with_meta("source", "b.txt"),
                ],
                "kb",
            )
            .await
            .unwrap();

        let retriever = Retriever::new(store, "kb", 5)
            .with_filter(MetadataFilter::new().eq("source", "b.txt"));
        let hits = retriever.retrieve("Paris").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.text("source"), Some("b.txt"));
        assert_eq!(retriever.index(), "kb");
    }
}
