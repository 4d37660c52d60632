//! Document indexing pipeline: load, split, tag with provenance, store.

use std::sync::Arc;

use tracing::info;

use crate::error::IndexError;
use crate::models::{Config, DistanceMetric, IndexSchema, MetadataFilter, Record};
use crate::services::loader::DocumentLoader;
use crate::services::splitter::TokenTextSplitter;
use crate::services::vector_store::{Retriever, VectorStore};

pub const SOURCE_FIELD: &str = "source";
pub const CHUNK_ID_FIELD: &str = "chunk_id";

#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    loader: DocumentLoader,
    splitter: TokenTextSplitter,
    distance: DistanceMetric,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        loader: DocumentLoader,
        splitter: TokenTextSplitter,
        distance: DistanceMetric,
    ) -> Self {
        Self {
            store,
            loader,
            splitter,
            distance,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn VectorStore>) -> Result<Self, IndexError> {
        Ok(Self::new(
            store,
            DocumentLoader::new(&config.indexing)?,
            TokenTextSplitter::from_config(&config.indexing)?,
            config.vector_store.distance,
        ))
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn create_index(&self, name: &str) -> Result<(), IndexError> {
        self.store
            .create_index(name, &IndexSchema::documents(), self.distance)
            .await?;
        info!(index = name, "index created");
        Ok(())
    }

    pub async fn drop_index(&self, name: &str) -> Result<(), IndexError> {
        self.store.drop_index(name).await?;
        info!(index = name, "index dropped");
        Ok(())
    }

    /// Drops every index and clears the local snapshot if there is one.
    pub async fn drop_all_indexes(&self) -> Result<Vec<String>, IndexError> {
        let names = self.store.list_indexes().await?;
        for name in &names {
            self.store.drop_index(name).await?;
        }
        self.store.clear_snapshot().await?;
        info!(count = names.len(), "all indexes dropped");
        Ok(names)
    }

    /// Load `source_url`, split it and store every chunk. Returns the chunk count.
    ///
    /// Nothing is written unless the whole document was read and split.
    pub async fn add_document(&self, source_url: &str, index: &str) -> Result<usize, IndexError> {
        let document = self.loader.load(source_url).await?;
        self.add_text(&document.source, &document.text, index).await
    }

    /// Split already-loaded text attributed to `source` and store the chunks.
    ///
    /// Chunks from an earlier ingest of the same source are removed first, so
    /// a shorter revision leaves no trailing chunks behind. If storing then
    /// fails the source is absent until it is ingested again.
    pub async fn add_text(&self, source: &str, text: &str, index: &str) -> Result<usize, IndexError> {
        let chunks = self.splitter.split(text)?;
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument(source.to_string()));
        }

        let records: Vec<Record> = chunks
            .into_iter()
            .map(|chunk| {
                Record::new(chunk.content)
                    .with_key(format!("{}:{}", source, chunk.chunk_id))
                    .with_meta(SOURCE_FIELD, source)
                    .with_meta(CHUNK_ID_FIELD, chunk.chunk_id)
            })
            .collect();
        let count = records.len();

        let previous = MetadataFilter::new().eq(SOURCE_FIELD, source);
        self.store.delete_where(&previous, index).await?;
        self.store.add_documents(records, index).await?;
        info!(source, index, chunks = count, "document indexed");
        Ok(count)
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        index: &str,
    ) -> Result<Vec<(Record, f32)>, IndexError> {
        Ok(self.store.similarity_search(query, k, filter, index).await?)
    }

    pub fn retriever(&self, index: &str, k: usize) -> Retriever {
        Retriever::new(Arc::clone(&self.store), index, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VectorStoreError;
    use crate::models::IndexingConfig;
    use crate::services::embedding::HashingEmbedder;
    use crate::services::splitter::RegexTokenizer;
    use crate::services::vector_store::InMemoryVectorStore;

    fn indexer(dir: Option<std::path::PathBuf>) -> Indexer {
        let store: Arc<dyn VectorStore> =
            Arc::new(InMemoryVectorStore::new(Arc::new(HashingEmbedder::new(128)), dir));
        Indexer::new(
            store,
            DocumentLoader::new(&IndexingConfig::default()).unwrap(),
            TokenTextSplitter::new(8, 2, Arc::new(RegexTokenizer)).unwrap(),
            DistanceMetric::Cosine,
        )
    }

    #[tokio::test]
    async fn test_add_document_tags_chunks_with_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.txt");
        std::fs::write(
            &path,
            "Paris is the capital of France. It sits on the Seine and has many museums.",
        )
        .unwrap();

        let indexer = indexer(None);
        indexer.create_index("kb").await.unwrap();
        let count = indexer.add_document(path.to_str().unwrap(), "kb").await.unwrap();
        assert!(count > 1);
        assert_eq!(indexer.store().count("kb").await.unwrap(), count as u64);

        let hits = indexer.similarity_search("", count, None, "kb").await.unwrap();
        let mut ids: Vec<f64> = hits.iter().filter_map(|(r, _)| r.number(CHUNK_ID_FIELD)).collect();
        ids.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let expected: Vec<f64> = (0..count).map(|i| i as f64).collect();
        assert_eq!(ids, expected);
        assert!(
            hits.iter()
                .all(|(r, _)| r.text(SOURCE_FIELD) == path.to_str())
        );
    }

    #[tokio::test]
    async fn test_reindexing_overwrites_chunks() {
        let indexer = indexer(None);
        indexer.create_index("kb").await.unwrap();
        let n = indexer.add_text("a.txt", "one two three four five", "kb").await.unwrap();
        indexer.add_text("a.txt", "one two three four five", "kb").await.unwrap();
        assert_eq!(indexer.store().count("kb").await.unwrap(), n as u64);
    }

    #[tokio::test]
    async fn test_shorter_revision_leaves_no_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = indexer(Some(dir.path().to_path_buf()));
        indexer.create_index("kb").await.unwrap();
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen \
                    fourteen fifteen sixteen seventeen eighteen nineteen twenty";
        let before = indexer.add_text("a.txt", long, "kb").await.unwrap();
        indexer.add_text("b.txt", "unrelated words here", "kb").await.unwrap();
        assert!(before > 1);

        let after = indexer.add_text("a.txt", "one two three", "kb").await.unwrap();
        assert_eq!(after, 1);

        let only_a = MetadataFilter::new().eq(SOURCE_FIELD, "a.txt");
        let hits = indexer
            .similarity_search("", before, Some(&only_a), "kb")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.content, "one two three");
        assert_eq!(indexer.store().count("kb").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retriever_searches_one_index() {
        let indexer = indexer(None);
        indexer.create_index("kb").await.unwrap();
        indexer.create_index("other").await.unwrap();
        indexer.add_text("a.txt", "Paris is in France", "kb").await.unwrap();
        indexer.add_text("b.txt", "Berlin is in Germany", "kb").await.unwrap();
        indexer.add_text("c.txt", "Paris again", "other").await.unwrap();

        let retriever = indexer.retriever("kb", 1);
        let hits = retriever.retrieve("Paris France").await.unwrap();
        assert_eq!(retriever.index(), "kb");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.text(SOURCE_FIELD), Some("a.txt"));
    }

    #[tokio::test]
    async fn test_empty_document_is_an_error() {
        let indexer = indexer(None);
        indexer.create_index("kb").await.unwrap();
        assert!(matches!(
            indexer.add_text("empty.txt", "   ", "kb").await,
            Err(IndexError::EmptyDocument(_))
        ));
        assert_eq!(indexer.store().count("kb").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_source_propagates() {
        let indexer = indexer(None);
        indexer.create_index("kb").await.unwrap();
        assert!(matches!(
            indexer.add_document("nowhere/missing.txt", "kb").await,
            Err(IndexError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_add_to_missing_index() {
        let indexer = indexer(None);
        assert!(matches!(
            indexer.add_text("a.txt", "some words", "absent").await,
            Err(IndexError::VectorStore(VectorStoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_drop_all_indexes_clears_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = indexer(Some(dir.path().to_path_buf()));
        indexer.create_index("kb").await.unwrap();
        indexer.create_index("other").await.unwrap();
        indexer.add_text("a.txt", "alpha beta", "kb").await.unwrap();

        let dropped = indexer.drop_all_indexes().await.unwrap();
        assert_eq!(dropped, vec!["kb".to_string(), "other".to_string()]);
        assert!(!dir.path().join("vector_store.json").exists());
        assert!(indexer.store().list_indexes().await.unwrap().is_empty());
    }
}
