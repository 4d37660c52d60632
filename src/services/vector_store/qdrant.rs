//! Qdrant vector store backend: one collection per index.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PayloadSchemaInfo, PayloadSchemaType,
    PointStruct, Range, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder, vectors_config,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{VectorStore, generate_key, point_id, validate_index_name};
use crate::error::VectorStoreError;
use crate::models::{
    CONTENT_FIELD, DistanceMetric, FieldKind, IndexSchema, Metadata, MetadataFilter,
    MetadataValue, RECORD_KEY_FIELD, Record, VectorDriver, VectorStoreConfig,
};
use crate::services::embedding::Embedder;

/// What a collection was created with.
#[derive(Debug, Clone)]
struct CollectionMeta {
    distance: DistanceMetric,
    schema: IndexSchema,
}

/// Qdrant vector store backend.
pub struct QdrantVectorStore {
    client: Qdrant,
    embedder: Arc<dyn Embedder>,
    collections: RwLock<HashMap<String, CollectionMeta>>,
}

impl QdrantVectorStore {
    pub fn new(
        config: &VectorStoreConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            embedder,
            collections: RwLock::new(HashMap::new()),
        })
    }

    async fn exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
    }

    /// Distance and schema of an index, cached after the first lookup.
    ///
    /// The schema is rebuilt from the payload indexes made at creation, one per
    /// declared field.
    async fn meta_of(&self, index: &str) -> Result<CollectionMeta, VectorStoreError> {
        if let Some(meta) = self.collections.read().await.get(index) {
            return Ok(meta.clone());
        }

        let info = self
            .client
            .collection_info(index)
            .await
            .map_err(|e| missing_or(index, e.to_string(), VectorStoreError::CollectionError))?
            .result
            .ok_or_else(|| VectorStoreError::NotFound(index.to_string()))?;

        let schema = schema_from_payload(&info.payload_schema);
        let raw = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                vectors_config::Config::Params(params) => Some(params.distance),
                vectors_config::Config::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                VectorStoreError::CollectionError(format!(
                    "collection `{}` has no single vector config",
                    index
                ))
            })?;

        let distance = match Distance::try_from(raw) {
            Ok(Distance::Dot) => DistanceMetric::Dot,
            Ok(Distance::Euclid) => DistanceMetric::Euclidean,
            _ => DistanceMetric::Cosine,
        };
        let meta = CollectionMeta { distance, schema };
        self.collections
            .write()
            .await
            .insert(index.to_string(), meta.clone());
        Ok(meta)
    }
}

fn schema_from_payload(payload_schema: &HashMap<String, PayloadSchemaInfo>) -> IndexSchema {
    let mut names: Vec<&String> = payload_schema.keys().collect();
    names.sort();

    let mut schema = IndexSchema::new();
    for name in names {
        match PayloadSchemaType::try_from(payload_schema[name].data_type) {
            Ok(PayloadSchemaType::Keyword | PayloadSchemaType::Text) => {
                schema = schema.text(name.as_str());
            }
            Ok(PayloadSchemaType::Float | PayloadSchemaType::Integer) => {
                schema = schema.numeric(name.as_str());
            }
            _ => {}
        }
    }
    schema
}

/// Same rule the in-memory backend applies before anything is written.
fn check_records(schema: &IndexSchema, records: &[Record]) -> Result<(), VectorStoreError> {
    records.iter().try_for_each(|r| schema.check(&r.metadata))
}

fn to_qdrant_distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
        DistanceMetric::Euclidean => Distance::Euclid,
    }
}

/// Qdrant reports raw distance for Euclid; everything else is already a similarity.
fn to_similarity(metric: DistanceMetric, score: f32) -> f32 {
    match metric {
        DistanceMetric::Euclidean => 1.0 / (1.0 + score),
        DistanceMetric::Cosine | DistanceMetric::Dot => score,
    }
}

fn missing_or(
    index: &str,
    msg: String,
    fallback: fn(String) -> VectorStoreError,
) -> VectorStoreError {
    let lower = msg.to_lowercase();
    if lower.contains("not found") || lower.contains("doesn't exist") {
        VectorStoreError::NotFound(index.to_string())
    } else {
        fallback(msg)
    }
}

fn build_filter(filter: Option<&MetadataFilter>) -> Option<Filter> {
    let filter = filter.filter(|f| !f.is_empty())?;
    let conditions: Vec<Condition> = filter
        .conditions
        .iter()
        .map(|(name, value)| match value {
            MetadataValue::Text(s) => Condition::matches(name.as_str(), s.clone()),
            MetadataValue::Numeric(n) => Condition::range(
                name.as_str(),
                Range {
                    gte: Some(*n),
                    lte: Some(*n),
                    ..Default::default()
                },
            ),
        })
        .collect();
    Some(Filter::must(conditions))
}

fn record_payload(key: &str, record: &Record) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert(CONTENT_FIELD.to_string(), record.content.clone().into());
    payload.insert(RECORD_KEY_FIELD.to_string(), key.to_string().into());
    for (name, value) in &record.metadata {
        let v: Value = match value {
            MetadataValue::Text(s) => s.clone().into(),
            MetadataValue::Numeric(n) => (*n).into(),
        };
        payload.insert(name.clone(), v);
    }
    payload
}

fn payload_record(payload: HashMap<String, Value>) -> Record {
    let mut record = Record::new(String::new());
    let mut metadata = Metadata::new();

    for (name, value) in payload {
        let decoded = match value.kind {
            Some(Kind::StringValue(s)) => MetadataValue::Text(s),
            Some(Kind::DoubleValue(n)) => MetadataValue::Numeric(n),
            Some(Kind::IntegerValue(n)) => MetadataValue::Numeric(n as f64),
            Some(Kind::BoolValue(b)) => MetadataValue::from(b),
            _ => continue,
        };
        match (name.as_str(), decoded) {
            (CONTENT_FIELD, MetadataValue::Text(s)) => record.content = s,
            (RECORD_KEY_FIELD, MetadataValue::Text(s)) => record.key = Some(s),
            (_, value) => {
                metadata.insert(name, value);
            }
        }
    }

    record.metadata = metadata;
    record
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn create_index(
        &self,
        name: &str,
        schema: &IndexSchema,
        distance: DistanceMetric,
    ) -> Result<(), VectorStoreError> {
        validate_index_name(name)?;
        schema.validate()?;

        if self.exists(name).await? {
            return Err(VectorStoreError::AlreadyExists(name.to_string()));
        }

        let create_collection = CreateCollectionBuilder::new(name).vectors_config(
            VectorParamsBuilder::new(self.embedder.dimension() as u64, to_qdrant_distance(distance)),
        );
        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        for field in &schema.fields {
            let field_type = match field.kind {
                FieldKind::Text => FieldType::Keyword,
                FieldKind::Numeric => FieldType::Float,
            };
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name,
                    field.name.as_str(),
                    field_type,
                ))
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        }

        self.collections.write().await.insert(
            name.to_string(),
            CollectionMeta {
                distance,
                schema: schema.clone(),
            },
        );
        debug!(index = name, fields = schema.fields.len(), "collection created");
        Ok(())
    }

    async fn drop_index(&self, name: &str) -> Result<(), VectorStoreError> {
        if !self.exists(name).await? {
            return Err(VectorStoreError::NotFound(name.to_string()));
        }
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn check_existing_index(&self, name: &str) -> bool {
        match self.exists(name).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(index = name, error = %e, "existence check failed");
                false
            }
        }
    }

    async fn list_indexes(&self) -> Result<Vec<String>, VectorStoreError> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        let mut names: Vec<String> = response.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }

    async fn count(&self, index: &str) -> Result<u64, VectorStoreError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(index).exact(true))
            .await
            .map_err(|e| missing_or(index, e.to_string(), VectorStoreError::CollectionError))?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn add_documents(
        &self,
        records: Vec<Record>,
        index: &str,
    ) -> Result<Vec<String>, VectorStoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if !self.exists(index).await? {
            self.collections.write().await.remove(index);
            return Err(VectorStoreError::NotFound(index.to_string()));
        }
        let meta = self.meta_of(index).await?;
        check_records(&meta.schema, &records)?;

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self.embedder.embed_documents(texts).await?;

        let mut keys = Vec::with_capacity(records.len());
        let points: Vec<PointStruct> = records
            .iter()
            .zip(vectors)
            .map(|(record, vector)| {
                let key = record.key.clone().unwrap_or_else(generate_key);
                let point = PointStruct::new(point_id(&key), vector, record_payload(&key, record));
                keys.push(key);
                point
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(index, points).wait(true))
            .await
            .map_err(|e| missing_or(index, e.to_string(), VectorStoreError::UpsertError))?;

        debug!(index, added = keys.len(), "points upserted");
        Ok(keys)
    }

    async fn delete_where(
        &self,
        filter: &MetadataFilter,
        index: &str,
    ) -> Result<(), VectorStoreError> {
        if !self.exists(index).await? {
            return Err(VectorStoreError::NotFound(index.to_string()));
        }
        let Some(filter) = build_filter(Some(filter)) else {
            return Ok(());
        };

        let delete = DeletePointsBuilder::new(index).points(filter).wait(true);
        self.client
            .delete_points(delete)
            .await
            .map_err(|e| missing_or(index, e.to_string(), VectorStoreError::DeleteError))?;
        debug!(index, "points deleted");
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        index: &str,
    ) -> Result<Vec<(Record, f32)>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let filter = build_filter(filter);

        if query.trim().is_empty() {
            let mut scroll = ScrollPointsBuilder::new(index)
                .limit(k as u32)
                .with_payload(true)
                .with_vectors(false);
            if let Some(f) = filter {
                scroll = scroll.filter(f);
            }
            let response = self
                .client
                .scroll(scroll)
                .await
                .map_err(|e| missing_or(index, e.to_string(), VectorStoreError::SearchError))?;
            return Ok(response
                .result
                .into_iter()
                .map(|point| (payload_record(point.payload), 0.0))
                .collect());
        }

        let metric = self.meta_of(index).await?.distance;
        let query_vector = self.embedder.embed_query(query).await?;

        let mut search = SearchPointsBuilder::new(index, query_vector, k as u64).with_payload(true);
        if let Some(f) = filter {
            search = search.filter(f);
        }

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| missing_or(index, e.to_string(), VectorStoreError::SearchError))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| (payload_record(point.payload), to_similarity(metric, point.score)))
            .collect())
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Qdrant
    }
}
