//! Vector records, metadata values and index schemas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::VectorStoreError;

/// Payload field holding the record text.
pub const CONTENT_FIELD: &str = "content";
/// Payload field holding the caller-supplied record key.
pub const RECORD_KEY_FIELD: &str = "record_key";

const RESERVED_FIELDS: [&str; 2] = [CONTENT_FIELD, RECORD_KEY_FIELD];

/// A single metadata value. Only text and numbers are indexable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Numeric(f64),
}

impl MetadataValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            MetadataValue::Text(_) => FieldKind::Text,
            MetadataValue::Numeric(_) => FieldKind::Numeric,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Numeric(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Numeric(n) => Some(*n),
            MetadataValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Text(s) => write!(f, "{}", s),
            MetadataValue::Numeric(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Numeric(value)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::Numeric(value as f64)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Numeric(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Numeric(if value { 1.0 } else { 0.0 })
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Text plus metadata, the unit written to and read from an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Caller key for idempotent overwrite. Generated by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            key: None,
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).and_then(MetadataValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.metadata.get(name).and_then(MetadataValue::as_f64)
    }
}

/// Exact-match conditions over metadata. Every entry must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub conditions: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, name: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(name, expected)| metadata.get(name) == Some(expected))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Numeric,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Numeric => write!(f, "numeric"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Declared metadata fields of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub fields: Vec<FieldSpec>,
}

impl IndexSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Text,
        });
        self
    }

    pub fn numeric(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Numeric,
        });
        self
    }

    /// Schema used for document chunks: `source` and `chunk_id`.
    pub fn documents() -> Self {
        Self::new().text("source").numeric("chunk_id")
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn validate(&self) -> Result<(), VectorStoreError> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(VectorStoreError::InvalidSchema(
                    "field names must not be empty".to_string(),
                ));
            }
            if RESERVED_FIELDS.contains(&field.name.as_str()) {
                return Err(VectorStoreError::InvalidSchema(format!(
                    "`{}` is a reserved field name",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(VectorStoreError::InvalidSchema(format!(
                    "duplicate field `{}`",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Rejects metadata whose declared fields carry the wrong kind.
    pub fn check(&self, metadata: &Metadata) -> Result<(), VectorStoreError> {
        for (name, value) in metadata {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(VectorStoreError::SchemaMismatch(format!(
                    "`{}` is a reserved field name",
                    name
                )));
            }
            if let Some(kind) = self.kind_of(name)
                && kind != value.kind()
            {
                return Err(VectorStoreError::SchemaMismatch(format!(
                    "field `{}` is declared {} but got {}",
                    name,
                    kind,
                    value.kind()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_value_serde_untagged() {
        let meta: Metadata =
            serde_json::from_str(r#"{"source": "a.txt", "chunk_id": 3}"#).unwrap();
        assert_eq!(meta["source"], MetadataValue::Text("a.txt".to_string()));
        assert_eq!(meta["chunk_id"], MetadataValue::Numeric(3.0));
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let record = Record::new("hello")
            .with_meta("session_id", "s1")
            .with_meta("sequence_num", 2u64);

        assert!(MetadataFilter::new().matches(&record.metadata));
        assert!(
            MetadataFilter::new()
                .eq("session_id", "s1")
                .matches(&record.metadata)
        );
        assert!(
            !MetadataFilter::new()
                .eq("session_id", "s1")
                .eq("sequence_num", 3u64)
                .matches(&record.metadata)
        );
        assert!(
            !MetadataFilter::new()
                .eq("user_id", "u")
                .matches(&record.metadata)
        );
    }

    #[test]
    fn test_schema_validate() {
        assert!(IndexSchema::documents().validate().is_ok());
        assert!(IndexSchema::new().text("a").numeric("a").validate().is_err());
        assert!(IndexSchema::new().text("content").validate().is_err());
        assert!(IndexSchema::new().text(" ").validate().is_err());
    }

    #[test]
    fn test_schema_check_kinds() {
        let schema = IndexSchema::documents();
        let ok = Record::new("x").with_meta("source", "a").with_meta("chunk_id", 0usize);
        assert!(schema.check(&ok.metadata).is_ok());

        let bad = Record::new("x").with_meta("chunk_id", "zero");
        assert!(matches!(
            schema.check(&bad.metadata),
            Err(VectorStoreError::SchemaMismatch(_))
        ));

        let extra = Record::new("x").with_meta("page", 4u64);
        assert!(schema.check(&extra.metadata).is_ok());
    }
}
