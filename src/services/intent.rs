//! Routes a question to a response strategy.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CompletionError;
use crate::services::completion::ChatModel;
use crate::services::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Answer from an indexed corpus.
    DocRetrieval,
    /// Answer through the structured-data tools.
    StructuredQuery,
    /// Answer without retrieved context.
    Other,
}

impl Intent {
    /// Reads a classifier reply; anything unrecognised is `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .trim_matches(|c: char| c == '\'' || c == '"' || c == '.' || c == '`')
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "docretrieval" => Self::DocRetrieval,
            "structuredquery" | "mdrtqna" => Self::StructuredQuery,
            _ => Self::Other,
        }
    }
}

/// Explicit strategy names accepted from callers: `doc`, `structured`, `other`.
impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doc" | "doc_retrieval" => Ok(Self::DocRetrieval),
            "structured" | "structured_query" => Ok(Self::StructuredQuery),
            "other" => Ok(Self::Other),
            _ => Err(format!(
                "Invalid strategy: {}. Valid options: doc, structured, other",
                s
            )),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocRetrieval => write!(f, "doc"),
            Self::StructuredQuery => write!(f, "structured"),
            Self::Other => write!(f, "other"),
        }
    }
}

pub struct IntentClassifier {
    model: Arc<dyn ChatModel>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn classify(&self, question: &str) -> Result<Intent, CompletionError> {
        let reply = self.model.complete(&prompts::intent(question)).await?;
        // Only the first line counts; models sometimes explain themselves after.
        let intent = Intent::from_label(reply.lines().next().unwrap_or_default());
        debug!(reply = %reply.trim(), %intent, "intent classified");
        Ok(intent)
    }
}
