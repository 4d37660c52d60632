//! Conversation messages and their record encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{Metadata, MetadataValue, Record};
use crate::error::HistoryError;

pub const SESSION_ID_FIELD: &str = "session_id";
pub const SEQUENCE_NUM_FIELD: &str = "sequence_num";
pub const USER_ID_FIELD: &str = "user_id";
pub const IS_BOT_FIELD: &str = "is_bot";
pub const RECEIVED_FIELD: &str = "received_timestamp";
pub const RESPONDED_FIELD: &str = "responded_timestamp";

/// One turn fragment of a session. `sequence_num == 0` marks the session placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub session_id: String,
    pub sequence_num: u64,
    pub received_timestamp: DateTime<Utc>,
    pub responded_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Message {
    pub fn new(text: impl Into<String>, session_id: impl Into<String>, sequence_num: u64) -> Self {
        let now = Utc::now();
        Self {
            text: text.into(),
            session_id: session_id.into(),
            sequence_num,
            received_timestamp: now,
            responded_timestamp: now,
            user_id: None,
            is_bot: false,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn by_bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    pub fn with_received(mut self, at: DateTime<Utc>) -> Self {
        self.received_timestamp = at;
        self
    }

    pub fn with_responded(mut self, at: DateTime<Utc>) -> Self {
        self.responded_timestamp = at;
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.sequence_num == 0
    }

    /// Deterministic key so that replays overwrite instead of duplicating.
    pub fn record_key(&self) -> String {
        format!("{}:{}", self.session_id, self.sequence_num)
    }

    pub fn to_record(&self) -> Record {
        let mut metadata = Metadata::new();
        metadata.insert(SESSION_ID_FIELD.into(), self.session_id.clone().into());
        metadata.insert(SEQUENCE_NUM_FIELD.into(), self.sequence_num.into());
        metadata.insert(IS_BOT_FIELD.into(), self.is_bot.into());
        metadata.insert(
            RECEIVED_FIELD.into(),
            self.received_timestamp.to_rfc3339().into(),
        );
        metadata.insert(
            RESPONDED_FIELD.into(),
            self.responded_timestamp.to_rfc3339().into(),
        );
        if let Some(user) = &self.user_id {
            metadata.insert(USER_ID_FIELD.into(), user.clone().into());
        }

        Record {
            key: Some(self.record_key()),
            content: self.text.clone(),
            metadata,
        }
    }

    pub fn from_record(record: &Record) -> Result<Self, HistoryError> {
        let session_id = record
            .text(SESSION_ID_FIELD)
            .ok_or_else(|| HistoryError::Decode("missing session_id".to_string()))?
            .to_string();
        let sequence_num = record
            .number(SEQUENCE_NUM_FIELD)
            .filter(|n| *n >= 0.0)
            .ok_or_else(|| HistoryError::Decode("missing sequence_num".to_string()))?
            as u64;

        Ok(Self {
            text: record.content.clone(),
            session_id,
            sequence_num,
            received_timestamp: parse_timestamp(record.metadata.get(RECEIVED_FIELD))?,
            responded_timestamp: parse_timestamp(record.metadata.get(RESPONDED_FIELD))?,
            user_id: record.text(USER_ID_FIELD).map(str::to_string),
            is_bot: record.number(IS_BOT_FIELD).is_some_and(|n| n != 0.0),
        })
    }
}

fn parse_timestamp(value: Option<&MetadataValue>) -> Result<DateTime<Utc>, HistoryError> {
    let raw = value
        .and_then(MetadataValue::as_text)
        .ok_or_else(|| HistoryError::Decode("missing timestamp".to_string()))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| HistoryError::Decode(format!("bad timestamp `{}`: {}", raw, e)))
}

/// Role of a completion message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message sent to the completion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
