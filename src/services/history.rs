//! Session history kept in a reserved vector index.
//!
//! Each record is keyed by `{session_id}:{sequence_num}`, so replays overwrite.
//! Recency is recovered by fetching the whole session (bounded by the session
//! cap) and sorting on `sequence_num`, since the store itself is unordered.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{HistoryError, VectorStoreError};
use crate::models::{
    ChatConfig, DistanceMetric, IS_BOT_FIELD, IndexSchema, Message, MetadataFilter,
    RECEIVED_FIELD, RESPONDED_FIELD, Record, SEQUENCE_NUM_FIELD, SESSION_ID_FIELD, USER_ID_FIELD,
};
use crate::services::vector_store::VectorStore;

pub struct HistoryManager {
    store: Arc<dyn VectorStore>,
    index: String,
    max_messages: usize,
    distance: DistanceMetric,
}

impl HistoryManager {
    pub fn new(store: Arc<dyn VectorStore>, config: &ChatConfig, distance: DistanceMetric) -> Self {
        Self {
            store,
            index: config.history_index.clone(),
            max_messages: config.max_messages as usize,
            distance,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn schema() -> IndexSchema {
        IndexSchema::new()
            .text(SESSION_ID_FIELD)
            .numeric(SEQUENCE_NUM_FIELD)
            .text(USER_ID_FIELD)
            .numeric(IS_BOT_FIELD)
            .text(RECEIVED_FIELD)
            .text(RESPONDED_FIELD)
    }

    async fn ensure_index(&self) -> Result<(), HistoryError> {
        if self.store.check_existing_index(&self.index).await {
            return Ok(());
        }
        match self
            .store
            .create_index(&self.index, &Self::schema(), self.distance)
            .await
        {
            Ok(()) => {
                info!(index = %self.index, "history index created");
                Ok(())
            }
            // Another caller created it between the check and the create.
            Err(VectorStoreError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Start a session by writing its placeholder message (`sequence_num = 0`).
    pub async fn initialize_session(&self, user_id: Option<String>) -> Result<Message, HistoryError> {
        let session_id = Uuid::new_v4().to_string();
        let placeholder = Message::new("", session_id, 0).with_user(user_id);
        self.add_message(&placeholder).await?;
        info!(session_id = %placeholder.session_id, "session initialized");
        Ok(placeholder)
    }

    pub async fn add_message(&self, message: &Message) -> Result<(), HistoryError> {
        self.ensure_index().await?;
        self.store
            .add_documents(vec![message.to_record()], &self.index)
            .await?;
        debug!(key = %message.record_key(), "message stored");
        Ok(())
    }

    /// Store a question and its answer as one record under the answer's sequence number.
    pub async fn add_qa_pair(&self, question: &Message, answer: &Message) -> Result<(), HistoryError> {
        let pair = Message {
            text: format!("Human:{}\nBot:{}", question.text, answer.text),
            received_timestamp: question.received_timestamp,
            user_id: answer.user_id.clone().or_else(|| question.user_id.clone()),
            ..answer.clone()
        };
        self.add_message(&pair).await
    }

    async fn session_hits(
        &self,
        query: &str,
        session_id: &str,
        k: usize,
    ) -> Result<Vec<(Record, f32)>, HistoryError> {
        if !self.store.check_existing_index(&self.index).await {
            return Ok(Vec::new());
        }
        let filter = MetadataFilter::new().eq(SESSION_ID_FIELD, session_id);
        Ok(self
            .store
            .similarity_search(query, k, Some(&filter), &self.index)
            .await?)
    }

    /// The last `k` messages of a session in chronological order.
    pub async fn get_k_most_recent_messages(
        &self,
        session_id: &str,
        k: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        let hits = self.session_hits("", session_id, self.max_messages).await?;

        let mut messages = hits
            .iter()
            .map(|(record, _)| Message::from_record(record))
            .collect::<Result<Vec<_>, _>>()?;
        messages.retain(|m| !m.is_placeholder());
        messages.sort_by(|a, b| b.sequence_num.cmp(&a.sequence_num));
        messages.truncate(k);
        messages.reverse();
        Ok(messages)
    }

    /// Up to `k` messages scoring at least `score_threshold` against `query`,
    /// returned in chronological order.
    pub async fn get_k_most_related_messages(
        &self,
        query: &str,
        session_id: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<Message>, HistoryError> {
        // One extra slot in case the placeholder ranks among the top k.
        let hits = self.session_hits(query, session_id, k + 1).await?;

        let mut messages = Vec::with_capacity(k);
        for (record, score) in &hits {
            if *score < score_threshold {
                continue;
            }
            let message = Message::from_record(record)?;
            if !message.is_placeholder() && messages.len() < k {
                messages.push(message);
            }
        }
        messages.sort_by_key(|m| m.sequence_num);
        Ok(messages)
    }

    pub async fn get_all_messages(&self, session_id: &str) -> Result<Vec<Message>, HistoryError> {
        self.get_k_most_recent_messages(session_id, self.max_messages)
            .await
    }

    /// Highest sequence number and earliest receive time; `(0, now)` for an empty session.
    pub async fn get_max_sequence_num_and_earliest_time(
        &self,
        session_id: &str,
    ) -> Result<(u64, DateTime<Utc>), HistoryError> {
        let messages = self.get_all_messages(session_id).await?;
        let max_seq = messages.iter().map(|m| m.sequence_num).max().unwrap_or(0);
        let earliest = messages
            .iter()
            .map(|m| m.received_timestamp)
            .min()
            .unwrap_or_else(Utc::now);
        Ok((max_seq, earliest))
    }

    /// Drop the whole history index, for every session.
    pub async fn clear_all_history(&self) -> Result<(), HistoryError> {
        if !self.store.check_existing_index(&self.index).await {
            return Ok(());
        }
        self.store.drop_index(&self.index).await?;
        info!(index = %self.index, "history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::HashingEmbedder;
    use crate::services::vector_store::InMemoryVectorStore;
    use chrono::TimeZone;

    fn manager(max_messages: u64) -> HistoryManager {
        let store: Arc<dyn VectorStore> =
            Arc::new(InMemoryVectorStore::new(Arc::new(HashingEmbedder::new(256)), None));
        let config = ChatConfig {
            max_messages,
            ..Default::default()
        };
        HistoryManager::new(store, &config, DistanceMetric::Cosine)
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, secs).unwrap()
    }

    fn msg(text: &str, session: &str, seq: u64, secs: u32, bot: bool) -> Message {
        let m = Message::new(text, session, seq)
            .with_user(Some("1".to_string()))
            .with_received(at(secs))
            .with_responded(at(secs));
        if bot { m.by_bot() } else { m }
    }

    async fn seed(manager: &HistoryManager) {
        for session in ["1", "2"] {
            manager
                .add_message(&msg("", session, 0, 0, false))
                .await
                .unwrap();
            manager
                .add_qa_pair(
                    &msg("Hello, Chatbot!", session, 1, 0, false),
                    &msg("Hello, User!", session, 2, 1, true),
                )
                .await
                .unwrap();
            manager
                .add_qa_pair(
                    &msg("What can you do?", session, 3, 2, false),
                    &msg("I can answer your questions.", session, 4, 3, true),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_recent_messages_are_chronological_without_placeholder() {
        let manager = manager(100);
        seed(&manager).await;

        let messages = manager.get_k_most_recent_messages("1", 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence_num, 2);
        assert_eq!(messages[1].sequence_num, 4);
        assert_eq!(messages[0].text, "Human:Hello, Chatbot!\nBot:Hello, User!");
        assert_eq!(
            messages[1].text,
            "Human:What can you do?\nBot:I can answer your questions."
        );
        assert!(messages.iter().all(|m| m.session_id == "1"));
    }

    #[tokio::test]
    async fn test_recent_messages_returns_min_k_n() {
        let manager = manager(100);
        for seq in 0..=6 {
            manager
                .add_message(&msg(&format!("turn {seq}"), "s", seq, seq as u32, seq % 2 == 0))
                .await
                .unwrap();
        }
        let last_three = manager.get_k_most_recent_messages("s", 3).await.unwrap();
        let seqs: Vec<u64> = last_three.iter().map(|m| m.sequence_num).collect();
        assert_eq!(seqs, vec![4, 5, 6]);

        let all = manager.get_k_most_recent_messages("s", 50).await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].sequence_num < w[1].sequence_num));
    }

    #[tokio::test]
    async fn test_related_messages_sorted_by_sequence() {
        let manager = manager(100);
        seed(&manager).await;

        let messages = manager
            .get_k_most_related_messages("What can you do?", "1", 2, -1.0)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].sequence_num < messages[1].sequence_num);
        assert!(messages.iter().all(|m| !m.is_placeholder()));
    }

    #[tokio::test]
    async fn test_related_messages_threshold() {
        let manager = manager(100);
        seed(&manager).await;

        let messages = manager
            .get_k_most_related_messages("What can you do?", "2", 4, 0.99)
            .await
            .unwrap();
        assert!(messages.is_empty());

        let messages = manager
            .get_k_most_related_messages("What can you do?", "2", 1, 0.1)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence_num, 4);
    }

    #[tokio::test]
    async fn test_replayed_message_overwrites() {
        let manager = manager(100);
        let m = msg("first", "s", 1, 0, false);
        manager.add_message(&m).await.unwrap();
        manager
            .add_message(&Message {
                text: "second".to_string(),
                ..m
            })
            .await
            .unwrap();

        let messages = manager.get_all_messages("s").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "second");
    }

    #[tokio::test]
    async fn test_max_sequence_and_earliest_time() {
        let manager = manager(100);
        let (seq, _) = manager
            .get_max_sequence_num_and_earliest_time("nobody")
            .await
            .unwrap();
        assert_eq!(seq, 0);

        seed(&manager).await;
        let (seq, earliest) = manager
            .get_max_sequence_num_and_earliest_time("1")
            .await
            .unwrap();
        assert_eq!(seq, 4);
        assert_eq!(earliest, at(0));
    }

    #[tokio::test]
    async fn test_initialize_session_and_clear() {
        let manager = manager(100);
        let placeholder = manager
            .initialize_session(Some("u1".to_string()))
            .await
            .unwrap();
        assert_eq!(placeholder.sequence_num, 0);
        assert!(manager.get_all_messages(&placeholder.session_id).await.unwrap().is_empty());
        assert_eq!(manager.store.count(manager.index()).await.unwrap(), 1);

        manager.clear_all_history().await.unwrap();
        assert!(!manager.store.check_existing_index(manager.index()).await);
        manager.clear_all_history().await.unwrap();
    }
}
