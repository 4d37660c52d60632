//! One conversation turn end to end.
//!
//! A turn reads history, optionally rephrases, routes by intent, answers,
//! rewrites citations and only then writes the exchange back. Apart from the
//! placeholder of a rolled-over session, nothing is persisted before the
//! answer exists, so an abandoned or failed turn leaves the session untouched.
//!
//! Two concurrent turns on the same session may pick the same sequence
//! number; callers that need strict ordering serialize per session.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{
    AgentExecutor, DocRetrievalPlanner, ReactPlanner, SalesRepository, ToolRegistry, sales_tools,
};
use crate::error::{AppError, ChatError, IndexError, VectorStoreError};
use crate::models::{Answer, ChatConfig, Config, HistorySearch, Message, RetrievalConfig};
use crate::services::citation::{extract_citations, strip_citations};
use crate::services::completion::{ChatModel, OpenAiChatClient};
use crate::services::embedding::build_embedder;
use crate::services::history::HistoryManager;
use crate::services::indexer::Indexer;
use crate::services::intent::{Intent, IntentClassifier};
use crate::services::prompts;
use crate::services::vector_store::{VectorStore, create_vector_store};

/// Inputs of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub session_id: String,
    pub question: String,
    pub index_name: String,
    #[serde(default)]
    pub condense_question: bool,
    /// Skips classification when set.
    #[serde(default)]
    pub strategy: Option<Intent>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AnswerRequest {
    pub fn new(
        session_id: impl Into<String>,
        question: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            index_name: index_name.into(),
            condense_question: false,
            strategy: None,
            user_id: None,
        }
    }
}

pub struct ChatBot {
    history: HistoryManager,
    indexer: Indexer,
    model: Arc<dyn ChatModel>,
    classifier: IntentClassifier,
    tools: ToolRegistry,
    executor: AgentExecutor,
    chat: ChatConfig,
    retrieval: RetrievalConfig,
}

impl ChatBot {
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn ChatModel>,
        repo: Arc<SalesRepository>,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            history: HistoryManager::new(
                Arc::clone(&store),
                &config.chat,
                config.vector_store.distance,
            ),
            indexer: Indexer::from_config(config, store)?,
            classifier: IntentClassifier::new(Arc::clone(&model)),
            model,
            tools: ToolRegistry::new(sales_tools(repo))?,
            executor: AgentExecutor::from_config(&config.agent),
            chat: config.chat.clone(),
            retrieval: config.retrieval.clone(),
        })
    }

    /// Wires the configured embedder, vector store, LLM and sales database.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let embedder = build_embedder(&config.embedding).map_err(VectorStoreError::from)?;
        let store = create_vector_store(&config.vector_store, embedder)?;
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiChatClient::new(&config.llm).map_err(ChatError::from)?);
        let repo = Arc::new(SalesRepository::open(&config.database.path)?);
        Ok(Self::new(config, store, model, repo)?)
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub async fn initialize_session(&self, user_id: Option<String>) -> Result<Message, ChatError> {
        Ok(self.history.initialize_session(user_id).await?)
    }

    pub async fn get_all_chat_history(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        Ok(self.history.get_all_messages(session_id).await?)
    }

    pub async fn answer(&self, request: &AnswerRequest) -> Result<Answer, ChatError> {
        let original_question = request.question.trim();
        if original_question.is_empty() {
            return Err(ChatError::InvalidQuestion("question is empty".to_string()));
        }
        let received = Utc::now();

        let (session_id, max_seq) = self
            .resolve_session(&request.session_id, request.user_id.clone())
            .await?;

        let past = match self.chat.history_search {
            HistorySearch::MostRecent => {
                self.history
                    .get_k_most_recent_messages(&session_id, self.chat.history_k)
                    .await?
            }
            HistorySearch::MostRelated => {
                self.history
                    .get_k_most_related_messages(
                        original_question,
                        &session_id,
                        self.chat.history_k,
                        self.chat.history_similarity_threshold,
                    )
                    .await?
            }
        };
        let chat_history = prompts::format_history(&past);

        let question = if request.condense_question && !past.is_empty() {
            self.rephrase(original_question, &chat_history).await?
        } else {
            original_question.to_string()
        };

        let intent = match request.strategy {
            Some(intent) => intent,
            None => self.classifier.classify(&question).await?,
        };
        info!(session_id = %session_id, %intent, "answering");

        let raw_answer = match intent {
            Intent::DocRetrieval => {
                self.answer_from_documents(&question, &chat_history, &request.index_name)
                    .await?
            }
            Intent::StructuredQuery => {
                let planner = ReactPlanner::new(Arc::clone(&self.model));
                self.executor
                    .run(&planner, &self.tools, &question, &chat_history, "")
                    .await?
                    .output
            }
            Intent::Other => self
                .model
                .complete(&prompts::no_context(&question, &chat_history))
                .await?
                .trim()
                .to_string(),
        };

        let cited = extract_citations(&raw_answer);

        let user_id = request.user_id.clone();
        let question_msg = Message::new(original_question, session_id.as_str(), max_seq + 1)
            .with_user(user_id.clone())
            .with_received(received)
            .with_responded(received);
        let answer_msg = Message::new(
            strip_citations(&raw_answer).trim(),
            session_id.as_str(),
            max_seq + 2,
        )
        .with_user(user_id)
        .with_received(received)
        .with_responded(Utc::now())
        .by_bot();
        self.history.add_qa_pair(&question_msg, &answer_msg).await?;

        Ok(Answer {
            message: Message {
                text: cited.text,
                ..answer_msg
            },
            sources: cited.sources,
        })
    }

    /// The session to write into and its current highest sequence number.
    /// Sessions past the message cap or the timeout roll over to a new one.
    async fn resolve_session(
        &self,
        session_id: &str,
        user_id: Option<String>,
    ) -> Result<(String, u64), ChatError> {
        let (max_seq, earliest) = self
            .history
            .get_max_sequence_num_and_earliest_time(session_id)
            .await?;

        let too_long = max_seq + 2 > self.chat.max_messages;
        let timeout = ChronoDuration::seconds(self.chat.session_timeout_secs as i64);
        let too_old = Utc::now() - earliest > timeout;
        if !too_long && !too_old {
            return Ok((session_id.to_string(), max_seq));
        }

        let fresh = self.history.initialize_session(user_id).await?;
        info!(
            old = session_id,
            new = %fresh.session_id,
            max_seq,
            too_old,
            "session rolled over"
        );
        Ok((fresh.session_id, 0))
    }

    async fn rephrase(&self, question: &str, chat_history: &str) -> Result<String, ChatError> {
        let reply = self
            .model
            .complete(&prompts::rephrase(question, chat_history))
            .await?;
        let rephrased = reply.trim();
        debug!(original = question, rephrased, "question rephrased");
        Ok(if rephrased.is_empty() {
            question.to_string()
        } else {
            rephrased.to_string()
        })
    }

    async fn answer_from_documents(
        &self,
        question: &str,
        chat_history: &str,
        index: &str,
    ) -> Result<String, ChatError> {
        let hits: Vec<_> = self
            .indexer
            .retriever(index, self.retrieval.top_k)
            .retrieve(question)
            .await
            .map_err(IndexError::from)?
            .into_iter()
            .filter(|(_, score)| *score >= self.retrieval.similarity_threshold)
            .collect();
        debug!(index, hits = hits.len(), "context retrieved");

        let context = prompts::format_context(&hits);
        let planner = DocRetrievalPlanner::new(Arc::clone(&self.model));
        let run = self
            .executor
            .run(&planner, &ToolRegistry::empty(), question, chat_history, &context)
            .await?;
        Ok(run.output)
    }
}
