pub mod chatbot;
pub mod citation;
pub mod completion;
pub mod embedding;
pub mod history;
pub mod indexer;
pub mod intent;
pub mod loader;
pub mod prompts;
pub mod splitter;
pub mod vector_store;

pub use chatbot::{AnswerRequest, ChatBot};
pub use completion::ChatModel;
pub use embedding::{Embedder, build_embedder};
pub use history::HistoryManager;
pub use indexer::Indexer;
pub use intent::{Intent, IntentClassifier};
pub use vector_store::{VectorStore, create_vector_store};
