use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{Answer, Message, OutputFormat, Record};
use crate::services::indexer::{CHUNK_ID_FIELD, SOURCE_FIELD};
use crate::utils::text::{PREVIEW_CHARS, preview, single_line};

pub trait Formatter {
    fn format_answer(&self, answer: &Answer) -> String;
    fn format_session(&self, session: &Message) -> String;
    fn format_history(&self, session_id: &str, messages: &[Message]) -> String;
    fn format_search_hits(&self, hits: &SearchHits) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_index_stats(&self, stats: &IndexStats) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub source: Option<String>,
    pub chunk_id: Option<u64>,
    pub content: String,
}

impl SearchHit {
    pub fn from_record(record: &Record, score: f32) -> Self {
        Self {
            score,
            source: record.text(SOURCE_FIELD).map(str::to_string),
            chunk_id: record.number(CHUNK_ID_FIELD).map(|n| n as u64),
            content: record.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHits {
    pub index: String,
    pub query: String,
    pub duration_ms: u64,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub name: String,
    pub records: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub vector_store_driver: String,
    /// Server URL or snapshot directory, depending on the driver.
    pub vector_store_location: String,
    pub vector_store_connected: bool,
    pub indexes: Vec<IndexSummary>,
    pub history_index: String,
    pub llm_url: String,
    pub chat_model: String,
    pub embedding_provider: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub index: String,
    pub sources_scanned: u64,
    pub sources_indexed: u64,
    pub sources_skipped: u64,
    pub chunks_created: u64,
    pub duration_ms: u64,
}

fn speaker(message: &Message) -> &'static str {
    if message.is_bot { "bot" } else { "user" }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_answer(&self, answer: &Answer) -> String {
        let mut output = String::new();
        writeln!(output, "{}", answer.message.text).unwrap();
        if !answer.sources.is_empty() {
            writeln!(output, "\nSources:").unwrap();
            for (index, source) in answer.sources.iter() {
                writeln!(output, "  [{}] {}", index, source).unwrap();
            }
        }
        writeln!(output, "\nSession: {}", answer.message.session_id).unwrap();
        output
    }

    fn format_session(&self, session: &Message) -> String {
        format!("{}\n", session.session_id)
    }

    fn format_history(&self, session_id: &str, messages: &[Message]) -> String {
        if messages.is_empty() {
            return format!("No messages in session: {}\n", session_id);
        }

        let mut output = String::new();
        writeln!(output, "Session {}", session_id).unwrap();
        writeln!(output, "{} message(s)\n", messages.len()).unwrap();
        for message in messages {
            writeln!(
                output,
                "#{} [{}] {}",
                message.sequence_num,
                speaker(message),
                message.responded_timestamp.format("%Y-%m-%d %H:%M:%S")
            )
            .unwrap();
            for line in message.text.lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }
        output
    }

    fn format_search_hits(&self, results: &SearchHits) -> String {
        if results.hits.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(
            output,
            "Search results for: \"{}\" in {}",
            results.query, results.index
        )
        .unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.hits.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, hit) in results.hits.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, hit.score).unwrap();
            if let Some(ref source) = hit.source {
                let chunk = hit.chunk_id.map(|c| format!(" #{}", c)).unwrap_or_default();
                writeln!(output, "   Source: {}{}", source, chunk).unwrap();
            }
            writeln!(output, "   ---").unwrap();
            for line in preview(&hit.content, PREVIEW_CHARS).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} ({})",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "  Location:    {}", status.vector_store_location).unwrap();
        if status.indexes.is_empty() {
            writeln!(output, "  Indexes:     none").unwrap();
        } else {
            writeln!(output, "  Indexes:").unwrap();
            for index in &status.indexes {
                let marker = if index.name == status.history_index {
                    " (history)"
                } else {
                    ""
                };
                writeln!(output, "    {} ({} records){}", index.name, index.records, marker)
                    .unwrap();
            }
        }
        writeln!(output).unwrap();

        writeln!(output, "LLM:           {}", status.chat_model).unwrap();
        writeln!(output, "  URL:         {}", status.llm_url).unwrap();
        writeln!(
            output,
            "Embedding:     {} ({})",
            status.embedding_model, status.embedding_provider
        )
        .unwrap();

        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        writeln!(output, "Indexing Complete: {}", stats.index).unwrap();
        writeln!(output, "-----------------").unwrap();
        writeln!(output, "Sources scanned: {}", stats.sources_scanned).unwrap();
        writeln!(output, "Sources indexed: {}", stats.sources_indexed).unwrap();
        writeln!(output, "Sources skipped: {}", stats.sources_skipped).unwrap();
        writeln!(output, "Chunks created: {}", stats.chunks_created).unwrap();
        writeln!(output, "Duration: {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_answer(&self, answer: &Answer) -> String {
        self.render(&serde_json::json!({
            "answer": answer.message.text,
            "sources": answer.sources,
            "session_id": answer.message.session_id,
            "sequence_num": answer.message.sequence_num,
        }))
    }

    fn format_session(&self, session: &Message) -> String {
        self.render(&serde_json::json!({ "session": session }))
    }

    fn format_history(&self, session_id: &str, messages: &[Message]) -> String {
        self.render(&serde_json::json!({
            "session_id": session_id,
            "history": messages,
        }))
    }

    fn format_search_hits(&self, results: &SearchHits) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        self.render(stats)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_answer(&self, answer: &Answer) -> String {
        let mut output = String::new();
        writeln!(output, "{}\n", answer.message.text).unwrap();
        if !answer.sources.is_empty() {
            writeln!(output, "### Sources\n").unwrap();
            for (index, source) in answer.sources.iter() {
                writeln!(output, "{}. `{}`", index, source).unwrap();
            }
            writeln!(output).unwrap();
        }
        writeln!(output, "*Session:* `{}`", answer.message.session_id).unwrap();
        output
    }

    fn format_session(&self, session: &Message) -> String {
        format!("**Session:** `{}`\n", session.session_id)
    }

    fn format_history(&self, session_id: &str, messages: &[Message]) -> String {
        if messages.is_empty() {
            return format!("## History\n\n*No messages in session `{}`.*\n", session_id);
        }

        let mut output = String::new();
        writeln!(output, "## History of `{}`\n", session_id).unwrap();
        writeln!(output, "| # | Speaker | Time | Text |").unwrap();
        writeln!(output, "|---|---------|------|------|").unwrap();
        for message in messages {
            writeln!(
                output,
                "| {} | {} | {} | {} |",
                message.sequence_num,
                speaker(message),
                message.responded_timestamp.to_rfc3339(),
                single_line(&message.text).replace('|', "\\|")
            )
            .unwrap();
        }
        output
    }

    fn format_search_hits(&self, results: &SearchHits) -> String {
        if results.hits.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(output, "**Index:** `{}`\n", results.index).unwrap();

        for (i, hit) in results.hits.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, hit.score).unwrap();
            if let Some(ref source) = hit.source {
                writeln!(output, "**Source:** `{}`\n", source).unwrap();
            }
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", hit.content).unwrap();
            writeln!(output, "```\n").unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let vector_status = if status.vector_store_connected {
            "✅"
        } else {
            "❌"
        };
        writeln!(
            output,
            "### Vector Store ({}) {}\n",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "- **Location:** `{}`", status.vector_store_location).unwrap();
        for index in &status.indexes {
            writeln!(output, "- **{}:** {} records", index.name, index.records).unwrap();
        }
        writeln!(output).unwrap();

        writeln!(output, "### Models\n").unwrap();
        writeln!(output, "- **LLM:** {} (`{}`)", status.chat_model, status.llm_url).unwrap();
        writeln!(
            output,
            "- **Embedding:** {} ({})",
            status.embedding_model, status.embedding_provider
        )
        .unwrap();

        output
    }

    fn format_index_stats(&self, stats: &IndexStats) -> String {
        let mut output = String::new();
        writeln!(output, "## Indexing Complete: `{}`\n", stats.index).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Sources scanned | {} |", stats.sources_scanned).unwrap();
        writeln!(output, "| Sources indexed | {} |", stats.sources_indexed).unwrap();
        writeln!(output, "| Sources skipped | {} |", stats.sources_skipped).unwrap();
        writeln!(output, "| Chunks created | {} |", stats.chunks_created).unwrap();
        writeln!(output, "| Duration | {}ms |", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sources;
    use std::collections::BTreeMap;

    fn answer() -> Answer {
        Answer {
            message: Message::new("Paris is the capital [1].", "s-1", 2).by_bot(),
            sources: Sources(BTreeMap::from([(1, "docs/A.txt".to_string())])),
        }
    }

    #[test]
    fn test_text_answer_lists_sources() {
        let text = TextFormatter.format_answer(&answer());
        assert!(text.starts_with("Paris is the capital [1]."));
        assert!(text.contains("[1] docs/A.txt"));
        assert!(text.contains("Session: s-1"));
    }

    #[test]
    fn test_json_answer_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(false).format_answer(&answer())).unwrap();
        assert_eq!(json["answer"], "Paris is the capital [1].");
        assert_eq!(json["sources"]["1"], "docs/A.txt");
        assert_eq!(json["session_id"], "s-1");
    }

    #[test]
    fn test_history_formats() {
        let messages = vec![Message::new("Human:hi\nBot:hello", "s-1", 2).by_bot()];
        let text = TextFormatter.format_history("s-1", &messages);
        assert!(text.contains("#2 [bot]"));
        assert!(text.contains("   Human:hi"));

        let md = MarkdownFormatter.format_history("s-1", &messages);
        assert!(md.contains("| 2 | bot |"));
        assert!(md.contains("Human:hi Bot:hello"));

        assert!(TextFormatter.format_history("s-2", &[]).contains("No messages"));
    }

    #[test]
    fn test_search_hit_from_record() {
        let record = Record::new("Paris")
            .with_meta(SOURCE_FIELD, "A.txt")
            .with_meta(CHUNK_ID_FIELD, 3u64);
        let hit = SearchHit::from_record(&record, 0.5);
        assert_eq!(hit.source.as_deref(), Some("A.txt"));
        assert_eq!(hit.chunk_id, Some(3));

        let hits = SearchHits {
            index: "kb".to_string(),
            query: "capital".to_string(),
            duration_ms: 1,
            hits: vec![hit],
        };
        assert!(TextFormatter.format_search_hits(&hits).contains("Source: A.txt #3"));
    }
}
