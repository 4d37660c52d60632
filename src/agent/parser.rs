//! Parsers turning raw planner output into an [`AgentStep`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::{AgentAction, AgentFinish, AgentStep};
use crate::error::AgentError;

pub const FINAL_ANSWER: &str = "Final Answer";

pub trait OutputParser: Send + Sync {
    fn parse(&self, output: &str) -> Result<AgentStep, AgentError>;
}

static RE_JSON_BLOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?[ \t]*\n(.*?)```").unwrap());

/// Reads a fenced JSON blob `{"action": ..., "action_input": ...}`.
///
/// Output without a fenced blob is taken as the final answer verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBlobParser;

impl OutputParser for JsonBlobParser {
    fn parse(&self, output: &str) -> Result<AgentStep, AgentError> {
        let Some(caps) = RE_JSON_BLOB.captures(output) else {
            return Ok(AgentStep::Finish(AgentFinish {
                output: output.trim().to_string(),
                log: output.to_string(),
            }));
        };

        let mut blob: Value = serde_json::from_str(caps[1].trim())
            .map_err(|e| AgentError::ParseError(format!("{}: {}", e, output)))?;

        if let Value::Array(items) = blob {
            if items.len() > 1 {
                warn!(count = items.len(), "planner returned several actions, using the first");
            }
            blob = items
                .into_iter()
                .next()
                .ok_or_else(|| AgentError::ParseError(format!("empty action list: {}", output)))?;
        }

        let action = blob
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::ParseError(format!("missing `action`: {}", output)))?
            .trim()
            .to_string();
        let input = blob
            .get("action_input")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        if action == FINAL_ANSWER {
            let text = match input {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return Ok(AgentStep::Finish(AgentFinish {
                output: text,
                log: output.to_string(),
            }));
        }

        Ok(AgentStep::Action(AgentAction {
            tool: action,
            input,
            log: output.to_string(),
        }))
    }
}

static RE_TEXT_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:(.*?)\nAction\s*\d*\s*Input\s*\d*\s*:\s*(.*)").unwrap()
});

/// Reads the `Final Answer:` / `Action:` + `Action Input:` text format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextActionParser;

impl OutputParser for TextActionParser {
    fn parse(&self, output: &str) -> Result<AgentStep, AgentError> {
        let marker = format!("{}:", FINAL_ANSWER);
        if let Some(pos) = output.rfind(&marker) {
            return Ok(AgentStep::Finish(AgentFinish {
                output: output[pos + marker.len()..].trim().to_string(),
                log: output.to_string(),
            }));
        }

        let caps = RE_TEXT_ACTION
            .captures(output)
            .ok_or_else(|| AgentError::ParseError(output.to_string()))?;
        let tool = caps[1].trim().to_string();
        let raw_input = caps[2].trim().trim_matches('"');
        let input = serde_json::from_str(raw_input)
            .unwrap_or_else(|_| Value::String(raw_input.to_string()));

        Ok(AgentStep::Action(AgentAction {
            tool,
            input,
            log: output.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_blob_action() {
        let output = "Thought: need sales\nAction:\n```\n{\"action\": \"get_agent_sales\", \"action_input\": {\"agent_name\": \"Peter Chan\"}}\n```";
        match JsonBlobParser.parse(output).unwrap() {
            AgentStep::Action(action) => {
                assert_eq!(action.tool, "get_agent_sales");
                assert_eq!(action.input, json!({"agent_name": "Peter Chan"}));
                assert_eq!(action.log, output);
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_json_blob_final_answer() {
        let output = "```json\n{\"action\": \"Final Answer\", \"action_input\": \"He qualifies.\"}\n```";
        match JsonBlobParser.parse(output).unwrap() {
            AgentStep::Finish(finish) => assert_eq!(finish.output, "He qualifies."),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_json_blob_list_takes_first() {
        let output = "```\n[{\"action\": \"a\", \"action_input\": {}}, {\"action\": \"b\"}]\n```";
        match JsonBlobParser.parse(output).unwrap() {
            AgentStep::Action(action) => assert_eq!(action.tool, "a"),
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_json_blob_without_fence_finishes() {
        match JsonBlobParser.parse("  Hello! How can I help?  ").unwrap() {
            AgentStep::Finish(finish) => assert_eq!(finish.output, "Hello! How can I help?"),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_json_blob_errors() {
        assert!(matches!(
            JsonBlobParser.parse("```\n{not json}\n```"),
            Err(AgentError::ParseError(_))
        ));
        assert!(matches!(
            JsonBlobParser.parse("```\n{\"action_input\": 1}\n```"),
            Err(AgentError::ParseError(_))
        ));
        assert!(matches!(
            JsonBlobParser.parse("```\n[]\n```"),
            Err(AgentError::ParseError(_))
        ));
    }

    #[test]
    fn test_text_final_answer() {
        match TextActionParser
            .parse("Thought: done\nFinal Answer: Paris [[A.txt]]")
            .unwrap()
        {
            AgentStep::Finish(finish) => assert_eq!(finish.output, "Paris [[A.txt]]"),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_text_action() {
        let output = "Action: get_agent_sales\nAction Input: {\"agent_name\": \"Mary Lee\"}";
        match TextActionParser.parse(output).unwrap() {
            AgentStep::Action(action) => {
                assert_eq!(action.tool, "get_agent_sales");
                assert_eq!(action.input, json!({"agent_name": "Mary Lee"}));
            }
            other => panic!("expected action, got {:?}", other),
        }

        match TextActionParser
            .parse("Action 1: search\nAction 1 Input: \"capital\"")
            .unwrap()
        {
            AgentStep::Action(action) => assert_eq!(action.input, json!("capital")),
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_text_unparseable() {
        assert!(matches!(
            TextActionParser.parse("I am not sure"),
            Err(AgentError::ParseError(_))
        ));
    }
}
