//! Prompt builders for every completion the chat bot issues.

use crate::agent::AgentAction;
use crate::models::{ChatMessage, Message, Record};
use crate::services::indexer::SOURCE_FIELD;

const REPHRASE_SYSTEM: &str = "You are a proficient assistant, skilled in rephrasing questions based on prior conversations.
If a follow-up question is already self-contained, you simply repeat it.
If the rephrased question conveys the same meaning as the original question, you just repeat the original question.
However, if the follow-up question lacks context, you rephrase it into a standalone question that includes all the necessary information for a complete answer.";

const INTENT_SYSTEM: &str = "Here is the list of intents.
1. DocRetrieval
2. StructuredQuery
3. Other

Extract the intent from the text started and ended by '''. The output will be the intent name only. Don't translate the language.
Here are some examples.

Input:
'''I want to know the benefit of this product'''

Output:
DocRetrieval

Input:
'''What is the fee for this product'''

Output:
DocRetrieval

Input:
'''What is the sales of Agent A'''

Output:
StructuredQuery

Input:
'''Does Agent A meet the MDRT requirement'''

Output:
StructuredQuery

Input:
'''Hello'''

Output:
Other";

const DOC_QA_SYSTEM: &str = "You are an adept assistant, capable of answering questions based on context user provided.
Please reply to the question using only the information presented in the summary and prior conversations.
Always include the source name for each fact you use in the response (e.g.: [[sample/A.txt]], [[doc/B.pdf]], etc.) to support your idea. Don't make up any source name.
If you can't find it, reply politely that the information is not in the knowledge base.
Detect the language of the last question and answer in the same language.
If asked for enumerations list all of them and do not invent any.
If the question is a greeting, reply with a greeting and ask what I can help.";

const NO_CONTEXT_SYSTEM: &str = "You are a helpful assistant. Answer the question using the prior conversations where relevant.
Detect the language of the question and answer in the same language.
If the question is a greeting, reply with a greeting and ask what I can help.";

const REACT_SYSTEM: &str = "Respond to the user as helpfully and accurately as possible. You have access to the following tools:

{tools}

To specify a tool, provide a JSON blob with an \"action\" key (tool name) and an \"action_input\" key (tool input).

Valid \"action\" values: \"Final Answer\" or {tool_names}

Provide only ONE action per JSON blob, as shown:

```
{
  \"action\": $TOOL_NAME,
  \"action_input\": $INPUT
}
```

Follow this format:

Question: input question to answer
Thought: consider previous and subsequent steps
Action:
```
$JSON_BLOB
```
Observation: action result
... (repeat Thought/Action/Observation N times)
Thought: I know what to respond
Action:
```
{
  \"action\": \"Final Answer\",
  \"action_input\": \"Final response to human\"
}
```

Begin! Remember to ALWAYS respond with a valid JSON blob of a single action. Use tools if necessary.
The format is Action:```$JSON_BLOB```then Observation:. The final response to the user may not always be the result of the last action,
but should be based on the most helpful and accurate information obtained through the process.";

/// Prior turns as plain text, one stored exchange per line block.
pub fn format_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieved passages, each followed by the provenance the model must cite.
pub fn format_context(hits: &[(Record, f32)]) -> String {
    hits.iter()
        .map(|(record, _)| {
            format!(
                "Content: {}\nSource name: {}",
                record.content,
                record.text(SOURCE_FIELD).unwrap_or("unknown")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn rephrase(question: &str, chat_history: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(REPHRASE_SYSTEM),
        ChatMessage::user(format!(
            "Prior conversations:\n{}\nFollow up question: {}\nRephrased question:",
            chat_history, question
        )),
    ]
}

pub fn intent(question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(INTENT_SYSTEM),
        ChatMessage::user(format!("Input:\n'''{}'''\n\nOutput:", question)),
    ]
}

pub fn doc_qa(question: &str, chat_history: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(DOC_QA_SYSTEM),
        ChatMessage::user(format!(
            "Summary:\n{}\nPrior conversations:\n{}\nHuman:{}\nAI:",
            context, chat_history, question
        )),
    ]
}

pub fn no_context(question: &str, chat_history: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(NO_CONTEXT_SYSTEM),
        ChatMessage::user(format!(
            "Prior conversations:\n{}\nHuman:{}\nAI:",
            chat_history, question
        )),
    ]
}

/// The transcript of earlier actions and their observations.
pub fn scratchpad(steps: &[(AgentAction, String)]) -> String {
    if steps.is_empty() {
        return String::new();
    }
    let thoughts: String = steps
        .iter()
        .map(|(action, observation)| {
            format!("{}\nObservation: {}\nThought: ", action.log, observation)
        })
        .collect();
    format!(
        "This was your previous work (but I haven't seen any of it! I only see what you return as final answer):\n{}",
        thoughts
    )
}

pub fn react(
    tool_descriptions: &str,
    tool_names: &[&str],
    question: &str,
    chat_history: &str,
    steps: &[(AgentAction, String)],
) -> Vec<ChatMessage> {
    let system = REACT_SYSTEM
        .replace("{tools}", tool_descriptions)
        .replace("{tool_names}", &tool_names.join(", "));
    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "\nChat History: {}\nQuestion: {}\n{}",
            chat_history,
            question,
            scratchpad(steps)
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    #[test]
    fn test_format_context_carries_source() {
        let hits = vec![
            (
                Record::new("Paris is the capital of France.").with_meta(SOURCE_FIELD, "A.txt"),
                0.9,
            ),
            (Record::new("orphan"), 0.5),
        ];
        let context = format_context(&hits);
        assert!(context.contains("Content: Paris is the capital of France.\nSource name: A.txt"));
        assert!(context.contains("Source name: unknown"));
    }

    #[test]
    fn test_scratchpad() {
        assert_eq!(scratchpad(&[]), "");

        let action = AgentAction {
            tool: "get_agent_sales".to_string(),
            input: json!({"agent_name": "A"}),
            log: "Action: lookup".to_string(),
        };
        let pad = scratchpad(&[(action, "A is in HK".to_string())]);
        assert!(pad.starts_with("This was your previous work"));
        assert!(pad.ends_with("Action: lookup\nObservation: A is in HK\nThought: "));
    }

    #[test]
    fn test_react_prompt_lists_tools() {
        let messages = react("t1: does things, args: {}", &["t1", "t2"], "Q?", "", &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("t1: does things"));
        assert!(messages[0].content.contains("\"Final Answer\" or t1, t2"));
        assert!(!messages[0].content.contains("{tools}"));
        assert!(messages[1].content.contains("Question: Q?"));
    }
}
