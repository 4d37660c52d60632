use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{AgentAction, AgentStep, PlanContext, Planner, ToolRegistry};
use crate::error::AgentError;
use crate::models::AgentConfig;

/// Final output of a run plus every (action, observation) pair taken.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub output: String,
    pub steps: Vec<(AgentAction, String)>,
}

/// Drives a planner until it finishes or a budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct AgentExecutor {
    max_iterations: usize,
    max_execution_time: Option<Duration>,
}

impl Default for AgentExecutor {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl AgentExecutor {
    pub fn new(max_iterations: usize, max_execution_time: Option<Duration>) -> Self {
        Self {
            max_iterations,
            max_execution_time,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.max_iterations,
            config.max_execution_time_secs.map(Duration::from_secs),
        )
    }

    pub async fn run(
        &self,
        planner: &dyn Planner,
        tools: &ToolRegistry,
        question: &str,
        chat_history: &str,
        context: &str,
    ) -> Result<AgentRun, AgentError> {
        let started = Instant::now();
        let mut steps: Vec<(AgentAction, String)> = Vec::new();

        for iteration in 0..self.max_iterations {
            if let Some(limit) = self.max_execution_time
                && started.elapsed() > limit
            {
                warn!(iteration, ?limit, "agent time budget exhausted");
                return Err(AgentError::TimeLimitExceeded(limit));
            }

            let ctx = PlanContext {
                question,
                chat_history,
                context,
                steps: &steps,
            };
            match planner.plan(ctx, tools).await? {
                AgentStep::Finish(finish) => {
                    info!(iterations = iteration + 1, "agent finished");
                    return Ok(AgentRun {
                        output: finish.output,
                        steps,
                    });
                }
                AgentStep::Action(action) => {
                    let observation = tools.dispatch(&action)?;
                    debug!(iteration, tool = %action.tool, observation = %observation, "tool observed");
                    steps.push((action, observation));
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "agent loop exceeded");
        Err(AgentError::LoopExceeded(self.max_iterations))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::sales_db::tests::seeded_repository;
    use crate::agent::{DocRetrievalPlanner, ReactPlanner, sales_tools};
    use crate::services::completion::tests::ScriptedChatModel;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(sales_tools(Arc::new(seeded_repository()))).unwrap()
    }

    const LOOKUP: &str = "```\n{\"action\": \"get_agent_sales\", \"action_input\": {\"agent_name\": \"Peter Chan\"}}\n```";

    #[tokio::test]
    async fn test_tool_then_finish() {
        let model = Arc::new(ScriptedChatModel::new([
            LOOKUP,
            "```\n{\"action\": \"Final Answer\", \"action_input\": \"Peter has 25 cases.\"}\n```",
        ]));
        let planner = ReactPlanner::new(model.clone());

        let run = AgentExecutor::default()
            .run(&planner, &registry(), "How many cases has Peter?", "", "")
            .await
            .unwrap();
        assert_eq!(run.output, "Peter has 25 cases.");
        assert_eq!(run.steps.len(), 1);
        assert!(run.steps[0].1.contains("25 Case Count"));

        // The second planning request sees the first observation.
        let prompts = model.prompts();
        assert!(prompts[1][1].content.contains("Observation: Peter Chan is in HK Region"));
    }

    #[tokio::test]
    async fn test_never_finishing_planner_hits_loop_limit() {
        let model = Arc::new(ScriptedChatModel::repeating(LOOKUP));
        let planner = ReactPlanner::new(model.clone());

        let result = AgentExecutor::new(3, None)
            .run(&planner, &registry(), "?", "", "")
            .await;
        assert!(matches!(result, Err(AgentError::LoopExceeded(3))));
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let model = Arc::new(ScriptedChatModel::new([
            "```\n{\"action\": \"delete_everything\", \"action_input\": {}}\n```",
        ]));
        let result = AgentExecutor::default()
            .run(&ReactPlanner::new(model), &registry(), "?", "", "")
            .await;
        assert!(matches!(result, Err(AgentError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn test_parse_error_is_fatal() {
        let model = Arc::new(ScriptedChatModel::new(["```json\n{broken\n```"]));
        let result = AgentExecutor::default()
            .run(&ReactPlanner::new(model), &registry(), "?", "", "")
            .await;
        assert!(matches!(result, Err(AgentError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_zero_time_budget() {
        let model = Arc::new(ScriptedChatModel::repeating(LOOKUP));
        let executor = AgentExecutor::new(100, Some(Duration::ZERO));
        let result = executor
            .run(&ReactPlanner::new(model), &registry(), "?", "", "")
            .await;
        // The first check may pass within the same instant; a later one cannot.
        assert!(matches!(result, Err(AgentError::TimeLimitExceeded(_))));
    }

    #[tokio::test]
    async fn test_doc_planner_single_step() {
        let model = Arc::new(ScriptedChatModel::new(["Paris [[A.txt]]"]));
        let run = AgentExecutor::default()
            .run(
                &DocRetrievalPlanner::new(model),
                &ToolRegistry::empty(),
                "Capital of France?",
                "",
                "Content: Paris\nSource name: A.txt",
            )
            .await
            .unwrap();
        assert_eq!(run.output, "Paris [[A.txt]]");
        assert!(run.steps.is_empty());
    }
}
