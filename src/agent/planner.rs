use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::parser::{JsonBlobParser, OutputParser};
use super::{AgentFinish, AgentStep, PlanContext, Planner, ToolRegistry};
use crate::error::AgentError;
use crate::services::completion::ChatModel;
use crate::services::prompts;

/// Multi-step planner that picks tools through fenced JSON actions.
pub struct ReactPlanner {
    model: Arc<dyn ChatModel>,
    parser: Box<dyn OutputParser>,
}

impl ReactPlanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            parser: Box::new(JsonBlobParser),
        }
    }

    pub fn with_parser(mut self, parser: impl OutputParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }
}

#[async_trait]
impl Planner for ReactPlanner {
    async fn plan(&self, ctx: PlanContext<'_>, tools: &ToolRegistry) -> Result<AgentStep, AgentError> {
        let messages = prompts::react(
            &tools.describe(),
            &tools.tool_names(),
            ctx.question,
            ctx.chat_history,
            ctx.steps,
        );
        let output = self.model.complete(&messages).await?;
        debug!(steps = ctx.steps.len(), output = %output, "react planner replied");

        let step = self.parser.parse(&output)?;
        if let AgentStep::Finish(finish) = &step {
            info!(answer = %finish.output, "react planner finished");
        }
        Ok(step)
    }
}

/// Answers from retrieved passages in a single completion.
pub struct DocRetrievalPlanner {
    model: Arc<dyn ChatModel>,
}

impl DocRetrievalPlanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Planner for DocRetrievalPlanner {
    async fn plan(&self, ctx: PlanContext<'_>, _tools: &ToolRegistry) -> Result<AgentStep, AgentError> {
        debug!(context_bytes = ctx.context.len(), "answering from retrieved context");
        let messages = prompts::doc_qa(ctx.question, ctx.chat_history, ctx.context);
        let output = self.model.complete(&messages).await?;

        Ok(AgentStep::Finish(AgentFinish {
            output: output.trim().to_string(),
            log: output,
        }))
    }
}
