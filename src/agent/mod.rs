//! Bounded plan → act → observe loop for multi-step answers.

mod executor;
mod parser;
mod planner;
pub(crate) mod sales_db;
mod tools;

pub use executor::{AgentExecutor, AgentRun};
pub use parser::{JsonBlobParser, OutputParser, TextActionParser};
pub use planner::{DocRetrievalPlanner, ReactPlanner};
pub use sales_db::{AgentSales, Requirement, SalesRepository};
pub use tools::{
    CheckRequirementTool, GetAgentSalesTool, GetRequirementTool, Tool, ToolArg, ToolRegistry,
    sales_tools,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub tool: String,
    pub input: serde_json::Value,
    /// Raw planner output that produced the action.
    pub log: String,
}

/// The terminal answer of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    pub output: String,
    pub log: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action(AgentAction),
    Finish(AgentFinish),
}

/// Everything a planner sees for one planning step.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub question: &'a str,
    pub chat_history: &'a str,
    /// Retrieved passages, empty when the planner works from tools alone.
    pub context: &'a str,
    pub steps: &'a [(AgentAction, String)],
}

/// Produces the next step from the question and the work done so far.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, ctx: PlanContext<'_>, tools: &ToolRegistry) -> Result<AgentStep, AgentError>;
}
