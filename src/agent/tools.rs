//! Named tools the planner can call, and the registry that dispatches them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use super::AgentAction;
use super::sales_db::{AgentSales, Requirement, SalesRepository};
use crate::error::AgentError;

/// One declared argument of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolArg {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

impl ToolArg {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: true,
        }
    }
}

/// A synchronous callable with a declared argument schema.
///
/// `run` receives an object that already holds every required argument.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn args(&self) -> &[ToolArg];
    fn run(&self, input: &Map<String, Value>) -> Result<String, AgentError>;
}

/// Tools keyed by name, validated once at construction.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, AgentError> {
        let mut map = BTreeMap::new();
        for tool in tools {
            let name = tool.name().trim().to_string();
            if name.is_empty() {
                return Err(AgentError::InvalidRegistry("tool with empty name".to_string()));
            }
            if map.insert(name.clone(), tool).is_some() {
                return Err(AgentError::InvalidRegistry(format!(
                    "duplicate tool name: {}",
                    name
                )));
            }
        }
        Ok(Self { tools: map })
    }

    /// A registry without tools, for planners that never act.
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// One line per tool: `name: description, args: {...}`.
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|tool| {
                let args: Map<String, Value> = tool
                    .args()
                    .iter()
                    .map(|a| (a.name.to_string(), json!({ "description": a.description })))
                    .collect();
                format!(
                    "{}: {}, args: {}",
                    tool.name(),
                    tool.description(),
                    Value::Object(args)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn dispatch(&self, action: &AgentAction) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(action.tool.as_str())
            .ok_or_else(|| AgentError::UnknownTool(action.tool.clone()))?;

        let input = normalize_input(tool.as_ref(), &action.input);
        for arg in tool.args().iter().filter(|a| a.required) {
            let present = input
                .get(arg.name)
                .is_some_and(|v| !v.is_null() && v.as_str().is_none_or(|s| !s.trim().is_empty()));
            if !present {
                return Err(AgentError::MissingArgument {
                    tool: tool.name().to_string(),
                    argument: arg.name.to_string(),
                });
            }
        }

        let shown = Value::Object(input.clone());
        debug!(tool = tool.name(), input = %shown, "dispatching tool");
        tool.run(&input)
    }
}

/// Objects pass through; a bare scalar fills a tool's single required argument.
fn normalize_input(tool: &dyn Tool, input: &Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        scalar => {
            let mut required = tool.args().iter().filter(|a| a.required);
            match (required.next(), required.next()) {
                (Some(arg), None) => {
                    let mut map = Map::new();
                    map.insert(arg.name.to_string(), scalar.clone());
                    map
                }
                _ => Map::new(),
            }
        }
    }
}

fn arg_text(input: &Map<String, Value>, name: &str) -> String {
    match input.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn db_failure(tool: &str, e: rusqlite::Error) -> AgentError {
    AgentError::ToolFailed {
        tool: tool.to_string(),
        message: e.to_string(),
    }
}

fn requirement_not_found(category: &str, region: &str) -> String {
    format!(
        "Cannot find the requirement for {} in {}. Please provide the correct information.",
        category, region
    )
}

fn agent_not_found(agent_name: &str) -> String {
    format!(
        "Cannot find your name: {} in the database. Please provide the correct information.",
        agent_name
    )
}

fn describe_thresholds(r: &Requirement) -> String {
    format!("{} FYCC, {} FYP, {} Case Count", r.fycc, r.fyp, r.case_count)
}

fn describe_record(s: &AgentSales) -> String {
    format!("{} FYCC, {} FYP, {} Case Count", s.fycc, s.fyp, s.case_count)
}

const CATEGORY_ARG: ToolArg = ToolArg::required(
    "category",
    "The category of the requirement, must be one of these values: MDRT, COT, TOT",
);
const REGION_ARG: ToolArg = ToolArg::required(
    "region",
    "The region of the agent, must be one of these values: HK, Macau",
);
const AGENT_NAME_ARG: ToolArg = ToolArg::required("agent_name", "The name of the agent");

pub struct GetRequirementTool {
    repo: Arc<SalesRepository>,
}

impl GetRequirementTool {
    pub const NAME: &'static str = "get_requirement";

    pub fn new(repo: Arc<SalesRepository>) -> Self {
        Self { repo }
    }
}

impl Tool for GetRequirementTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "useful when you need to get the MDRT/COT/TOT requirement for a specific region"
    }

    fn args(&self) -> &[ToolArg] {
        &[CATEGORY_ARG, REGION_ARG]
    }

    fn run(&self, input: &Map<String, Value>) -> Result<String, AgentError> {
        let category = arg_text(input, CATEGORY_ARG.name);
        let region = arg_text(input, REGION_ARG.name);

        let requirement = self
            .repo
            .requirement(&category, &region)
            .map_err(|e| db_failure(Self::NAME, e))?;

        Ok(match requirement {
            Some(r) => format!(
                "To achieve {}, the agent must surpass the {} thresholds requirement for {}",
                r.category,
                r.region,
                describe_thresholds(&r)
            ),
            None => requirement_not_found(&category, &region),
        })
    }
}

pub struct GetAgentSalesTool {
    repo: Arc<SalesRepository>,
}

impl GetAgentSalesTool {
    pub const NAME: &'static str = "get_agent_sales";

    pub fn new(repo: Arc<SalesRepository>) -> Self {
        Self { repo }
    }
}

impl Tool for GetAgentSalesTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "useful when you need to get the region and sales of an agent"
    }

    fn args(&self) -> &[ToolArg] {
        &[AGENT_NAME_ARG]
    }

    fn run(&self, input: &Map<String, Value>) -> Result<String, AgentError> {
        let agent_name = arg_text(input, AGENT_NAME_ARG.name);

        let sales = self
            .repo
            .agent_sales(&agent_name)
            .map_err(|e| db_failure(Self::NAME, e))?;

        Ok(match sales {
            Some(s) => format!(
                "{} is in {} Region, the sales record is: {}",
                s.name,
                s.region,
                describe_record(&s)
            ),
            None => agent_not_found(&agent_name),
        })
    }
}

/// Looks up the agent and the requirement of the agent's region in one call.
pub struct CheckRequirementTool {
    repo: Arc<SalesRepository>,
}

impl CheckRequirementTool {
    pub const NAME: &'static str = "check_requirement";

    pub fn new(repo: Arc<SalesRepository>) -> Self {
        Self { repo }
    }
}

impl Tool for CheckRequirementTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "useful when you need to check if an agent meets the MDRT/COT/TOT requirement, \
         you don't need to get the requirement and sales first, this tool will do it for you"
    }

    fn args(&self) -> &[ToolArg] {
        &[CATEGORY_ARG, AGENT_NAME_ARG]
    }

    fn run(&self, input: &Map<String, Value>) -> Result<String, AgentError> {
        let category = arg_text(input, CATEGORY_ARG.name);
        let agent_name = arg_text(input, AGENT_NAME_ARG.name);

        let Some(sales) = self
            .repo
            .agent_sales(&agent_name)
            .map_err(|e| db_failure(Self::NAME, e))?
        else {
            return Ok(agent_not_found(&agent_name));
        };

        let Some(requirement) = self
            .repo
            .requirement(&category, &sales.region)
            .map_err(|e| db_failure(Self::NAME, e))?
        else {
            return Ok(requirement_not_found(&category, &sales.region));
        };

        let verdict = if sales.meets(&requirement) {
            "meets"
        } else {
            "does not meet"
        };
        Ok(format!(
            "{} {} the {} requirement. The {} requirement in {} is {}. \
             The agent's sales record is {}.",
            sales.name,
            verdict,
            requirement.category,
            requirement.category,
            requirement.region,
            describe_thresholds(&requirement),
            describe_record(&sales)
        ))
    }
}

/// The three structured-data tools sharing one repository.
pub fn sales_tools(repo: Arc<SalesRepository>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetRequirementTool::new(Arc::clone(&repo))),
        Arc::new(GetAgentSalesTool::new(Arc::clone(&repo))),
        Arc::new(CheckRequirementTool::new(repo)),
    ]
}
