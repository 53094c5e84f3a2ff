use crate::components::GoogleCalendar;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

// Export submodules
pub mod calendar;

/// Shared context for all tool calls
#[derive(Clone)]
pub struct CommandContext {
    pub calendar: GoogleCalendar,
}

impl CommandContext {
    /// Create a new command context
    pub fn new(calendar: GoogleCalendar) -> Self {
        Self { calendar }
    }
}

/// Tool advertised through `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Describe a tool whose arguments deserialize into `T`
    pub fn new<T: JsonSchema>(name: &'static str, description: &'static str) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name,
            description,
            input_schema: serde_json::to_value(schema)
                .unwrap_or_else(|_| json!({"type": "object"})),
        }
    }
}

/// A tool call that could not be dispatched
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

/// Type alias for command result
pub type CommandResult = Result<String, CommandError>;

/// All tools exposed by the server
pub fn get_all_tools() -> Vec<ToolDefinition> {
    calendar::definitions()
}

/// Run a tool by name
pub async fn call_tool(ctx: &CommandContext, name: &str, arguments: Value) -> CommandResult {
    calendar::call(&ctx.calendar, name, arguments).await
}
