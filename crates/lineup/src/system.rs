use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

/// Core trait that defines a system that can be operated by an AI agent.
///
/// A system binds a set of named, schema-described tools to an authenticated
/// client for some external service. Tool names must be unique within a
/// system, and `call` must resolve every execution failure into either a
/// descriptive result string or an `AgentError` the agent can report back to
/// the model; a single failed call never aborts the agent loop.
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions, folded into the agent's system prompt
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given arguments, returning a compact summary
    async fn call(&self, tool_call: ToolCall) -> AgentResult<String>;
}
