use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does, guiding model selection
    pub description: String,
    /// JSON schema describing the input the tool accepts
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool call request that a system can execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new ToolCall with the given name and arguments
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Check a proposed set of arguments against the tool's declared schema.
///
/// This covers what the models actually get wrong in practice: missing
/// required fields, fields that aren't declared, and primitive type
/// mismatches. A violation fails the single invocation with
/// `InvalidParameters`, never the enclosing loop.
pub fn validate_call(tool: &Tool, arguments: &Value) -> AgentResult<()> {
    let args = arguments.as_object().ok_or_else(|| {
        AgentError::InvalidParameters(format!(
            "arguments for tool '{}' must be a JSON object",
            tool.name
        ))
    })?;

    if let Some(required) = tool.input_schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args.contains_key(field) {
                return Err(AgentError::InvalidParameters(format!(
                    "missing required field '{}' for tool '{}'",
                    field, tool.name
                )));
            }
        }
    }

    if let Some(properties) = tool
        .input_schema
        .get("properties")
        .and_then(|p| p.as_object())
    {
        for (field, value) in args {
            let declared = properties.get(field).ok_or_else(|| {
                AgentError::InvalidParameters(format!(
                    "unknown field '{}' for tool '{}'",
                    field, tool.name
                ))
            })?;

            if value.is_null() {
                continue;
            }
            if let Some(expected) = declared.get("type").and_then(|t| t.as_str()) {
                let matches = match expected {
                    "string" => value.is_string(),
                    "number" => value.is_number(),
                    "integer" => value.is_i64() || value.is_u64(),
                    "boolean" => value.is_boolean(),
                    "array" => value.is_array(),
                    "object" => value.is_object(),
                    _ => true,
                };
                if !matches {
                    return Err(AgentError::InvalidParameters(format!(
                        "field '{}' for tool '{}' must be of type {}",
                        field, tool.name, expected
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_tool() -> Tool {
        Tool::new(
            "createIssue",
            "Create a new issue",
            json!({
                "type": "object",
                "required": ["title", "teamId"],
                "properties": {
                    "title": {"type": "string"},
                    "teamId": {"type": "string"},
                    "priority": {"type": "number"},
                    "labelIds": {"type": "array"}
                }
            }),
        )
    }

    #[test]
    fn test_validate_call_ok() {
        let tool = issue_tool();
        let args = json!({"title": "Fix login bug", "teamId": "T1", "priority": 2});
        assert!(validate_call(&tool, &args).is_ok());
    }

    #[test]
    fn test_validate_call_missing_required() {
        let tool = issue_tool();
        let args = json!({"teamId": "T1"});
        let err = validate_call(&tool, &args).unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(msg) if msg.contains("title")));
    }

    #[test]
    fn test_validate_call_wrong_type() {
        let tool = issue_tool();
        let args = json!({"title": "Fix login bug", "teamId": "T1", "labelIds": "not-an-array"});
        let err = validate_call(&tool, &args).unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(msg) if msg.contains("labelIds")));
    }

    #[test]
    fn test_validate_call_unknown_field() {
        let tool = issue_tool();
        let args = json!({"title": "x", "teamId": "T1", "madeUp": true});
        assert!(validate_call(&tool, &args).is_err());
    }

    #[test]
    fn test_validate_call_not_an_object() {
        let tool = issue_tool();
        assert!(validate_call(&tool, &json!("just a string")).is_err());
    }

    #[test]
    fn test_validate_call_null_optional_is_ignored() {
        let tool = issue_tool();
        let args = json!({"title": "x", "teamId": "T1", "priority": null});
        assert!(validate_call(&tool, &args).is_ok());
    }
}
