use async_trait::async_trait;
use serde_json::json;

use crate::errors::{AgentError, AgentResult};
use crate::linear::client::{IssueInput, IssueQuery, LinearClient};
use crate::models::tool::{Tool, ToolCall};
use crate::system::System;

/// Exposes a Linear workspace to the agent as eight named tools.
///
/// Every tool returns a compact text summary rather than the raw remote
/// object, which keeps the context fed back to the model small and
/// independent of upstream schema changes. Remote failures are folded into
/// the summary string so the model can see them and retry or rephrase.
pub struct LinearSystem {
    client: LinearClient,
    tools: Vec<Tool>,
    instructions: String,
}

impl LinearSystem {
    pub fn new(client: LinearClient) -> Self {
        let tools = vec![
            Tool::new(
                "listUsers",
                "Get a list of users in the user's Linear workspace",
                json!({"type": "object", "properties": {}}),
            ),
            Tool::new(
                "getUser",
                "Get details about a specific user in the user's Linear workspace",
                json!({
                    "type": "object",
                    "required": ["userId"],
                    "properties": {
                        "userId": {"type": "string", "description": "The id of the user to fetch"}
                    }
                }),
            ),
            Tool::new(
                "listIssues",
                "Search and list issues, optionally filtered by a text query, team, state or assignee",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Text to match against issue titles and descriptions"},
                        "teamId": {"type": "string", "description": "Only issues belonging to this team"},
                        "stateId": {"type": "string", "description": "Only issues in this workflow state"},
                        "assigneeId": {"type": "string", "description": "Only issues assigned to this user"},
                        "includeArchived": {"type": "boolean", "description": "Include archived issues"},
                        "limit": {"type": "integer", "description": "Maximum number of issues to return"}
                    }
                }),
            ),
            Tool::new(
                "getIssue",
                "Get details about a specific issue, by UUID or key like ABC-123",
                json!({
                    "type": "object",
                    "required": ["issueId"],
                    "properties": {
                        "issueId": {"type": "string", "description": "The id or identifier of the issue"}
                    }
                }),
            ),
            Tool::new(
                "createIssue",
                "Create a new issue in the user's Linear workspace",
                json!({
                    "type": "object",
                    "required": ["title", "teamId"],
                    "properties": {
                        "title": {"type": "string", "description": "The title of the issue"},
                        "teamId": {"type": "string", "description": "The id of the team the issue belongs to"},
                        "description": {"type": "string", "description": "Markdown body of the issue"},
                        "priority": {"type": "number", "description": "Priority from 0 (none) to 4 (low)"},
                        "projectId": {"type": "string", "description": "The id of a project to add the issue to"},
                        "stateId": {"type": "string", "description": "The id of the workflow state"},
                        "assigneeId": {"type": "string", "description": "The id of the user to assign"},
                        "labelIds": {"type": "array", "items": {"type": "string"}, "description": "Label ids to apply"},
                        "dueDate": {"type": "string", "description": "Due date in ISO format"}
                    }
                }),
            ),
            Tool::new(
                "updateIssue",
                "Update fields of an existing issue",
                json!({
                    "type": "object",
                    "required": ["id"],
                    "properties": {
                        "id": {"type": "string", "description": "The id of the issue to update"},
                        "title": {"type": "string", "description": "New title"},
                        "description": {"type": "string", "description": "New markdown body"},
                        "priority": {"type": "number", "description": "Priority from 0 (none) to 4 (low)"},
                        "projectId": {"type": "string", "description": "The id of a project"},
                        "stateId": {"type": "string", "description": "The id of the new workflow state"},
                        "assigneeId": {"type": "string", "description": "The id of the user to assign"},
                        "labelIds": {"type": "array", "items": {"type": "string"}, "description": "Label ids to apply"},
                        "dueDate": {"type": "string", "description": "Due date in ISO format"}
                    }
                }),
            ),
            Tool::new(
                "listIssueLabels",
                "List issue labels, for the whole workspace or one team",
                json!({
                    "type": "object",
                    "properties": {
                        "teamId": {"type": "string", "description": "Only labels belonging to this team"}
                    }
                }),
            ),
            Tool::new(
                "listIssueStatuses",
                "List the statuses issues can be in",
                json!({"type": "object", "properties": {}}),
            ),
        ];

        Self {
            client,
            tools,
            instructions: String::new(),
        }
    }

    /// Fold the caller's team context into the system instructions so the
    /// model can resolve team names to ids without a tool round-trip.
    pub fn with_teams(mut self, teams: &[(String, String)]) -> Self {
        if !teams.is_empty() {
            let listing = teams
                .iter()
                .map(|(name, id)| format!("{} ({})", name, id))
                .collect::<Vec<_>>()
                .join(", ");
            self.instructions = format!("The user's teams are: {}", listing);
        }
        self
    }

    async fn list_users(&self) -> AgentResult<String> {
        match self.client.users().await {
            Ok(users) => Ok(users
                .iter()
                .map(|user| format!("{} - {}", user.name, user.id))
                .collect::<Vec<_>>()
                .join("\n")),
            Err(e) => Ok(format!("Error fetching users: {}", e)),
        }
    }

    async fn get_user(&self, user_id: &str) -> AgentResult<String> {
        match self.client.user(user_id).await {
            Ok(user) => Ok(format!(
                "{} ({}) - id: {}, timezone: {}, active: {}, created: {}, updated: {}",
                user.name,
                user.email.as_deref().unwrap_or("no email"),
                user.id,
                user.timezone.as_deref().unwrap_or("unknown"),
                user.active.unwrap_or(false),
                user.created_at.as_deref().unwrap_or("unknown"),
                user.updated_at.as_deref().unwrap_or("unknown"),
            )),
            Err(e) => Ok(format!("Error fetching user: {}", e)),
        }
    }

    async fn list_issues(&self, search: IssueQuery) -> AgentResult<String> {
        match self.client.issues(&search).await {
            Ok(issues) => {
                let listing = issues
                    .iter()
                    .map(|issue| format!("{} - {}", issue.title, issue.id))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(format!("Found issues: \n{}", listing))
            }
            Err(e) => Ok(format!("Error fetching issues: {}", e)),
        }
    }

    async fn get_issue(&self, issue_id: &str) -> AgentResult<String> {
        match self.client.issue(issue_id).await {
            Ok(issue) => Ok(format!(
                "Issue: {} {} {} - {}",
                issue.identifier.as_deref().unwrap_or(&issue.id),
                issue.title,
                issue.description.as_deref().unwrap_or(""),
                issue.state.map(|s| s.name).unwrap_or_default(),
            )),
            Err(e) => Ok(format!("Error fetching issue: {}", e)),
        }
    }

    async fn create_issue(&self, input: IssueInput) -> AgentResult<String> {
        match self.client.create_issue(&input).await {
            Ok(payload) => match payload.issue {
                Some(issue) => Ok(format!(
                    "Issue created: {}",
                    issue.identifier.as_deref().unwrap_or(&issue.id)
                )),
                None => Ok("Issue not created".to_string()),
            },
            Err(e) => Ok(format!("Error creating issue: {}", e)),
        }
    }

    async fn update_issue(&self, id: &str, input: IssueInput) -> AgentResult<String> {
        match self.client.update_issue(id, &input).await {
            Ok(payload) => match payload.issue {
                Some(issue) => Ok(format!(
                    "Issue updated: {}",
                    issue.identifier.as_deref().unwrap_or(&issue.id)
                )),
                None => Ok("Issue not updated".to_string()),
            },
            Err(e) => Ok(format!("Error updating issue: {}", e)),
        }
    }

    async fn list_labels(&self, team_id: Option<&str>) -> AgentResult<String> {
        let labels = match team_id {
            Some(team_id) => self.client.team_labels(team_id).await,
            None => self.client.labels().await,
        };
        match labels {
            Ok(labels) => Ok(labels
                .iter()
                .map(|label| format!("{} - {}", label.name, label.id))
                .collect::<Vec<_>>()
                .join("\n")),
            Err(e) => Ok(format!("Error fetching labels: {}", e)),
        }
    }

    async fn list_statuses(&self) -> AgentResult<String> {
        match self.client.statuses().await {
            Ok(statuses) => Ok(statuses
                .iter()
                .map(|status| format!("{} - {}", status.name, status.id))
                .collect::<Vec<_>>()
                .join("\n")),
            Err(e) => Ok(format!("Error fetching statuses: {}", e)),
        }
    }
}

fn required_str(arguments: &serde_json::Value, field: &str) -> AgentResult<String> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| AgentError::InvalidParameters(format!("missing field '{}'", field)))
}

#[async_trait]
impl System for LinearSystem {
    fn name(&self) -> &str {
        "linear"
    }

    fn description(&self) -> &str {
        "Read and modify issues, users, labels and statuses in the user's Linear workspace"
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<String> {
        match tool_call.name.as_str() {
            "listUsers" => self.list_users().await,
            "getUser" => {
                let user_id = required_str(&tool_call.arguments, "userId")?;
                self.get_user(&user_id).await
            }
            "listIssues" => {
                let search: IssueQuery = serde_json::from_value(tool_call.arguments)
                    .map_err(|e| AgentError::InvalidParameters(e.to_string()))?;
                self.list_issues(search).await
            }
            "getIssue" => {
                let issue_id = required_str(&tool_call.arguments, "issueId")?;
                self.get_issue(&issue_id).await
            }
            "createIssue" => {
                let input: IssueInput = serde_json::from_value(tool_call.arguments)
                    .map_err(|e| AgentError::InvalidParameters(e.to_string()))?;
                self.create_issue(input).await
            }
            "updateIssue" => {
                let id = required_str(&tool_call.arguments, "id")?;
                let mut arguments = tool_call.arguments;
                if let Some(object) = arguments.as_object_mut() {
                    object.remove("id");
                }
                let input: IssueInput = serde_json::from_value(arguments)
                    .map_err(|e| AgentError::InvalidParameters(e.to_string()))?;
                self.update_issue(&id, input).await
            }
            "listIssueLabels" => {
                let team_id = tool_call
                    .arguments
                    .get("teamId")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                self.list_labels(team_id.as_deref()).await
            }
            "listIssueStatuses" => self.list_statuses().await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
