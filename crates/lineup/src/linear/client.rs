use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Default host for the Linear API
pub const LINEAR_API_HOST: &str = "https://api.linear.app";

/// A read-only projection of a Linear team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A read-only projection of a Linear user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// The workflow state an issue currently sits in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// A read-only projection of a Linear issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    #[serde(default)]
    pub identifier: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub state: Option<WorkflowState>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub name: String,
}

/// Result of an issue create/update mutation
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub issue: Option<Issue>,
}

/// Partial issue fields for create and update mutations. Absent fields are
/// omitted from the mutation input entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// Filters for the issue search, AND-combined by the remote API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub state_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub include_archived: Option<bool>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl IssueQuery {
    /// Build the remote API's filter object. The free-text query becomes a
    /// case/accent-insensitive substring match on title OR description; the
    /// id filters are exact matches combined with AND.
    fn filter(&self) -> Value {
        let mut filter = serde_json::Map::new();
        if let Some(query) = &self.query {
            filter.insert(
                "or".to_string(),
                json!([
                    {"title": {"containsIgnoreCaseAndAccent": query}},
                    {"description": {"containsIgnoreCaseAndAccent": query}}
                ]),
            );
        }
        if let Some(team_id) = &self.team_id {
            filter.insert("team".to_string(), json!({"id": {"eq": team_id}}));
        }
        if let Some(state_id) = &self.state_id {
            filter.insert("state".to_string(), json!({"id": {"eq": state_id}}));
        }
        if let Some(assignee_id) = &self.assignee_id {
            filter.insert("assignee".to_string(), json!({"id": {"eq": assignee_id}}));
        }
        Value::Object(filter)
    }
}

fn parse_nodes<T: DeserializeOwned>(connection: Value) -> Result<Vec<T>> {
    let nodes = connection
        .get("nodes")
        .cloned()
        .ok_or_else(|| anyhow!("No nodes in Linear connection"))?;
    Ok(serde_json::from_value(nodes)?)
}

/// GraphQL client for the Linear API, authenticated with a per-request OAuth
/// token. Constructed fresh for every HTTP request; never cached globally.
pub struct LinearClient {
    client: Client,
    host: String,
    token: String,
}

impl LinearClient {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self::with_host(LINEAR_API_HOST, token)
    }

    pub fn with_host<H: Into<String>, S: Into<String>>(host: H, token: S) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            host: host.into(),
            token: token.into(),
        }
    }

    async fn request(&self, query: &str, variables: Value) -> Result<Value> {
        let url = format!("{}/graphql", self.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({"query": query, "variables": variables}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Linear API error: {} - {}", status, body));
        }

        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(anyhow!("Linear API error: {}", errors));
        }
        body.get("data")
            .cloned()
            .ok_or_else(|| anyhow!("No data in Linear response"))
    }

    /// Fetch all users in the workspace
    pub async fn users(&self) -> Result<Vec<User>> {
        let query = "query Users { users { nodes { id name email } } }";
        let data = self.request(query, json!({})).await?;
        parse_nodes(data["users"].clone())
    }

    /// Fetch one user by id
    pub async fn user(&self, id: &str) -> Result<User> {
        let query = "query User($id: String!) { user(id: $id) { \
                     id name email timezone active createdAt updatedAt } }";
        let data = self.request(query, json!({"id": id})).await?;
        Ok(serde_json::from_value(data["user"].clone())?)
    }

    /// Search issues with the given filters
    pub async fn issues(&self, search: &IssueQuery) -> Result<Vec<Issue>> {
        let query = "query Issues($filter: IssueFilter, $first: Int, $includeArchived: Boolean) { \
                     issues(filter: $filter, first: $first, includeArchived: $includeArchived) { \
                     nodes { id identifier title description } } }";
        let data = self
            .request(
                query,
                json!({
                    "filter": search.filter(),
                    "first": search.limit,
                    "includeArchived": search.include_archived,
                }),
            )
            .await?;
        parse_nodes(data["issues"].clone())
    }

    /// Fetch one issue by UUID or human key like "ABC-123", with its state
    pub async fn issue(&self, id: &str) -> Result<Issue> {
        let query = "query Issue($id: String!) { issue(id: $id) { \
                     id identifier title description url state { name color } } }";
        let data = self.request(query, json!({"id": id})).await?;
        Ok(serde_json::from_value(data["issue"].clone())?)
    }

    /// Create an issue
    pub async fn create_issue(&self, input: &IssueInput) -> Result<IssuePayload> {
        let query = "mutation IssueCreate($input: IssueCreateInput!) { \
                     issueCreate(input: $input) { success issue { id identifier title url } } }";
        let data = self.request(query, json!({"input": input})).await?;
        Ok(serde_json::from_value(data["issueCreate"].clone())?)
    }

    /// Apply a partial update to an issue
    pub async fn update_issue(&self, id: &str, input: &IssueInput) -> Result<IssuePayload> {
        let query = "mutation IssueUpdate($id: String!, $input: IssueUpdateInput!) { \
                     issueUpdate(id: $id, input: $input) { success issue { id identifier title url } } }";
        let data = self
            .request(query, json!({"id": id, "input": input}))
            .await?;
        Ok(serde_json::from_value(data["issueUpdate"].clone())?)
    }

    /// List all workspace issue labels
    pub async fn labels(&self) -> Result<Vec<Label>> {
        let query = "query IssueLabels { issueLabels { nodes { id name } } }";
        let data = self.request(query, json!({})).await?;
        parse_nodes(data["issueLabels"].clone())
    }

    /// List the labels of one team
    pub async fn team_labels(&self, team_id: &str) -> Result<Vec<Label>> {
        let query = "query TeamLabels($id: String!) { team(id: $id) { \
                     labels { nodes { id name } } } }";
        let data = self.request(query, json!({"id": team_id})).await?;
        parse_nodes(data["team"]["labels"].clone())
    }

    /// List workspace/project statuses
    pub async fn statuses(&self) -> Result<Vec<Status>> {
        let query = "query ProjectStatuses { projectStatuses { nodes { id name } } }";
        let data = self.request(query, json!({})).await?;
        parse_nodes(data["projectStatuses"].clone())
    }

    /// List all teams, oldest first
    pub async fn teams(&self) -> Result<Vec<Team>> {
        let query = "query Teams($orderBy: PaginationOrderBy) { teams(orderBy: $orderBy) { \
                     nodes { id name description createdAt } } }";
        let data = self.request(query, json!({"orderBy": "createdAt"})).await?;
        parse_nodes(data["teams"].clone())
    }

    /// List a team's most recently updated issues, with state name and color
    pub async fn team_issues(&self, team_id: &str, first: u32) -> Result<Vec<Issue>> {
        let query = "query TeamIssues($id: String!, $first: Int, $orderBy: PaginationOrderBy) { \
                     team(id: $id) { issues(first: $first, orderBy: $orderBy) { \
                     nodes { id identifier title description url createdAt updatedAt \
                     state { name color } } } } }";
        let data = self
            .request(
                query,
                json!({"id": team_id, "first": first, "orderBy": "updatedAt"}),
            )
            .await?;
        parse_nodes(data["team"]["issues"].clone())
    }
}
