use anyhow::Result;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, MessageContent, ToolRequest};
use crate::models::tool::{self, Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::system::System;

/// Maximum number of model-reasoning/tool-invocation cycles per request.
/// Running out of budget is a normal termination, not an error.
pub const MAX_STEPS: usize = 10;

/// The input to one agent run: either a one-shot prompt or a full
/// conversation history. The two are mutually exclusive by construction.
#[derive(Debug, Clone)]
pub enum AgentInput {
    Prompt(String),
    Conversation(Vec<Message>),
}

impl AgentInput {
    fn into_messages(self) -> Vec<Message> {
        match self {
            AgentInput::Prompt(prompt) => vec![Message::user().with_text(prompt)],
            AgentInput::Conversation(messages) => messages,
        }
    }
}

/// One tool invocation observed during a buffered run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: Option<String>,
}

/// The buffered result of an agent run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    pub tool_invocations: Vec<ToolInvocation>,
}

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// Agent integrates a foundational LLM with the systems it can operate
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider + Send + Sync>,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider + Send + Sync>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
        }
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// Get all tools across all systems. Names must be unique; duplicates
    /// are rejected when the registry is rendered to the provider format.
    fn get_tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    /// Find the system providing a tool, along with its declaration
    fn find_tool(&self, name: &str) -> Option<(&dyn System, &Tool)> {
        for system in &self.systems {
            if let Some(tool) = system.tools().iter().find(|t| t.name == name) {
                return Some((&**system, tool));
            }
        }
        None
    }

    /// Dispatch a single tool call to the system providing it.
    ///
    /// Argument validation failures and unknown tool names fail only this
    /// invocation; the error is reported back to the model as a tool-error
    /// turn on the next iteration.
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<String> {
        let call = tool_call?;
        let (system, declared) = self
            .find_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        tool::validate_call(declared, &call.arguments)?;
        system.call(call).await
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        let mut context = HashMap::new();
        let systems_info: Vec<SystemInfo> = self
            .systems
            .iter()
            .map(|system| {
                SystemInfo::new(system.name(), system.description(), system.instructions())
            })
            .collect();

        context.insert("systems", systems_info);
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    ///
    /// Tool requests within one step are dispatched concurrently, but all
    /// results are collected before the next provider call, so the model sees
    /// them in invocation order on the following iteration.
    pub async fn reply(&self, input: AgentInput) -> Result<BoxStream<'_, Result<Message>>> {
        let mut messages = input.into_messages();
        let tools = self.get_tools();
        let system_prompt = self.get_system_prompt()?;

        Ok(Box::pin(async_stream::try_stream! {
            for _step in 0..MAX_STEPS {
                // Get completion from provider
                let (response, _usage) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;

                // Yield the assistant's response
                yield response.clone();

                // Ensure the above message is flushed before the potentially
                // long-running tool calls start processing
                tokio::task::yield_now().await;

                // First collect any tool requests
                let tool_requests: Vec<ToolRequest> = response.content
                    .iter()
                    .filter_map(|content| content.as_tool_request().cloned())
                    .collect();

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    break;
                }

                // Then dispatch each in parallel
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();

                // Process all the futures in parallel but wait until all are finished
                let outputs = futures::future::join_all(futures).await;

                // Combine the results into one tool-response message, keeping
                // invocation order
                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response);
                messages.push(message_tool_response);
            }
        }))
    }

    /// Run the agent to completion and collect the final answer along with
    /// every tool invocation, for the buffered delivery mode.
    pub async fn run(&self, input: AgentInput) -> Result<Reply> {
        let mut stream = self.reply(input).await?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut index_by_id: HashMap<String, usize> = HashMap::new();

        while let Some(message) = stream.next().await {
            let message = message?;
            for content in message.content {
                match content {
                    MessageContent::Text(text) => {
                        if !text.text.is_empty() {
                            text_parts.push(text.text);
                        }
                    }
                    MessageContent::ToolRequest(request) => {
                        let (name, arguments) = match &request.tool_call {
                            Ok(call) => (call.name.clone(), call.arguments.clone()),
                            Err(e) => (
                                "invalid".to_string(),
                                serde_json::json!({"error": e.to_string()}),
                            ),
                        };
                        index_by_id.insert(request.id.clone(), invocations.len());
                        invocations.push(ToolInvocation {
                            id: request.id,
                            name,
                            arguments,
                            result: None,
                        });
                    }
                    MessageContent::ToolResponse(response) => {
                        let summary = match response.tool_result {
                            Ok(result) => result,
                            Err(e) => e.to_string(),
                        };
                        if let Some(&index) = index_by_id.get(&response.id) {
                            invocations[index].result = Some(summary);
                        }
                    }
                }
            }
        }

        Ok(Reply {
            text: text_parts.join("\n").trim().to_string(),
            tool_invocations: invocations,
        })
    }
}
