//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message as RigMessage};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    ToolCall, ToolCompletionRequest, ToolCompletionResponse,
};

/// Wraps any rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Parts of a chat transcript in the shape rig expects.
struct RigPrompt {
    preamble: Option<String>,
    history: Vec<RigMessage>,
    prompt: RigMessage,
}

/// System messages become the preamble, the trailing user turn becomes the
/// prompt and everything in between is history.
fn to_rig_prompt(messages: Vec<ChatMessage>) -> RigPrompt {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content),
            Role::User => turns.push(RigMessage::user(msg.content)),
            Role::Assistant => turns.push(RigMessage::assistant(msg.content)),
        }
    }

    let prompt = match turns.pop() {
        Some(last @ RigMessage::User { .. }) => last,
        Some(other) => {
            turns.push(other);
            RigMessage::user("Continue.")
        }
        None => RigMessage::user(""),
    };

    RigPrompt {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history: turns,
        prompt,
    }
}

/// Classify a rig error by its message; rig does not expose status codes.
fn map_error(provider: &str, err: CompletionError) -> LlmError {
    let text = err.to_string();
    let lower = text.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if lower.contains("overloaded")
        || lower.contains("529")
        || lower.contains("503")
        || lower.contains("502")
        || lower.contains("500")
        || lower.contains("timed out")
        || lower.contains("timeout")
    {
        LlmError::Overloaded {
            provider: provider.to_string(),
            reason: text,
        }
    } else if lower.contains("401") || lower.contains("unauthorized") {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: text,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let parts = to_rig_prompt(request.messages);
        let mut builder = self
            .model
            .completion_request(parts.prompt)
            .messages(parts.history);
        if let Some(preamble) = parts.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(t) = request.temperature {
            builder = builder.temperature(t as f64);
        }
        if let Some(n) = request.max_tokens {
            builder = builder.max_tokens(n as u64);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(&self.model_name, e))?;

        let mut content = String::new();
        for item in response.choice.iter() {
            if let AssistantContent::Text(text) = item {
                content.push_str(&text.text);
            }
        }

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let parts = to_rig_prompt(request.messages);
        let tools = request
            .tools
            .into_iter()
            .map(|t| rig::completion::ToolDefinition {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            })
            .collect::<Vec<_>>();

        let mut builder = self
            .model
            .completion_request(parts.prompt)
            .messages(parts.history)
            .tools(tools);
        if let Some(preamble) = parts.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(t) = request.temperature {
            builder = builder.temperature(t as f64);
        }
        if let Some(n) = request.max_tokens {
            builder = builder.max_tokens(n as u64);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(&self.model_name, e))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for item in response.choice.iter() {
            match item {
                AssistantContent::Text(t) => text.push_str(&t.text),
                AssistantContent::ToolCall(tc) => tool_calls.push(ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                }),
                _ => {}
            }
        }

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolUse
        };

        Ok(ToolCompletionResponse {
            content: (!text.is_empty()).then_some(text),
            tool_calls,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
            finish_reason,
        })
    }
}
