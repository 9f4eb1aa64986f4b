//! Chat-completion client with capability (tool-call) dispatch.
//!
//! The service's answer is decoded into [`CompletionReply`], a tagged
//! variant over a plain text reply and a capability-invocation request.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::{Result, TriageError};

/// One message in a chat-completion conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// What the completion service asked for: a plain reply, or the invocation
/// of a named capability with JSON arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionReply {
    Message(String),
    Invoke {
        name: String,
        arguments: serde_json::Value,
    },
}

/// Chat-completion backend. The HTTP client implements this against the
/// live service; tests inject scripted stubs.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Plain completion; returns the reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Completion with advertised capabilities; the reply may request an
    /// invocation instead of answering directly.
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &serde_json::Value,
    ) -> Result<CompletionReply>;
}

/// Completion client for an OpenAI-compatible chat endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    api_key: String,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            TriageError::CompletionParse("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
        })
    }

    fn body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        body
    }

    async fn request(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CompletionApi for OpenAiCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.body(messages);
        let json = self.request(&body).await?;
        parse_reply_content(&json)
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &serde_json::Value,
    ) -> Result<CompletionReply> {
        let mut body = self.body(messages);
        body["tools"] = tools.clone();
        body["tool_choice"] = "auto".into();
        let json = self.request(&body).await?;
        parse_chat_reply(&json)
    }
}

fn response_message(json: &serde_json::Value) -> Result<&serde_json::Value> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| {
            TriageError::CompletionParse("response has no choices[0].message".to_string())
        })
}

/// Extract the plain reply text from a completion response.
pub fn parse_reply_content(json: &serde_json::Value) -> Result<String> {
    let message = response_message(json)?;
    message
        .get("content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| TriageError::CompletionParse("response message has no content".to_string()))
}

/// Decode a completion response into the tagged reply/invocation variant.
///
/// Handles both the `tool_calls` array and the legacy `function_call`
/// object; capability arguments arrive as a JSON-encoded string.
pub fn parse_chat_reply(json: &serde_json::Value) -> Result<CompletionReply> {
    let message = response_message(json)?;

    let call = message
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .and_then(|a| a.first())
        .and_then(|c| c.get("function"))
        .or_else(|| message.get("function_call"));

    if let Some(function) = call {
        let name = function
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| {
                TriageError::CompletionParse("capability invocation has no name".to_string())
            })?
            .to_string();

        let raw_args = function
            .get("arguments")
            .and_then(|a| a.as_str())
            .unwrap_or("{}");
        let arguments: serde_json::Value = serde_json::from_str(raw_args).map_err(|e| {
            TriageError::CompletionParse(format!("invalid capability arguments: {}", e))
        })?;

        return Ok(CompletionReply::Invoke { name, arguments });
    }

    Ok(CompletionReply::Message(parse_reply_content(json)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_reply_is_message_variant() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "Check the coolant line."}}]
        });
        let reply = parse_chat_reply(&json).unwrap();
        assert_eq!(
            reply,
            CompletionReply::Message("Check the coolant line.".to_string())
        );
    }

    #[test]
    fn tool_call_is_invoke_variant() {
        let json = serde_json::json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "type": "function",
                    "function": {
                        "name": "search_tickets",
                        "arguments": "{\"issue_description\": \"E-Stop errors\"}"
                    }
                }]
            }}]
        });
        let reply = parse_chat_reply(&json).unwrap();
        match reply {
            CompletionReply::Invoke { name, arguments } => {
                assert_eq!(name, "search_tickets");
                assert_eq!(arguments["issue_description"], "E-Stop errors");
            }
            other => panic!("expected Invoke, got {:?}", other),
        }
    }

    #[test]
    fn legacy_function_call_is_invoke_variant() {
        let json = serde_json::json!({
            "choices": [{"message": {
                "content": null,
                "function_call": {
                    "name": "search_tickets",
                    "arguments": "{\"issue_description\": \"halt\", \"serial_number\": \"SN-1\"}"
                }
            }}]
        });
        let reply = parse_chat_reply(&json).unwrap();
        match reply {
            CompletionReply::Invoke { name, arguments } => {
                assert_eq!(name, "search_tickets");
                assert_eq!(arguments["serial_number"], "SN-1");
            }
            other => panic!("expected Invoke, got {:?}", other),
        }
    }

    #[test]
    fn malformed_arguments_fail_parse() {
        let json = serde_json::json!({
            "choices": [{"message": {
                "tool_calls": [{
                    "function": {"name": "search_tickets", "arguments": "{not json"}
                }]
            }}]
        });
        let err = parse_chat_reply(&json).unwrap_err();
        assert!(matches!(err, TriageError::CompletionParse(_)));
    }

    #[test]
    fn missing_choices_fail_parse() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_chat_reply(&json).is_err());
    }
}
