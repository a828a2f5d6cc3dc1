use crate::providers::traits::{ChatMessage, ChatProvider, TokenStream};
use crate::providers::utils::{api_error_message, truncate_chars};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

const APP_REFERER: &str = "https://github.com/rag-chatbot/rag-chatbot";
const APP_TITLE: &str = "RAG Chatbot";

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub status: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One parsed line of an OpenAI-compatible server-sent event stream.
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Token(String),
    Done,
    Error(String),
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseEvent {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        // blank separators, ": keep-alive" comments, event/id fields
        None => return SseEvent::Skip,
    };
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(_) => return SseEvent::Skip,
    };
    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return SseEvent::Error(message);
    }

    match value["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => SseEvent::Token(text.to_string()),
        _ => SseEvent::Skip,
    }
}

/// Chat completions through the OpenRouter gateway (or any
/// OpenAI-compatible endpoint).
#[derive(Clone)]
pub struct OpenRouterProvider {
    settings: LlmSettings,
    client: Client,
}

impl OpenRouterProvider {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(anyhow!("OPENROUTER_API_KEY not set"));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()?;

        info!("Initializing LLM: {}", settings.model);
        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> Value {
        json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(&self.request_body(messages, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("OpenRouter error {}: {}", status, truncate_chars(&body, 500));
            return Err(anyhow!(api_error_message(status.as_u16(), &body)));
        }
        Ok(response)
    }

    /// Sends a short greeting and reports whether the model answered.
    pub async fn test_connection(&self) -> ConnectionReport {
        let messages = [ChatMessage::user("Hello! Can you answer in one short sentence?")];
        match self.complete(&messages).await {
            Ok(reply) => ConnectionReport {
                status: "success".to_string(),
                model: self.settings.model.clone(),
                response: Some(truncate_chars(&reply, 100)),
                error: None,
            },
            Err(e) => {
                error!("LLM connection test failed: {}", e);
                ConnectionReport {
                    status: "error".to_string(),
                    model: self.settings.model.clone(),
                    response: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send(messages, false).await?;
        let response_json: Value = response.json().await?;

        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("API returned error: {}", error));
        }

        response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("Invalid response format: {}", truncate_chars(&response_json.to_string(), 300)))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.send(messages, true).await?;

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(anyhow!("Stream read error: {}", e));
                        break 'read;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // lines are decoded whole so multi-byte characters never split
                while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    match parse_sse_line(line.trim()) {
                        SseEvent::Token(token) => {
                            yield Ok(token);
                        }
                        SseEvent::Done => break 'read,
                        SseEvent::Error(message) => {
                            yield Err(anyhow!("Stream error: {}", message));
                            break 'read;
                        }
                        SseEvent::Skip => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }

    fn clone_box(&self) -> Box<dyn ChatProvider> {
        Box::new(self.clone())
    }
}
