//! OpenAI-compatible chat-completions client.
//!
//! Implements [`LanguageModel`] over `POST {base_url}/chat/completions`.
//! Works against OpenAI itself and against local servers that speak the
//! same protocol (llama.cpp, vLLM, Ollama's `/v1` endpoint).
//!
//! Each call is bounded by `llm.timeout_secs`; a timeout is an ordinary
//! error. The API key is read from `llm.api_key_env` per call, so a missing
//! key fails the call rather than construction. Calls are never retried
//! here: callers treat a failed extraction as an empty result and move on.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use docgraph_core::llm::{CompletionRequest, LanguageModel, Message};
use serde::Serialize;

use crate::config::LlmConfig;

pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key_env: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn api_key(&self) -> Result<Option<String>> {
        match &self.api_key_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .with_context(|| format!("{var} not set (llm.api_key_env)")),
            None => Ok(None),
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatBody<'a> {
        ChatBody {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature.unwrap_or(request.temperature),
            max_tokens: request.max_tokens.or(self.max_tokens),
            stop: &request.stop,
            response_format: request
                .json_output
                .then(|| serde_json::json!({ "type": "json_object" })),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self.api_key()?;
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&self.body(request));
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("chat request to {} failed", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(config: LlmConfig) -> OpenAiChatModel {
        OpenAiChatModel::new(&config).unwrap()
    }

    #[test]
    fn endpoint_joins_base_url() {
        let m = model(LlmConfig {
            base_url: "http://localhost:9000/v1/".into(),
            ..LlmConfig::default()
        });
        assert_eq!(m.endpoint, "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn json_requests_ask_for_json_object() {
        let m = model(LlmConfig::default());
        let req = CompletionRequest::json("extract");
        let body = serde_json::to_value(m.body(&req)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("stop").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn config_overrides_temperature_and_fills_max_tokens() {
        let m = model(LlmConfig {
            temperature: Some(0.7),
            max_tokens: Some(256),
            ..LlmConfig::default()
        });
        let mut req = CompletionRequest::json("x");
        req.stop = vec!["\n\n".into()];
        let body = serde_json::to_value(m.body(&req)).unwrap();
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stop"][0], "\n\n");
    }

    #[tokio::test]
    async fn missing_api_key_env_fails_the_call_not_construction() {
        let m = model(LlmConfig {
            api_key_env: Some("DOCGRAPH_TEST_SURELY_UNSET_KEY".into()),
            ..LlmConfig::default()
        });
        let err = m.complete(&CompletionRequest::json("hi")).await.unwrap_err();
        assert!(err.to_string().contains("DOCGRAPH_TEST_SURELY_UNSET_KEY not set"));
    }

    #[test]
    fn parses_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"triples\": []}" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "{\"triples\": []}");
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let m = model(LlmConfig {
            base_url: "http://127.0.0.1:1/v1".into(),
            timeout_secs: 2,
            ..LlmConfig::default()
        });
        assert!(m.complete(&CompletionRequest::json("hi")).await.is_err());
    }
}
