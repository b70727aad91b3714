//! Language-model abstraction and structured-output recovery.
//!
//! The [`LanguageModel`] trait is the only seam between the graph
//! pipeline and a completion service. Concrete HTTP clients live in the
//! `docgraph` app crate; tests use scripted in-process models.
//!
//! Model output that should be JSON goes through [`parse_json_object`]:
//! a strict typed decode of the whole response, then one retry on the
//! outermost `{ ... }` substring, then failure.

use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A completion request: messages plus generation parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the service to constrain output to a JSON object.
    pub json_output: bool,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// A low-temperature, JSON-constrained request with a single user turn.
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            temperature: 0.1,
            max_tokens: None,
            json_output: true,
            stop: Vec::new(),
        }
    }
}

/// A chat-completion backend.
///
/// Implementations own their transport, timeout, and authentication.
/// A timed-out call must surface as an error.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns a short identifier for logging (e.g. the model name).
    fn name(&self) -> &str;

    /// Generate a completion and return the assistant text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Decode model output as a JSON object of type `T`.
///
/// Tries the full response first, then the substring from the first `{`
/// to the last `}`.
pub fn parse_json_object<T: DeserializeOwned>(response: &str) -> Result<T> {
    let direct_err = match serde_json::from_str::<T>(response.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let candidate = JSON_OBJECT
        .find(response)
        .ok_or_else(|| anyhow!("no JSON object in model output ({direct_err})"))?;

    serde_json::from_str::<T>(candidate.as_str())
        .map_err(|e| anyhow!("malformed JSON object in model output: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entities {
        entities: Vec<String>,
    }

    #[test]
    fn parses_clean_json() {
        let out: Entities = parse_json_object(r#"{"entities": ["alice", "acme"]}"#).unwrap();
        assert_eq!(out.entities, vec!["alice", "acme"]);
    }

    #[test]
    fn recovers_json_wrapped_in_prose() {
        let response =
            "Sure! Here you go:\n```json\n{\"entities\": [\"alice\"]}\n```\nHope that helps.";
        let out: Entities = parse_json_object(response).unwrap();
        assert_eq!(out.entities, vec!["alice"]);
    }

    #[test]
    fn rejects_output_without_object() {
        assert!(parse_json_object::<Entities>("no json here").is_err());
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(parse_json_object::<Entities>(r#"{"entities": "alice"}"#).is_err());
    }

    #[test]
    fn message_role_serializes_lowercase() {
        let json = serde_json::to_value(Message::system("hi")).unwrap();
        assert_eq!(json["role"], "system");
    }
}
