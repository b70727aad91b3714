//! Triple extraction from chunk text via a language model.
//!
//! One JSON-mode request per chunk. Any failure (transport, timeout,
//! malformed output) is logged and counts as zero triples, so a bad
//! chunk never aborts a graph build. There are no retries.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm::{parse_json_object, CompletionRequest, LanguageModel};
use crate::models::Triple;

/// Characters of chunk text sent to the model.
pub const MAX_INPUT_CHARS: usize = 2000;

/// Pause between consecutive per-chunk calls.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct TriplesPayload {
    #[serde(default)]
    triples: Vec<RawTriple>,
}

#[derive(Debug, Deserialize)]
struct RawTriple {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    predicate: String,
    #[serde(default)]
    object: String,
}

/// Extracts subject–predicate–object triples from text.
pub struct TripleExtractor<'a> {
    model: &'a dyn LanguageModel,
    rate_limit: Duration,
}

impl<'a> TripleExtractor<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self {
            model,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Extract triples from one chunk. Never fails; errors yield `[]`.
    pub async fn extract(&self, text: &str) -> Vec<Triple> {
        let prompt = extraction_prompt(truncate_chars(text, MAX_INPUT_CHARS));
        let request = CompletionRequest::json(prompt);

        let response = match self.model.complete(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "triple extraction call failed");
                return Vec::new();
            }
        };

        match parse_json_object::<TriplesPayload>(&response) {
            Ok(payload) => payload
                .triples
                .into_iter()
                .filter_map(|t| Triple::new(&t.subject, &t.predicate, &t.object))
                .collect(),
            Err(e) => {
                warn!(
                    model = self.model.name(),
                    error = %e,
                    "unparseable triple extraction output"
                );
                Vec::new()
            }
        }
    }

    /// Extract triples from every chunk in order, pausing between calls.
    pub async fn extract_all<S: AsRef<str>>(&self, chunks: &[S]) -> Vec<Triple> {
        info!(chunks = chunks.len(), "extracting knowledge from chunks");
        let mut all = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.rate_limit.is_zero() {
                tokio::time::sleep(self.rate_limit).await;
            }
            let triples = self.extract(chunk.as_ref()).await;
            debug!(chunk = i, triples = triples.len(), "chunk extracted");
            all.extend(triples);

            if i % 5 == 0 {
                info!("processed {}/{} chunks", i + 1, chunks.len());
            }
        }
        all
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Analyze the following text and extract key entities (Concepts, People, Places, Events) and their relationships.
Return a JSON object with a key "triples" containing a list of objects with "subject", "predicate", "object".

Text:
{text}

JSON Format:
{{
    "triples": [
        {{"subject": "Entity1", "predicate": "relation", "object": "Entity2"}}
    ]
}}"#
    )
}

/// The prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
