//! Optional language-model capability used by the label and rate stages.
//!
//! Everything here is best-effort. Callers probe [`LanguageModel::is_available`]
//! once per stage and fall back to heuristics when the backend is down or a
//! reply cannot be parsed.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use honestroles_shared::{HonestRolesError, LlmConfig, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

/// A text-generation backend.
pub trait LanguageModel: Send + Sync {
    /// Cheap reachability probe.
    fn is_available(&self) -> bool;
    /// Generate a completion for `prompt`.
    fn generate(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for a local Ollama-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HonestRolesError::Llm(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl LanguageModel for OllamaClient {
    fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %url, error = %e, "language model probe failed");
                false
            }
        }
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.1 },
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| HonestRolesError::Llm(format!("generate request failed: {e}")))?;
        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| HonestRolesError::Llm(format!("invalid generate response: {e}")))?;
        Ok(parsed.response.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Stub
// ---------------------------------------------------------------------------

/// Deterministic in-process model for tests and offline runs.
///
/// Replies are returned in order; the last one repeats once the queue is drained.
#[derive(Debug, Default)]
pub struct StubModel {
    available: bool,
    replies: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubModel {
    /// An available model that always answers `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_replies(vec![reply.into()])
    }

    /// An available model answering `replies` in order.
    pub fn with_replies(replies: Vec<String>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            available: true,
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    /// A model whose probe always fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LanguageModel for StubModel {
    fn is_available(&self) -> bool {
        self.available
    }

    fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(HonestRolesError::Llm("stub model is unavailable".into()));
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| HonestRolesError::Llm("stub model lock poisoned".into()))?;
        let reply = if replies.len() > 1 {
            replies.pop()
        } else {
            replies.last().cloned()
        };
        Ok(reply.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Prompts and reply parsing
// ---------------------------------------------------------------------------

/// Longest description excerpt sent in a prompt.
const PROMPT_TEXT_MAX_CHARS: usize = 4000;

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(PROMPT_TEXT_MAX_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn label_prompt(title: &str, description: &str, role_categories: &[&str]) -> String {
    format!(
        "You are labeling a job posting. Return a JSON object with keys \
         'seniority' (one of intern, junior, mid, senior, staff, principal, lead, director, \
         vp, c_level), \
         'role_category' (one of {}), and 'tech_stack' (list of lowercase technology names). \
         Return JSON only, no extra text.\n\nTitle: {title}\n\nJob description:\n{}",
        serde_json::to_string(role_categories).unwrap_or_default(),
        excerpt(description)
    )
}

pub fn quality_prompt(description: &str) -> String {
    format!(
        "Rate the quality of this job description on a 0-1 scale. \
         Return a JSON object with keys 'score' (float) and 'reason' (short string). \
         Return JSON only, no extra text.\n\nJob description:\n{}",
        excerpt(description)
    )
}

/// The first JSON object embedded in a model reply.
///
/// Models often wrap JSON in prose or code fences, so this scans for the
/// outermost `{...}` span.
pub fn parse_json_object(reply: &str) -> Option<serde_json::Map<String, Value>> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&reply[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let reply = "Sure! ```json\n{\"score\": 0.7, \"reason\": \"clear\"}\n```";
        let map = parse_json_object(reply).expect("object");
        assert_eq!(map.get("score").and_then(Value::as_f64), Some(0.7));
        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("} {").is_none());
        assert!(parse_json_object("[1, 2]").is_none());
    }

    #[test]
    fn stub_replies_in_order_then_repeats() {
        let stub = StubModel::with_replies(vec!["a".into(), "b".into()]);
        assert!(stub.is_available());
        assert_eq!(stub.generate("p").expect("a"), "a");
        assert_eq!(stub.generate("p").expect("b"), "b");
        assert_eq!(stub.generate("p").expect("b again"), "b");
        assert_eq!(stub.calls(), 3);
    }

    #[test]
    fn unavailable_stub_errors() {
        let stub = StubModel::unavailable();
        assert!(!stub.is_available());
        assert!(matches!(stub.generate("p"), Err(HonestRolesError::Llm(_))));
    }

    #[test]
    fn prompts_truncate_long_text() {
        let long = "x".repeat(PROMPT_TEXT_MAX_CHARS + 50);
        let prompt = quality_prompt(&long);
        assert!(prompt.len() < long.len() + 300);
        assert!(prompt.contains("'score'"));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OllamaClient::new(&LlmConfig {
            base_url: "http://localhost:11434/".into(),
            ..LlmConfig::default()
        })
        .expect("client");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }
}
