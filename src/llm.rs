//! Model-backed answer extraction with heuristic fallback.
//!
//! [`AnswerClient`] turns `(document text, questions)` into one
//! [`ExtractionResult`] per answer by prompting a text-generation backend
//! for a JSON array of `{question, value, confidence, citation}` objects.
//!
//! Backends implement [`GenerationBackend`]:
//! - **[`GeminiBackend`]**: Google Generative Language `generateContent`.
//! - **[`OllamaBackend`]**: a local Ollama instance's `/api/generate`.
//!
//! # Failure policy
//!
//! Extraction never fails. With no backend (provider disabled, or no
//! credential) the client goes straight to
//! [`heuristic_extract`]. With a backend, any error (connection, HTTP
//! status, timeout, non-JSON reply, wrong JSON shape) is logged and the
//! heuristic runs on the original, untruncated text. Degraded results are
//! marked [`AnswerSource::Heuristic`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - Other HTTP 4xx → fail immediately
//! - Network errors and timeouts → retry

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tabular_review_core::heuristic::heuristic_extract;
use tabular_review_core::models::{
    truncate_chars, AnswerSource, ExtractionResult, MAX_CITATION_CHARS, NOT_FOUND,
};

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API credential configured")]
    MissingCredential,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unparseable model reply: {0}")]
    Parse(String),
}

/// A text-in, text-out generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs (e.g. `"gemini:gemini-2.5-flash"`).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

// ============ Answer client ============

/// Answer extraction client.
///
/// Holds only configuration: the optional backend and the input cap.
/// Built once at startup and shared behind an `Arc`.
pub struct AnswerClient {
    backend: Option<Arc<dyn GenerationBackend>>,
    max_input_chars: usize,
}

impl AnswerClient {
    /// Build the client from configuration and an injected credential.
    ///
    /// `api_key` comes from [`LlmConfig::resolve_api_key`] at startup and
    /// is never re-read.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let backend = create_backend(config, api_key)?;
        match &backend {
            Some(b) => info!(backend = b.name(), "model backend initialized"),
            None => warn!(
                provider = %config.provider,
                "model backend unavailable; answers will use heuristic extraction"
            ),
        }
        Ok(Self {
            backend,
            max_input_chars: config.max_input_chars,
        })
    }

    /// Client with an explicit backend (custom transports, tests).
    pub fn with_backend(backend: Arc<dyn GenerationBackend>, max_input_chars: usize) -> Self {
        Self {
            backend: Some(backend),
            max_input_chars,
        }
    }

    /// Client that always uses heuristic extraction.
    pub fn heuristic_only() -> Self {
        Self {
            backend: None,
            max_input_chars: 100_000,
        }
    }

    pub fn is_model_ready(&self) -> bool {
        self.backend.is_some()
    }

    /// Extract answers for `questions` from `text`.
    ///
    /// Always returns a structured result set; see the module docs for
    /// the fallback policy.
    pub async fn extract_answers(&self, text: &str, questions: &[String]) -> Vec<ExtractionResult> {
        let Some(backend) = &self.backend else {
            info!(
                questions = questions.len(),
                "using heuristic extraction (no model backend)"
            );
            return heuristic_extract(text, questions);
        };

        match self.extract_with_model(backend.as_ref(), text, questions).await {
            Ok(results) => {
                info!(results = results.len(), "parsed model extraction results");
                results
            }
            Err(e) => {
                error!(error = %e, "model extraction failed; falling back to heuristic extraction");
                heuristic_extract(text, questions)
            }
        }
    }

    async fn extract_with_model(
        &self,
        backend: &dyn GenerationBackend,
        text: &str,
        questions: &[String],
    ) -> Result<Vec<ExtractionResult>, LlmError> {
        let original_chars = text.chars().count();
        let truncated = truncate_chars(text, self.max_input_chars);
        if original_chars > self.max_input_chars {
            warn!(
                original_chars,
                truncated_chars = self.max_input_chars,
                "document text truncated before prompting"
            );
        }

        let prompt = build_prompt(questions, &truncated)?;
        info!(
            backend = backend.name(),
            questions = questions.len(),
            text_chars = original_chars.min(self.max_input_chars),
            "sending extraction request"
        );
        let reply = backend.generate(&prompt).await?;
        debug!(reply_chars = reply.len(), "received model reply");

        parse_model_reply(&reply)
    }
}

/// Instantiate the backend selected by `config.provider`.
///
/// Returns `Ok(None)` when the provider is disabled or its credential is
/// missing; both mean heuristic-only operation.
pub fn create_backend(
    config: &LlmConfig,
    api_key: Option<String>,
) -> Result<Option<Arc<dyn GenerationBackend>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "gemini" => match api_key {
            Some(key) => Ok(Some(Arc::new(GeminiBackend::new(config, key)?))),
            None => {
                warn!(env = %config.api_key_env, "{}", LlmError::MissingCredential);
                Ok(None)
            }
        },
        "ollama" => Ok(Some(Arc::new(OllamaBackend::new(config)?))),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

// ============ Prompt and reply handling ============

fn build_prompt(questions: &[String], text: &str) -> Result<String, LlmError> {
    let questions_json =
        serde_json::to_string_pretty(questions).map_err(|e| LlmError::Parse(e.to_string()))?;

    Ok(format!(
        r#"You are a legal document analyst. Answer each question below using only the document text that follows.

Questions:
{questions_json}

Respond with a JSON array containing one object per question, in the same order:
[
  {{
    "question": "the question text, copied exactly",
    "value": "the extracted value, or \"Not Found\"",
    "confidence": 0.9,
    "citation": "an exact supporting snippet from the document"
  }}
]
Confidence is a number between 0.0 and 1.0.
Output the JSON array only. Do not wrap it in markdown code fences or add commentary.

Document text:
{text}
"#
    ))
}

/// Strip an optional fenced code block (labeled or not) around a payload.
///
/// Text outside the first fenced block is discarded. A reply without
/// fences is returned trimmed.
pub fn strip_code_fences(reply: &str) -> &str {
    let Some(open) = reply.find("```") else {
        return reply.trim();
    };
    let mut body = &reply[open + 3..];

    // optional language label right after the fence, e.g. ```json
    let label_len = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(body.len());
    if label_len > 0 && body[label_len..].starts_with(char::is_whitespace) {
        body = &body[label_len..];
    }

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parse a model reply into extraction results.
///
/// The payload must be a JSON array of objects. Per-field coercion:
/// - `question`: strings as-is, other scalars stringified, missing/null/empty → `None`
/// - `value`: strings as-is, missing/null → `"Not Found"`, anything else as JSON text
/// - `confidence`: numbers or numeric strings, default 0.0, clamped to `[0, 1]`
/// - `citation`: as `value` but missing/null → `""`, capped at 500 chars
pub fn parse_model_reply(reply: &str) -> Result<Vec<ExtractionResult>, LlmError> {
    let payload = strip_code_fences(reply);
    let parsed: Value = serde_json::from_str(payload).map_err(|e| LlmError::Parse(e.to_string()))?;

    let items = parsed
        .as_array()
        .ok_or_else(|| LlmError::Parse("expected a JSON array".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let obj = item
                .as_object()
                .ok_or_else(|| LlmError::Parse(format!("element {} is not an object", i)))?;

            let question = match obj.get("question") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            };
            let value = match obj.get("value") {
                None | Some(Value::Null) => NOT_FOUND.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            let citation = match obj.get("citation") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };

            Ok(ExtractionResult {
                question,
                value,
                confidence: coerce_confidence(obj.get("confidence")),
                citation: truncate_chars(&citation, MAX_CITATION_CHARS),
                source: AnswerSource::Model,
            })
        })
        .collect()
}

fn coerce_confidence(raw: Option<&Value>) -> f64 {
    let value = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============ HTTP plumbing ============

fn build_http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Send a request, retrying on 429/5xx and transport errors.
async fn send_with_retry<F>(
    backend: &str,
    max_retries: u32,
    mut build: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body = response.text().await.unwrap_or_default();
                let err = LlmError::Api {
                    status: status.as_u16(),
                    body,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(backend, attempt, error = %err, "retryable backend error");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                warn!(backend, attempt, error = %e, "backend request failed");
                last_err = Some(LlmError::Connection(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| LlmError::Connection("request failed after retries".to_string())))
}

// ============ Gemini backend ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

/// Backend for Google's Generative Language API.
pub struct GeminiBackend {
    client: reqwest::Client,
    label: String,
    endpoint: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Gemini provider"))?;
        let base = config.url.as_deref().unwrap_or(GEMINI_BASE_URL);

        Ok(Self {
            client: build_http_client(config)?,
            label: format!("gemini:{}", model),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base.trim_end_matches('/'),
                model
            ),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        let response = send_with_retry(&self.label, self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        gemini_reply_text(&json)
    }
}

/// Concatenate `candidates[0].content.parts[*].text`.
fn gemini_reply_text(json: &Value) -> Result<String, LlmError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing candidates");
            LlmError::Parse(format!("Gemini returned no content ({})", reason))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(LlmError::Parse("Gemini returned empty text".to_string()));
    }
    Ok(text)
}

// ============ Ollama backend ============

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Backend for a local Ollama instance.
pub struct OllamaBackend {
    client: reqwest::Client,
    label: String,
    model: String,
    url: String,
    max_retries: u32,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());

        Ok(Self {
            client: build_http_client(config)?,
            label: format!("ollama:{}", model),
            model,
            url,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));

        let response = send_with_retry(&self.label, self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .map_err(|e| match e {
            LlmError::Connection(msg) => LlmError::Connection(format!(
                "{} (is Ollama running at {}?)",
                msg, self.url
            )),
            other => other,
        })?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(parsed.response)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    fn questions(qs: &[&str]) -> Vec<String> {
        qs.iter().map(|q| q.to_string()).collect()
    }

    const GOOD_REPLY: &str = r#"[
        {"question": "Governing law?", "value": "Delaware", "confidence": 0.92, "citation": "laws of Delaware"},
        {"question": "Effective date?", "value": "2021-01-01", "confidence": 0.8, "citation": "effective 2021-01-01"}
    ]"#;

    #[tokio::test]
    async fn no_backend_matches_heuristic_exactly() {
        let client = AnswerClient::heuristic_only();
        let text = "Governed by the laws of Nevada. Effective 2022-02-02.";
        let qs = questions(&["Governing law?", "Effective date?", "Anything else?"]);

        let got = client.extract_answers(text, &qs).await;
        assert_eq!(got, heuristic_extract(text, &qs));
        assert!(!client.is_model_ready());
    }

    #[tokio::test]
    async fn well_formed_reply_preserves_count() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(format!(
            "```json\n{}\n```",
            GOOD_REPLY
        ))]));
        let client = AnswerClient::with_backend(backend.clone(), 1000);
        let qs = questions(&["Governing law?", "Effective date?"]);

        let got = client.extract_answers("contract text", &qs).await;
        assert_eq!(got.len(), qs.len());
        assert!(got.iter().all(|r| r.source == AnswerSource::Model));
        assert_eq!(got[0].value, "Delaware");
        assert_eq!(got[1].confidence, 0.8);

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"Governing law?\""));
        assert!(prompts[0].contains("contract text"));
    }

    #[tokio::test]
    async fn text_is_truncated_in_prompt_only() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("not json".to_string())]));
        let client = AnswerClient::with_backend(backend.clone(), 20);
        let text = format!("{}{}", "a".repeat(20), " governed by the laws of California");
        let qs = questions(&["Governing law?"]);

        let got = client.extract_answers(&text, &qs).await;

        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains(&"a".repeat(20)));
        assert!(!prompt.contains("California"));

        // fallback sees the untruncated text
        assert_eq!(got[0].source, AnswerSource::Heuristic);
        assert_eq!(got[0].value, "Governed by laws of California");
    }

    #[tokio::test]
    async fn backend_error_falls_back() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(LlmError::Api {
            status: 401,
            body: "bad key".to_string(),
        })]));
        let client = AnswerClient::with_backend(backend, 1000);
        let qs = questions(&["Governing law?", "Termination?"]);
        let text = "Texas law applies.";

        let got = client.extract_answers(text, &qs).await;
        assert_eq!(got, heuristic_extract(text, &qs));
    }

    #[tokio::test]
    async fn wrong_shape_falls_back() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(r#"{"question": "q", "value": "v"}"#.to_string()),
            Ok(r#"[{"question": "q"}, "stray"]"#.to_string()),
        ]));
        let client = AnswerClient::with_backend(backend, 1000);
        let qs = questions(&["q"]);

        for _ in 0..2 {
            let got = client.extract_answers("text", &qs).await;
            assert_eq!(got.len(), 1);
            assert_eq!(got[0].source, AnswerSource::Heuristic);
        }
    }

    #[test]
    fn strips_labeled_and_unlabeled_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[2]\n```"), "[2]");
        assert_eq!(strip_code_fences("Here you go:\n```JSON\n[3]\n```\nthanks"), "[3]");
        assert_eq!(strip_code_fences("```[4]```"), "[4]");
        assert_eq!(strip_code_fences("  [5]  "), "[5]");
        assert_eq!(strip_code_fences("```json [6]```"), "[6]");
        assert_eq!(strip_code_fences("```json\r\n[7]\r\n```"), "[7]");
    }

    #[test]
    fn label_on_fence_line_still_parses() {
        let got =
            parse_model_reply("```json [{\"question\":\"q\",\"value\":\"v\"}]```").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].value, "v");
    }

    #[test]
    fn reply_fields_are_coerced() {
        let reply = r#"[
            {"question": "a", "value": null, "confidence": "0.4", "citation": null},
            {"value": "orphan", "confidence": 0.5},
            {"question": "", "value": "empty question"},
            {"question": "b", "value": 42, "confidence": 7, "citation": "x"},
            {"question": "c", "value": "v", "confidence": -1}
        ]"#;
        let got = parse_model_reply(reply).unwrap();
        assert_eq!(got.len(), 5);

        assert_eq!(got[0].question.as_deref(), Some("a"));
        assert_eq!(got[0].value, NOT_FOUND);
        assert_eq!(got[0].confidence, 0.4);
        assert_eq!(got[0].citation, "");

        assert!(got[1].question.is_none());
        assert!(got[2].question.is_none());

        assert_eq!(got[3].value, "42");
        assert_eq!(got[3].confidence, 1.0);
        assert_eq!(got[4].confidence, 0.0);
    }

    #[test]
    fn long_model_citations_are_capped() {
        let reply = format!(
            r#"[{{"question": "q", "value": "v", "confidence": 0.9, "citation": "{}"}}]"#,
            "c".repeat(900)
        );
        let got = parse_model_reply(&reply).unwrap();
        assert_eq!(got[0].citation.chars().count(), MAX_CITATION_CHARS);
    }

    #[test]
    fn non_json_reply_is_parse_error() {
        assert!(matches!(
            parse_model_reply("I could not find anything."),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn gemini_text_is_concatenated() {
        let json = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "[{\"question\":"}, {"text": "\"q\"}]"}]}}]
        });
        assert_eq!(gemini_reply_text(&json).unwrap(), "[{\"question\":\"q\"}]");

        let blocked = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = gemini_reply_text(&blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn backend_selection() {
        let mut cfg = LlmConfig::default();
        assert!(create_backend(&cfg, Some("k".to_string())).unwrap().is_none());

        cfg.provider = "gemini".to_string();
        cfg.model = Some("gemini-2.5-flash".to_string());
        assert!(create_backend(&cfg, None).unwrap().is_none());
        let gemini = create_backend(&cfg, Some("k".to_string())).unwrap().unwrap();
        assert_eq!(gemini.name(), "gemini:gemini-2.5-flash");

        cfg.provider = "ollama".to_string();
        cfg.model = Some("llama3".to_string());
        let ollama = create_backend(&cfg, None).unwrap().unwrap();
        assert_eq!(ollama.name(), "ollama:llama3");
    }

    // ============ HTTP backends against a local stub ============

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    const MODEL_REPLY: &str =
        r#"[{"question": "Governing law?", "value": "Delaware", "confidence": 0.9, "citation": "laws of Delaware"}]"#;

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend_config(provider: &str, model: &str, url: String) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            model: Some(model.to_string()),
            url: Some(url),
            timeout_secs: 5,
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn ollama_retries_server_errors_then_succeeds() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/generate",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (
                            StatusCode::SERVICE_UNAVAILABLE,
                            Json(serde_json::json!({"error": "loading"})),
                        )
                    } else {
                        (StatusCode::OK, Json(serde_json::json!({"response": MODEL_REPLY})))
                    }
                }
            }),
        );
        let base = spawn_stub(app).await;

        let mut cfg = backend_config("ollama", "llama3", base);
        cfg.max_retries = 2;
        let client = AnswerClient::new(&cfg, None).unwrap();
        assert!(client.is_model_ready());

        let got = client
            .extract_answers("governed by the laws of Delaware", &questions(&["Governing law?"]))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, AnswerSource::Model);
        assert_eq!(got[0].value, "Delaware");
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/generate",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::BAD_REQUEST,
                        Json(serde_json::json!({"error": "model not found"})),
                    )
                }
            }),
        );
        let base = spawn_stub(app).await;

        let mut cfg = backend_config("ollama", "llama3", base);
        cfg.max_retries = 3;
        let client = AnswerClient::new(&cfg, None).unwrap();

        let got = client
            .extract_answers("Texas law applies.", &questions(&["Governing law?", "Parties?"]))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|r| r.source == AnswerSource::Heuristic));
    }

    #[tokio::test]
    async fn slow_backend_times_out_to_heuristic() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(serde_json::json!({"response": MODEL_REPLY}))
            }),
        );
        let base = spawn_stub(app).await;

        let mut cfg = backend_config("ollama", "llama3", base);
        cfg.timeout_secs = 1;
        let client = AnswerClient::new(&cfg, None).unwrap();

        let text = "governed by the laws of Delaware";
        let qs = questions(&["Governing law?"]);
        let got = client.extract_answers(text, &qs).await;
        assert_eq!(got, heuristic_extract(text, &qs));
        assert_eq!(got[0].source, AnswerSource::Heuristic);
    }

    #[tokio::test]
    async fn gemini_sends_key_header_and_json_mime_type() {
        type Seen = (Option<String>, String, serde_json::Value);
        let seen: Arc<Mutex<Option<Seen>>> = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let app = Router::new().route(
            "/v1beta/models/{target}",
            post(
                move |headers: HeaderMap,
                      Path(target): Path<String>,
                      Json(body): Json<serde_json::Value>| {
                    let sink = sink.clone();
                    async move {
                        let key = headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        *sink.lock().unwrap() = Some((key, target, body));
                        Json(serde_json::json!({
                            "candidates": [{"content": {"parts": [{"text": MODEL_REPLY}]}}]
                        }))
                    }
                },
            ),
        );
        let base = spawn_stub(app).await;

        let cfg = backend_config("gemini", "gemini-test", base);
        let client = AnswerClient::new(&cfg, Some("secret".to_string())).unwrap();

        let got = client
            .extract_answers("contract text", &questions(&["Governing law?"]))
            .await;
        assert_eq!(got[0].source, AnswerSource::Model);
        assert_eq!(got[0].value, "Delaware");

        let (key, target, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(key.as_deref(), Some("secret"));
        assert_eq!(target, "gemini-test:generateContent");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("Governing law?"));
        assert!(prompt.contains("contract text"));
    }
}
