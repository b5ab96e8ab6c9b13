//! Core data models used throughout Tabular Review.
//!
//! These types represent the projects, documents, and extracted answers
//! that flow through the extraction pipeline, plus the intermediate
//! [`ExtractionResult`] produced by the model client and the heuristic
//! extractor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum stored length of a citation snippet, in characters.
pub const MAX_CITATION_CHARS: usize = 500;

/// Sentinel stored when an extraction produced no value.
pub const NOT_FOUND: &str = "Not Found";

/// Lifecycle of a project, and of individual answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Processing => "processing",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessStatus::Pending),
            "processing" => Ok(ProcessStatus::Processing),
            "completed" => Ok(ProcessStatus::Completed),
            "failed" => Ok(ProcessStatus::Failed),
            other => anyhow::bail!("unknown process status: '{}'", other),
        }
    }
}

/// Parse state of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Parsed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Parsed => "parsed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "parsed" => Ok(DocumentStatus::Parsed),
            "failed" => Ok(DocumentStatus::Failed),
            other => anyhow::bail!("unknown document status: '{}'", other),
        }
    }
}

/// Where an extracted answer came from.
///
/// `Heuristic` marks degraded answers produced by the keyword/pattern
/// fallback when the model backend was unavailable or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Model,
    Heuristic,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Model => "model",
            AnswerSource::Heuristic => "heuristic",
        }
    }
}

impl FromStr for AnswerSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(AnswerSource::Model),
            "heuristic" => Ok(AnswerSource::Heuristic),
            other => anyhow::bail!("unknown answer source: '{}'", other),
        }
    }
}

/// A snippet supporting an extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Supporting text, capped at [`MAX_CITATION_CHARS`].
    pub text: String,
    /// Filename of the document the snippet was taken from.
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
}

impl Citation {
    pub fn new(text: &str, source: &str) -> Self {
        Self {
            text: truncate_chars(text, MAX_CITATION_CHARS),
            source: source.to_string(),
            page: None,
        }
    }
}

/// One ingested source file and its parse status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub filename: String,
    /// Extracted text, cached once parsing succeeds.
    pub content: Option<String>,
    pub status: DocumentStatus,
}

/// A single extracted value for one (document, question) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub project_id: String,
    /// Fresh per extraction event; not stable across runs.
    pub question_id: String,
    pub question_text: String,
    pub value: Option<String>,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub source: AnswerSource,
    pub status: ProcessStatus,
}

/// A named collection of documents and the answers extracted from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    pub status: ProcessStatus,
    pub documents: Vec<Document>,
    pub answers: Vec<Answer>,
}

/// Input for creating a project with one pending document per filename.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filenames: Vec<String>,
}

/// Structured output of one question against one document text.
///
/// `question` is optional because model replies may omit it; results
/// without a question are discarded before persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub question: Option<String>,
    pub value: String,
    pub confidence: f64,
    pub citation: String,
    pub source: AnswerSource,
}

/// Truncate `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
