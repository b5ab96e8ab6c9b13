//! Extraction run orchestration.
//!
//! One run takes a project and a question list, and walks the project's
//! documents in order: extract text → ask the [`AnswerClient`] → persist
//! one [`Answer`] per returned result. Documents are processed strictly
//! one after another.
//!
//! # Failure semantics
//!
//! - A document whose text cannot be extracted is marked `failed` and
//!   contributes no answers; the run continues.
//! - Model failures never reach this module (the client falls back to
//!   heuristic extraction).
//! - Anything else (storage errors, a crashed extraction task) aborts the
//!   run and is returned to the caller. Answers already written stay
//!   written and the project is left in `processing`.
//!
//! Reruns append new answers; nothing is upserted.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tabular_review_core::models::{
    Answer, Citation, Document, DocumentStatus, ProcessStatus, Project,
};
use tabular_review_core::store::Store;

use crate::extract::{extract_text, ExtractError};
use crate::llm::AnswerClient;

/// Per-run counters, logged when a run finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub documents_parsed: usize,
    pub documents_failed: usize,
    pub answers_written: usize,
    pub results_discarded: usize,
}

/// Run extraction for every document of `project_id`.
///
/// Returns the refreshed project, or `None` if it does not exist.
pub async fn generate_answers(
    store: &dyn Store,
    client: &AnswerClient,
    data_dir: &Path,
    project_id: &str,
    questions: &[String],
) -> Result<Option<Project>> {
    let Some(project) = store.get_project(project_id).await? else {
        warn!(project_id, "extraction requested for unknown project");
        return Ok(None);
    };

    info!(
        project_id,
        documents = project.documents.len(),
        questions = questions.len(),
        "starting extraction run"
    );
    store
        .set_project_status(project_id, ProcessStatus::Processing)
        .await?;

    let stats = match process_documents(store, client, data_dir, &project, questions).await {
        Ok(stats) => stats,
        Err(e) => {
            error!(project_id, error = %e, "extraction run aborted");
            return Err(e);
        }
    };

    store
        .set_project_status(project_id, ProcessStatus::Completed)
        .await?;
    info!(
        project_id,
        parsed = stats.documents_parsed,
        failed = stats.documents_failed,
        answers = stats.answers_written,
        discarded = stats.results_discarded,
        "extraction run completed"
    );

    store.get_project(project_id).await
}

async fn process_documents(
    store: &dyn Store,
    client: &AnswerClient,
    data_dir: &Path,
    project: &Project,
    questions: &[String],
) -> Result<RunStats> {
    let mut stats = RunStats::default();

    for document in &project.documents {
        let text = match extract_document(data_dir, document).await? {
            Ok(text) => text,
            Err(e) => {
                error!(
                    document_id = %document.id,
                    filename = %document.filename,
                    error = %e,
                    "document parse failed; skipping"
                );
                store
                    .set_document_status(&document.id, DocumentStatus::Failed, None)
                    .await?;
                stats.documents_failed += 1;
                continue;
            }
        };

        store
            .set_document_status(&document.id, DocumentStatus::Parsed, Some(&text))
            .await?;
        stats.documents_parsed += 1;

        for result in client.extract_answers(&text, questions).await {
            let Some(question_text) = result.question else {
                debug!(filename = %document.filename, "discarding result without a question");
                stats.results_discarded += 1;
                continue;
            };

            let answer = Answer {
                id: Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                question_id: Uuid::new_v4().to_string(),
                question_text,
                value: Some(result.value),
                confidence: result.confidence,
                citations: vec![Citation::new(&result.citation, &document.filename)],
                source: result.source,
                status: ProcessStatus::Completed,
            };
            store.insert_answer(&answer).await?;
            stats.answers_written += 1;
        }
    }

    Ok(stats)
}

/// Extract a document's text on the blocking pool.
///
/// The outer error is a crashed task (unexpected); the inner one is a
/// normal per-document failure.
async fn extract_document(
    data_dir: &Path,
    document: &Document,
) -> Result<Result<String, ExtractError>> {
    let Some(path) = document_path(data_dir, &document.filename) else {
        return Ok(Err(ExtractError::NotFound(PathBuf::from(&document.filename))));
    };

    tokio::task::spawn_blocking(move || extract_text(&path))
        .await
        .with_context(|| format!("text extraction task failed for {}", document.filename))
}

/// Resolve a filename inside the flat data directory.
///
/// Only a single plain path component is accepted; anything that could
/// climb out of the directory resolves to `None`.
pub fn document_path(data_dir: &Path, filename: &str) -> Option<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Some(data_dir.join(name)),
        _ => None,
    }
}
