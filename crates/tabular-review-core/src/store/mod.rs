//! Storage abstraction for Tabular Review.
//!
//! The [`Store`] trait defines every persistence operation the extraction
//! pipeline and the project interface need, enabling pluggable backends
//! (SQLite in the main crate, in-memory here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Answer, DocumentStatus, NewProject, ProcessStatus, Project};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_project`](Store::create_project) | Insert a project plus one pending document per filename |
/// | [`get_project`](Store::get_project) | Load a project with its documents and answers |
/// | [`list_projects`](Store::list_projects) | Load all projects |
/// | [`delete_project`](Store::delete_project) | Delete a project, cascading to documents and answers |
/// | [`set_project_status`](Store::set_project_status) | Update a project's status |
/// | [`set_document_status`](Store::set_document_status) | Update a document's status and text cache |
/// | [`insert_answer`](Store::insert_answer) | Append one answer row |
///
/// Documents are returned in creation order; answers in insertion order.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_project(&self, new: &NewProject) -> Result<Project>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Returns `false` if no project with `id` existed.
    async fn delete_project(&self, id: &str) -> Result<bool>;

    async fn set_project_status(&self, id: &str, status: ProcessStatus) -> Result<()>;

    /// `content` is stored only when `Some`; an existing cache is kept otherwise.
    async fn set_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        content: Option<&str>,
    ) -> Result<()>;

    /// Append an answer. Existing answers are never updated in place.
    async fn insert_answer(&self, answer: &Answer) -> Result<()>;
}
