//! Project operations exposed to the CLI and the HTTP server.
//!
//! [`ProjectService`] holds only configuration and shared handles: the
//! [`Store`], the flat data directory documents are read from, and the
//! [`AnswerClient`]. Every operation is a thin call into the store or the
//! [`pipeline`](crate::pipeline).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use tabular_review_core::models::{NewProject, Project};
use tabular_review_core::store::Store;

use crate::llm::AnswerClient;
use crate::pipeline;

/// A named field to extract, e.g. `{"name": "Effective Date", "description": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct ProjectService {
    store: Arc<dyn Store>,
    data_dir: PathBuf,
    client: Arc<AnswerClient>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>, data_dir: impl Into<PathBuf>, client: Arc<AnswerClient>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
            client,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create a project with one pending document per filename.
    ///
    /// Filenames are not checked against the data directory here; a
    /// missing file surfaces as a failed document during a run.
    pub async fn create_project(&self, new: &NewProject) -> Result<Project> {
        if new.name.trim().is_empty() {
            bail!("project name must not be empty");
        }
        let project = self.store.create_project(new).await?;
        info!(
            project_id = %project.id,
            documents = project.documents.len(),
            "created project"
        );
        Ok(project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.store.get_project(id).await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list_projects().await
    }

    /// Non-hidden regular files in the data directory, sorted by name.
    ///
    /// An unreadable or missing directory is logged and yields an empty list.
    pub fn list_available_files(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    data_dir = %self.data_dir.display(),
                    error = %e,
                    "cannot list data directory"
                );
                return Vec::new();
            }
        };

        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        files.sort();
        files
    }

    /// Delete a project with its documents and answers.
    pub async fn delete_project(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_project(id).await?;
        if deleted {
            info!(project_id = id, "deleted project");
        }
        Ok(deleted)
    }

    /// Run extraction to completion and return the refreshed project.
    pub async fn generate_answers(&self, id: &str, questions: &[String]) -> Result<Option<Project>> {
        pipeline::generate_answers(
            self.store.as_ref(),
            &self.client,
            &self.data_dir,
            id,
            questions,
        )
        .await
    }

    /// Start extraction in the background.
    ///
    /// Returns `None` if the project does not exist. Otherwise the run is
    /// spawned and its handle returned; callers poll
    /// [`get_project`](Self::get_project) for progress. Run errors are
    /// logged by the task.
    pub async fn spawn_generation(
        &self,
        id: &str,
        questions: Vec<String>,
    ) -> Result<Option<JoinHandle<()>>> {
        if self.store.get_project(id).await?.is_none() {
            return Ok(None);
        }

        let store = self.store.clone();
        let client = self.client.clone();
        let data_dir = self.data_dir.clone();
        let project_id = id.to_string();

        let handle = tokio::spawn(async move {
            let run = pipeline::generate_answers(
                store.as_ref(),
                &client,
                &data_dir,
                &project_id,
                &questions,
            )
            .await;
            if let Err(e) = run {
                error!(project_id = %project_id, error = %e, "background extraction failed");
            }
        });
        Ok(Some(handle))
    }

    /// Accept field definitions for a project.
    ///
    /// Definitions are acknowledged but not stored; runs take their
    /// questions directly.
    pub fn define_fields(&self, project_id: &str, fields: &[FieldDefinition]) -> usize {
        info!(project_id, count = fields.len(), "fields defined");
        fields.len()
    }
}
