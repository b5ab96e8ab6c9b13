//! In-memory [`Store`] implementation for testing and embedding.
//!
//! Keeps projects, documents, and answers in three separate `Vec`s behind
//! `std::sync::RwLock`, mirroring the three SQLite tables so cascade
//! behavior can be asserted per collection.

use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Answer, Document, DocumentStatus, NewProject, ProcessStatus, Project};

use super::Store;

struct StoredProject {
    id: String,
    name: String,
    description: Option<String>,
    created_at: i64,
    status: ProcessStatus,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    projects: RwLock<Vec<StoredProject>>,
    documents: RwLock<Vec<Document>>,
    answers: RwLock<Vec<Answer>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            documents: RwLock::new(Vec::new()),
            answers: RwLock::new(Vec::new()),
        }
    }

    /// Total rows held in each collection: `(projects, documents, answers)`.
    pub fn row_counts(&self) -> (usize, usize, usize) {
        (
            self.projects.read().unwrap().len(),
            self.documents.read().unwrap().len(),
            self.answers.read().unwrap().len(),
        )
    }

    fn assemble(&self, stored: &StoredProject) -> Project {
        let documents = self
            .documents
            .read()
            .unwrap()
            .iter()
            .filter(|d| d.project_id == stored.id)
            .cloned()
            .collect();
        let answers = self
            .answers
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.project_id == stored.id)
            .cloned()
            .collect();
        Project {
            id: stored.id.clone(),
            name: stored.name.clone(),
            description: stored.description.clone(),
            created_at: stored.created_at,
            status: stored.status,
            documents,
            answers,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_project(&self, new: &NewProject) -> Result<Project> {
        let stored = StoredProject {
            id: Uuid::new_v4().to_string(),
            name: new.name.clone(),
            description: new.description.clone(),
            created_at: chrono::Utc::now().timestamp(),
            status: ProcessStatus::Pending,
        };
        {
            let mut docs = self.documents.write().unwrap();
            for filename in &new.filenames {
                docs.push(Document {
                    id: Uuid::new_v4().to_string(),
                    project_id: stored.id.clone(),
                    filename: filename.clone(),
                    content: None,
                    status: DocumentStatus::Pending,
                });
            }
        }
        let project = self.assemble(&stored);
        self.projects.write().unwrap().push(stored);
        Ok(project)
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().unwrap();
        Ok(projects
            .iter()
            .find(|p| p.id == id)
            .map(|p| self.assemble(p)))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects = self.projects.read().unwrap();
        Ok(projects.iter().map(|p| self.assemble(p)).collect())
    }

    async fn delete_project(&self, id: &str) -> Result<bool> {
        let mut projects = self.projects.write().unwrap();
        let before = projects.len();
        projects.retain(|p| p.id != id);
        if projects.len() == before {
            return Ok(false);
        }
        self.documents
            .write()
            .unwrap()
            .retain(|d| d.project_id != id);
        self.answers.write().unwrap().retain(|a| a.project_id != id);
        Ok(true)
    }

    async fn set_project_status(&self, id: &str, status: ProcessStatus) -> Result<()> {
        let mut projects = self.projects.write().unwrap();
        match projects.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.status = status;
                Ok(())
            }
            None => bail!("project not found: {}", id),
        }
    }

    async fn set_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        content: Option<&str>,
    ) -> Result<()> {
        let mut docs = self.documents.write().unwrap();
        match docs.iter_mut().find(|d| d.id == document_id) {
            Some(d) => {
                d.status = status;
                if let Some(text) = content {
                    d.content = Some(text.to_string());
                }
                Ok(())
            }
            None => bail!("document not found: {}", document_id),
        }
    }

    async fn insert_answer(&self, answer: &Answer) -> Result<()> {
        if !self
            .projects
            .read()
            .unwrap()
            .iter()
            .any(|p| p.id == answer.project_id)
        {
            bail!("project not found: {}", answer.project_id);
        }
        self.answers.write().unwrap().push(answer.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerSource, Citation};

    fn answer_for(project_id: &str, question: &str) -> Answer {
        Answer {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            question_id: Uuid::new_v4().to_string(),
            question_text: question.to_string(),
            value: Some("v".to_string()),
            confidence: 0.5,
            citations: vec![Citation::new("snippet", "a.txt")],
            source: AnswerSource::Heuristic,
            status: ProcessStatus::Completed,
        }
    }

    #[tokio::test]
    async fn create_adds_pending_documents_in_order() {
        let store = InMemoryStore::new();
        let project = store
            .create_project(&NewProject {
                name: "Deal".to_string(),
                description: None,
                filenames: vec!["b.txt".to_string(), "a.pdf".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(project.status, ProcessStatus::Pending);
        let names: Vec<&str> = project.documents.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "a.pdf"]);
        assert!(project
            .documents
            .iter()
            .all(|d| d.status == DocumentStatus::Pending));
    }

    #[tokio::test]
    async fn delete_cascades_to_documents_and_answers() {
        let store = InMemoryStore::new();
        let doomed = store
            .create_project(&NewProject {
                name: "Doomed".to_string(),
                description: Some("two docs".to_string()),
                filenames: vec!["one.txt".to_string(), "two.txt".to_string()],
            })
            .await
            .unwrap();
        let kept = store
            .create_project(&NewProject {
                name: "Kept".to_string(),
                description: None,
                filenames: vec!["three.txt".to_string()],
            })
            .await
            .unwrap();
        for q in ["q1", "q2", "q3"] {
            store.insert_answer(&answer_for(&doomed.id, q)).await.unwrap();
        }
        store.insert_answer(&answer_for(&kept.id, "q")).await.unwrap();

        assert_eq!(store.row_counts(), (2, 3, 4));
        assert!(store.delete_project(&doomed.id).await.unwrap());
        assert_eq!(store.row_counts(), (1, 1, 1));
        assert!(store.get_project(&doomed.id).await.unwrap().is_none());
        assert!(!store.delete_project(&doomed.id).await.unwrap());
    }

    #[tokio::test]
    async fn document_status_keeps_cache_when_absent() {
        let store = InMemoryStore::new();
        let project = store
            .create_project(&NewProject {
                name: "P".to_string(),
                description: None,
                filenames: vec!["a.txt".to_string()],
            })
            .await
            .unwrap();
        let doc_id = project.documents[0].id.clone();

        store
            .set_document_status(&doc_id, DocumentStatus::Parsed, Some("body"))
            .await
            .unwrap();
        store
            .set_document_status(&doc_id, DocumentStatus::Failed, None)
            .await
            .unwrap();

        let doc = &store.get_project(&project.id).await.unwrap().unwrap().documents[0];
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.content.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn unknown_ids_are_errors() {
        let store = InMemoryStore::new();
        assert!(store
            .set_project_status("missing", ProcessStatus::Completed)
            .await
            .is_err());
        assert!(store
            .set_document_status("missing", DocumentStatus::Parsed, None)
            .await
            .is_err());
        assert!(store.insert_answer(&answer_for("missing", "q")).await.is_err());
    }
}
