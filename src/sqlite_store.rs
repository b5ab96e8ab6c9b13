//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `projects`, `documents`, and
//! `answers` tables created by [`migrate`](crate::migrate).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use tabular_review_core::models::{
    Answer, Citation, Document, DocumentStatus, NewProject, ProcessStatus, Project,
};
use tabular_review_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_project(&self, row: &SqliteRow) -> Result<Project> {
        let id: String = row.get("id");
        let status: String = row.get("status");

        let doc_rows = sqlx::query(
            "SELECT id, project_id, filename, content, status FROM documents \
             WHERE project_id = ? ORDER BY position ASC",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let answer_rows = sqlx::query(
            "SELECT id, project_id, question_id, question_text, value, confidence, \
             citations_json, source, status FROM answers WHERE project_id = ? ORDER BY seq ASC",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let documents = doc_rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>>>()?;
        let answers = answer_rows
            .iter()
            .map(answer_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Project {
            id,
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            status: status.parse()?,
            documents,
            answers,
        })
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        project_id: row.get("project_id"),
        filename: row.get("filename"),
        content: row.get("content"),
        status: status.parse()?,
    })
}

fn answer_from_row(row: &SqliteRow) -> Result<Answer> {
    let id: String = row.get("id");
    let citations_json: String = row.get("citations_json");
    let citations: Vec<Citation> = serde_json::from_str(&citations_json)
        .with_context(|| format!("corrupt citations for answer {}", id))?;
    let source: String = row.get("source");
    let status: String = row.get("status");

    Ok(Answer {
        id,
        project_id: row.get("project_id"),
        question_id: row.get("question_id"),
        question_text: row.get("question_text"),
        value: row.get("value"),
        confidence: row.get("confidence"),
        citations,
        source: source.parse()?,
        status: status.parse()?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_project(&self, new: &NewProject) -> Result<Project> {
        let project_id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp();
        let mut documents = Vec::with_capacity(new.filenames.len());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO projects (id, name, description, created_at, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(created_at)
        .bind(ProcessStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        for (position, filename) in new.filenames.iter().enumerate() {
            let doc = Document {
                id: Uuid::new_v4().to_string(),
                project_id: project_id.clone(),
                filename: filename.clone(),
                content: None,
                status: DocumentStatus::Pending,
            };
            sqlx::query(
                "INSERT INTO documents (id, project_id, filename, status, position) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&doc.id)
            .bind(&doc.project_id)
            .bind(&doc.filename)
            .bind(doc.status.as_str())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
            documents.push(doc);
        }

        tx.commit().await?;

        Ok(Project {
            id: project_id,
            name: new.name.clone(),
            description: new.description.clone(),
            created_at,
            status: ProcessStatus::Pending,
            documents,
            answers: Vec::new(),
        })
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, status FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_project(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at, status FROM projects \
             ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut projects = Vec::with_capacity(rows.len());
        for row in &rows {
            projects.push(self.load_project(row).await?);
        }
        Ok(projects)
    }

    async fn delete_project(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM answers WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_project_status(&self, id: &str, status: ProcessStatus) -> Result<()> {
        let result = sqlx::query("UPDATE projects SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("project not found: {}", id);
        }
        Ok(())
    }

    async fn set_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        content: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, content = COALESCE(?, content) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(content)
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            bail!("document not found: {}", document_id);
        }
        Ok(())
    }

    async fn insert_answer(&self, answer: &Answer) -> Result<()> {
        let citations_json = serde_json::to_string(&answer.citations)?;
        sqlx::query(
            r#"
            INSERT INTO answers (id, project_id, question_id, question_text, value,
                                 confidence, citations_json, source, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&answer.id)
        .bind(&answer.project_id)
        .bind(&answer.question_id)
        .bind(&answer.question_text)
        .bind(&answer.value)
        .bind(answer.confidence)
        .bind(&citations_json)
        .bind(answer.source.as_str())
        .bind(answer.status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
