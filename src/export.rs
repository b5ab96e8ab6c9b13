//! Export a project's answers as a review table.
//!
//! One row per answer with the columns
//! `document, question, value, confidence, source, citation`. The
//! document column is the filename recorded on the answer's citation.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use tabular_review_core::models::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

const CSV_HEADER: [&str; 6] = [
    "document",
    "question",
    "value",
    "confidence",
    "source",
    "citation",
];

#[derive(Debug, Serialize)]
pub struct ExportRow<'a> {
    pub document: &'a str,
    pub question: &'a str,
    pub value: &'a str,
    pub confidence: f64,
    pub source: &'static str,
    pub citation: &'a str,
}

pub fn answer_rows(project: &Project) -> Vec<ExportRow<'_>> {
    project
        .answers
        .iter()
        .map(|answer| {
            let citation = answer.citations.first();
            ExportRow {
                document: citation.map(|c| c.source.as_str()).unwrap_or(""),
                question: &answer.question_text,
                value: answer.value.as_deref().unwrap_or(""),
                confidence: answer.confidence,
                source: answer.source.as_str(),
                citation: citation.map(|c| c.text.as_str()).unwrap_or(""),
            }
        })
        .collect()
}

pub fn render(project: &Project, format: ExportFormat) -> Result<String> {
    let rows = answer_rows(project);
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
        ExportFormat::Csv => render_csv(&rows),
    }
}

fn render_csv(rows: &[ExportRow<'_>]) -> Result<String> {
    // header written by hand so an empty project still gets one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush CSV export")?;
    Ok(String::from_utf8(bytes)?)
}

/// Render and write the export.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub fn write_export(project: &Project, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let rendered = render(project, format)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!(
                "Exported {} answers to {}",
                project.answers.len(),
                path.display()
            );
        }
        None => {
            print!("{}", rendered);
        }
    }

    Ok(())
}
