//! # Tabular Review CLI (`trv`)
//!
//! ## Usage
//!
//! ```bash
//! trv --config ./config/trv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trv init` | Create the SQLite database and run schema migrations |
//! | `trv files` | List documents available in the data directory |
//! | `trv project create <name>` | Create a project from data-directory files |
//! | `trv project list` | List projects |
//! | `trv project get <id>` | Show a project with documents and answers |
//! | `trv project delete <id>` | Delete a project and everything it owns |
//! | `trv generate <id>` | Run extraction for a list of questions |
//! | `trv export <id>` | Export answers as JSON or CSV |
//! | `trv serve` | Start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level);
//! command output goes to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tabular_review::config::{self, Config};
use tabular_review::export::{self, ExportFormat};
use tabular_review::llm::AnswerClient;
use tabular_review::projects::ProjectService;
use tabular_review::sqlite_store::SqliteStore;
use tabular_review::{db, migrate, server};
use tabular_review_core::models::{DocumentStatus, NewProject};

/// Tabular Review CLI: structured answer extraction over legal documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/trv.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "trv",
    about = "Tabular Review: structured answer extraction over legal documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/trv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// List files in the data directory that can be added to a project.
    Files,

    /// Create, inspect, and delete projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Run extraction over every document of a project.
    ///
    /// Runs to completion and prints a summary. Reruns append new answers.
    Generate {
        /// Project id.
        id: String,

        /// Question to ask of every document (repeatable).
        #[arg(long = "question", short = 'q')]
        questions: Vec<String>,

        /// File with one question per line (blank lines and `#` comments skipped).
        #[arg(long)]
        questions_file: Option<PathBuf>,
    },

    /// Export a project's answers.
    Export {
        /// Project id.
        id: String,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project with one document per `--file`.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Filename inside the data directory (repeatable).
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// List all projects as JSON.
    List,
    /// Print a project as JSON.
    Get { id: String },
    /// Delete a project with its documents and answers.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Files => {
            let service = open_service(&cfg).await?;
            for name in service.list_available_files() {
                println!("{}", name);
            }
        }
        Commands::Project { action } => {
            let service = open_service(&cfg).await?;
            run_project_action(&service, action).await?;
        }
        Commands::Generate {
            id,
            mut questions,
            questions_file,
        } => {
            if let Some(path) = questions_file {
                questions.extend(read_questions_file(&path)?);
            }
            if questions.is_empty() {
                bail!("at least one --question or --questions-file is required");
            }

            let service = open_service(&cfg).await?;
            let Some(project) = service.generate_answers(&id, &questions).await? else {
                bail!("project not found: {}", id);
            };

            let parsed = project
                .documents
                .iter()
                .filter(|d| d.status == DocumentStatus::Parsed)
                .count();
            let failed = project
                .documents
                .iter()
                .filter(|d| d.status == DocumentStatus::Failed)
                .count();

            println!("generate {}", project.id);
            println!("  questions: {}", questions.len());
            println!("  documents parsed: {}", parsed);
            println!("  documents failed: {}", failed);
            println!("  answers stored: {}", project.answers.len());
            println!("  status: {}", project.status);
            println!("ok");
        }
        Commands::Export { id, format, output } => {
            let service = open_service(&cfg).await?;
            let Some(project) = service.get_project(&id).await? else {
                bail!("project not found: {}", id);
            };
            export::write_export(&project, format, output.as_deref())?;
        }
        Commands::Serve => {
            let service = open_service(&cfg).await?;
            server::run_server(Arc::new(service), &cfg.server.bind).await?;
        }
    }

    Ok(())
}

async fn run_project_action(service: &ProjectService, action: ProjectAction) -> Result<()> {
    match action {
        ProjectAction::Create {
            name,
            description,
            files,
        } => {
            let project = service
                .create_project(&NewProject {
                    name,
                    description,
                    filenames: files,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        ProjectAction::List => {
            let projects = service.list_projects().await?;
            println!("{}", serde_json::to_string_pretty(&projects)?);
        }
        ProjectAction::Get { id } => match service.get_project(&id).await? {
            Some(project) => println!("{}", serde_json::to_string_pretty(&project)?),
            None => bail!("project not found: {}", id),
        },
        ProjectAction::Delete { id } => {
            if !service.delete_project(&id).await? {
                bail!("project not found: {}", id);
            }
            println!("deleted {}", id);
        }
    }
    Ok(())
}

/// Wire the store, the answer client, and the data directory together.
///
/// The model credential is resolved here, once, and injected.
async fn open_service(cfg: &Config) -> Result<ProjectService> {
    let pool = db::connect(cfg).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let api_key = cfg.llm.resolve_api_key();
    if cfg.llm.requires_api_key() {
        info!(
            env = %cfg.llm.api_key_env,
            present = api_key.is_some(),
            "model credential"
        );
    }
    let client = Arc::new(AnswerClient::new(&cfg.llm, api_key)?);

    Ok(ProjectService::new(
        store,
        cfg.storage.data_dir.clone(),
        client,
    ))
}

fn read_questions_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read questions file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}
