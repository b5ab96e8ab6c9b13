//! # Tabular Review
//!
//! Structured answer extraction over legal documents.
//!
//! A project groups documents (PDF, HTML, plain text) stored in one flat
//! data directory. An extraction run asks the same list of questions of
//! every document and stores one answer per (document, question) pair,
//! each with a confidence and a supporting citation. Answers come from a
//! text-generation model when one is configured, and from a deterministic
//! keyword/pattern extractor otherwise or whenever the model call fails.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  data_dir/   │──▶│ Text extractor │──▶│ Answer client │──┐
//! │ pdf/html/txt │   │  (extract)     │   │ model | rules │  │
//! └──────────────┘   └───────────────┘   └──────────────┘  │
//!                                                            ▼
//!                  ┌──────────┐   ┌──────────┐        ┌──────────┐
//!                  │   CLI    │   │   HTTP   │◀──────▶│  SQLite  │
//!                  │  (trv)   │   │  (axum)  │        │  Store   │
//!                  └──────────┘   └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! trv init
//! trv files
//! trv project create "NDA review" --file nda.pdf --file lease.txt
//! trv generate <project-id> --question "What is the governing law?"
//! trv export <project-id> --format csv
//! trv serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed [`Store`](tabular_review_core::store::Store) |
//! | [`extract`] | PDF / HTML / text extraction |
//! | [`llm`] | Answer extraction client and generation backends |
//! | [`pipeline`] | Extraction run orchestration |
//! | [`projects`] | Project operations used by the CLI and server |
//! | [`server`] | JSON HTTP API |
//! | [`export`] | Answer table export (JSON / CSV) |
//!
//! Data models, the heuristic extractor, and the `Store` trait live in the
//! `tabular-review-core` crate.

pub mod config;
pub mod db;
pub mod export;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod pipeline;
pub mod projects;
pub mod server;
pub mod sqlite_store;
