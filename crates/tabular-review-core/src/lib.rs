//! # Tabular Review Core
//!
//! Shared, I/O-free logic for Tabular Review: the project / document /
//! answer data model, the deterministic heuristic answer extractor, and
//! the storage abstraction used by the extraction pipeline.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies.

pub mod heuristic;
pub mod models;
pub mod store;
