//! Jira Mirror - mirrors Jira collections into a local SQLite store.
//!
//! The library exposes the sync engine: cache state tracking per
//! collection, the adapters that ingest each collection, and the
//! orchestrator that drives them. The `jira-mirror` binary is a thin CLI on
//! top of [`services::SyncOrchestrator`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod timestamps;

pub use error::AppError;
