//! Data models for the sync bookkeeping.
//!
//! The mirrored Jira rows themselves are written straight from the API
//! projections in `services::jira_types`; only the cache state is modeled
//! as a struct.

pub mod cache_state;
pub mod collection_type;

// Re-exports for convenient access
pub use cache_state::{CacheState, CacheStatus, Operation, SyncMode};
pub use collection_type::CollectionType;
