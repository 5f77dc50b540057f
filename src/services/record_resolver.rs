//! External-key to local-row lookups for reference resolution.
//!
//! Ingestion resolves foreign keys (an issue's project, a worklog's author)
//! against what is already stored locally. Each collection's map is loaded
//! once per resolver and is a snapshot: rows written afterwards are not
//! visible until a new resolver is created.

use std::collections::HashMap;

use sqlx::FromRow;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::CollectionType;

/// A local row reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRef {
    /// Local primary key.
    pub id: i64,
    /// Primary external key of the row.
    pub key: String,
}

#[derive(FromRow)]
struct LookupRow {
    id: i64,
    ref_key: String,
    lookup: Option<String>,
}

const USER_ALIASES: &[&str] = &["name", "email"];
const ID_ALIASES: &[&str] = &["jira_id"];
const NAME_ALIASES: &[&str] = &["name"];
const NO_ALIASES: &[&str] = &[];

/// Primary key column and permitted alias columns per collection type.
fn key_columns(collection_type: CollectionType) -> Option<(&'static str, &'static [&'static str])> {
    match collection_type {
        CollectionType::Users => Some(("jira_key", USER_ALIASES)),
        CollectionType::Projects | CollectionType::Issues => Some(("jira_key", ID_ALIASES)),
        CollectionType::Components
        | CollectionType::Statuses
        | CollectionType::Priorities
        | CollectionType::IssueTypes
        | CollectionType::Resolutions => Some(("jira_id", NAME_ALIASES)),
        CollectionType::Worklogs => Some(("jira_id", NO_ALIASES)),
        CollectionType::Labels => Some(("name", NO_ALIASES)),
        // History rows are keyed by (entry, item) and never referenced
        CollectionType::IssueHistories => None,
    }
}

type MapKey = (CollectionType, Option<String>);

/// Memoized record maps for one sync invocation.
#[derive(Debug, Default)]
pub struct RecordResolver {
    maps: HashMap<MapKey, HashMap<String, LocalRef>>,
}

impl RecordResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the map for `(collection_type, alias)` unless it already is.
    ///
    /// Returns `InvalidInput` when `alias` is not a lookup column of the
    /// collection.
    pub async fn load_if_absent(
        &mut self,
        pool: &DbPool,
        collection_type: CollectionType,
        alias: Option<&str>,
    ) -> Result<(), AppError> {
        let (key_column, lookup_column) = columns_for(collection_type, alias)?;
        let map_key = (collection_type, alias.map(str::to_string));
        if self.maps.contains_key(&map_key) {
            return Ok(());
        }

        let query = format!(
            "SELECT id, {} AS ref_key, {} AS lookup FROM {}",
            key_column,
            lookup_column,
            collection_type.table()
        );
        let rows = sqlx::query_as::<_, LookupRow>(&query).fetch_all(pool).await?;

        let map: HashMap<String, LocalRef> = rows
            .into_iter()
            .filter_map(|row| {
                let lookup = row.lookup?;
                Some((
                    lookup,
                    LocalRef {
                        id: row.id,
                        key: row.ref_key,
                    },
                ))
            })
            .collect();

        log::debug!(
            "Loaded {} {} reference(s) by {}",
            map.len(),
            collection_type,
            lookup_column
        );
        self.maps.insert(map_key, map);
        Ok(())
    }

    /// Look up a loaded map. Misses (including unloaded maps) are `None`.
    pub fn resolve(
        &self,
        collection_type: CollectionType,
        key: &str,
        alias: Option<&str>,
    ) -> Option<&LocalRef> {
        self.maps
            .get(&(collection_type, alias.map(str::to_string)))?
            .get(key)
    }
}

/// `(primary key column, lookup column)` for a collection and alias.
fn columns_for(
    collection_type: CollectionType,
    alias: Option<&str>,
) -> Result<(&'static str, &'static str), AppError> {
    let (key_column, aliases) = key_columns(collection_type).ok_or_else(|| {
        AppError::invalid_input_field(
            format!("{} records cannot be referenced", collection_type),
            "collection_type",
        )
    })?;

    match alias {
        None => Ok((key_column, key_column)),
        Some(alias) => aliases
            .iter()
            .find(|a| **a == alias)
            .map(|a| (key_column, *a))
            .ok_or_else(|| {
                AppError::invalid_input_field(
                    format!("Unknown alias `{}` for {}", alias, collection_type),
                    "alias",
                )
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    async fn seeded_pool(dir: &tempfile::TempDir) -> DbPool {
        let pool = db::initialize(&dir.path().join("mirror.db")).await.unwrap();
        sqlx::query(
            "INSERT INTO users (jira_key, name, email, display_name, synced_at) VALUES
             ('acc-1', 'alice', 'alice@example.com', 'Alice', 0),
             ('acc-2', 'bob', NULL, 'Bob', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_resolve_by_key_and_alias() {
        let dir = tempdir().unwrap();
        let pool = seeded_pool(&dir).await;
        let mut resolver = RecordResolver::new();

        resolver.load_if_absent(&pool, CollectionType::Users, None).await.unwrap();
        resolver
            .load_if_absent(&pool, CollectionType::Users, Some("email"))
            .await
            .unwrap();

        let alice = resolver.resolve(CollectionType::Users, "acc-1", None).unwrap();
        assert_eq!(alice.key, "acc-1");

        let by_email = resolver
            .resolve(CollectionType::Users, "alice@example.com", Some("email"))
            .unwrap();
        assert_eq!(by_email.id, alice.id);

        // NULL alias values are simply absent
        assert!(resolver.resolve(CollectionType::Users, "bob", Some("email")).is_none());
        assert!(resolver.resolve(CollectionType::Users, "acc-9", None).is_none());
    }

    #[tokio::test]
    async fn test_unloaded_map_misses() {
        let resolver = RecordResolver::new();
        assert!(resolver.resolve(CollectionType::Projects, "ABC", None).is_none());
    }

    #[tokio::test]
    async fn test_unknown_alias_is_invalid_input() {
        let dir = tempdir().unwrap();
        let pool = seeded_pool(&dir).await;
        let mut resolver = RecordResolver::new();

        let err = resolver
            .load_if_absent(&pool, CollectionType::Users, Some("shoe_size"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));

        let err = resolver
            .load_if_absent(&pool, CollectionType::IssueHistories, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_maps_are_snapshots() {
        let dir = tempdir().unwrap();
        let pool = seeded_pool(&dir).await;
        let mut resolver = RecordResolver::new();

        resolver.load_if_absent(&pool, CollectionType::Users, None).await.unwrap();
        sqlx::query("INSERT INTO users (jira_key, display_name, synced_at) VALUES ('acc-3', 'Carol', 0)")
            .execute(&pool)
            .await
            .unwrap();

        // Loading again is a no-op, so the new row stays invisible
        resolver.load_if_absent(&pool, CollectionType::Users, None).await.unwrap();
        assert!(resolver.resolve(CollectionType::Users, "acc-3", None).is_none());

        let mut fresh = RecordResolver::new();
        fresh.load_if_absent(&pool, CollectionType::Users, None).await.unwrap();
        assert!(fresh.resolve(CollectionType::Users, "acc-3", None).is_some());
    }

    #[tokio::test]
    async fn test_loaded_keys_are_stable_across_mutations() {
        let dir = tempdir().unwrap();
        let pool = seeded_pool(&dir).await;
        let mut resolver = RecordResolver::new();

        resolver.load_if_absent(&pool, CollectionType::Users, None).await.unwrap();
        let alice = resolver.resolve(CollectionType::Users, "acc-1", None).unwrap().clone();
        let bob = resolver.resolve(CollectionType::Users, "acc-2", None).unwrap().clone();

        sqlx::query("UPDATE users SET jira_key = 'acc-1b', name = 'alicia' WHERE jira_key = 'acc-1'")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE jira_key = 'acc-2'")
            .execute(&pool)
            .await
            .unwrap();
        resolver.load_if_absent(&pool, CollectionType::Users, None).await.unwrap();

        assert_eq!(resolver.resolve(CollectionType::Users, "acc-1", None), Some(&alice));
        assert_eq!(resolver.resolve(CollectionType::Users, "acc-2", None), Some(&bob));
        assert!(resolver.resolve(CollectionType::Users, "acc-1b", None).is_none());
    }
}
