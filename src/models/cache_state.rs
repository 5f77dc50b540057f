//! Cache state model: per-collection sync lifecycle and progress counters.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::collection_type::CollectionType;
use crate::db::pool::DbPool;
use crate::error::AppError;

/// Lifecycle status of a collection's local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Missing,
    Building,
    Built,
    Updating,
    Updated,
}

impl From<&str> for CacheStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "building" => Self::Building,
            "built" => Self::Built,
            "updating" => Self::Updating,
            "updated" => Self::Updated,
            _ => Self::Missing,
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Building => write!(f, "building"),
            Self::Built => write!(f, "built"),
            Self::Updating => write!(f, "updating"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Refresh mode requested from the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// No lower time bound.
    Full,
    /// Bounded by the last successful completion time.
    Incremental,
}

/// Which progress pair a run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Build,
    Update,
}

impl Operation {
    /// Status while this operation is in flight.
    pub fn running_status(&self) -> CacheStatus {
        match self {
            Self::Build => CacheStatus::Building,
            Self::Update => CacheStatus::Updating,
        }
    }

    /// Status once this operation completes.
    pub fn finished_status(&self) -> CacheStatus {
        match self {
            Self::Build => CacheStatus::Built,
            Self::Update => CacheStatus::Updated,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// One row of `cache_states`. Only the orchestrator mutates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CacheState {
    /// Collection type identifier (see [`CollectionType::as_str`]).
    pub collection_type: String,

    /// Status: `missing`, `building`, `built`, `updating`, `updated`.
    pub status: String,

    pub build_started_at: Option<i64>,
    pub build_completed_at: Option<i64>,
    pub build_record_count: Option<i64>,
    pub build_record_total: Option<i64>,

    pub update_started_at: Option<i64>,
    pub update_completed_at: Option<i64>,
    pub update_record_count: Option<i64>,
    pub update_record_total: Option<i64>,
}

impl CacheState {
    /// A state that has never been synced.
    pub fn missing(collection_type: CollectionType) -> Self {
        Self {
            collection_type: collection_type.as_str().to_string(),
            status: CacheStatus::Missing.to_string(),
            build_started_at: None,
            build_completed_at: None,
            build_record_count: None,
            build_record_total: None,
            update_started_at: None,
            update_completed_at: None,
            update_record_count: None,
            update_record_total: None,
        }
    }

    /// Parse the status string into an enum.
    pub fn status_enum(&self) -> CacheStatus {
        CacheStatus::from(self.status.as_str())
    }

    /// Whether a build or update is in flight (or was left stuck).
    pub fn is_running(&self) -> bool {
        matches!(self.status_enum(), CacheStatus::Building | CacheStatus::Updating)
    }

    /// Lower bound for an incremental refresh: the later of the last
    /// completed build and the last completed update.
    pub fn watermark(&self) -> Option<i64> {
        match (self.build_completed_at, self.update_completed_at) {
            (Some(b), Some(u)) => Some(b.max(u)),
            (b, u) => b.or(u),
        }
    }

    /// Start a run: mark status and reset the operation's progress pair.
    pub fn begin(&mut self, operation: Operation, started_at: i64, total: i64) {
        self.status = operation.running_status().to_string();
        let (started, completed, count, record_total) = self.pair_mut(operation);
        *started = Some(started_at);
        *completed = None;
        *count = Some(0);
        *record_total = Some(total);
    }

    /// Record a progress tick. The count is clamped to `total` and never
    /// moves backwards within a run.
    pub fn record_progress(&mut self, operation: Operation, processed: i64, total: i64) {
        let (_, _, count, record_total) = self.pair_mut(operation);
        let clamped = processed.min(total);
        *count = Some(count.unwrap_or(0).max(clamped));
        *record_total = Some(total);
    }

    /// Finish a run successfully.
    pub fn complete(&mut self, operation: Operation, completed_at: i64) {
        self.status = operation.finished_status().to_string();
        let (_, completed, _, _) = self.pair_mut(operation);
        *completed = Some(completed_at);
    }

    /// Forget incremental history ahead of a full rebuild.
    pub fn reset_update(&mut self) {
        self.update_started_at = None;
        self.update_completed_at = None;
        self.update_record_count = None;
        self.update_record_total = None;
    }

    /// `(processed, total)` for an operation.
    pub fn progress(&self, operation: Operation) -> (i64, i64) {
        match operation {
            Operation::Build => (
                self.build_record_count.unwrap_or(0),
                self.build_record_total.unwrap_or(0),
            ),
            Operation::Update => (
                self.update_record_count.unwrap_or(0),
                self.update_record_total.unwrap_or(0),
            ),
        }
    }

    fn pair_mut(
        &mut self,
        operation: Operation,
    ) -> (&mut Option<i64>, &mut Option<i64>, &mut Option<i64>, &mut Option<i64>) {
        match operation {
            Operation::Build => (
                &mut self.build_started_at,
                &mut self.build_completed_at,
                &mut self.build_record_count,
                &mut self.build_record_total,
            ),
            Operation::Update => (
                &mut self.update_started_at,
                &mut self.update_completed_at,
                &mut self.update_record_count,
                &mut self.update_record_total,
            ),
        }
    }
}

const SELECT_COLUMNS: &str = "collection_type, status,
    build_started_at, build_completed_at, build_record_count, build_record_total,
    update_started_at, update_completed_at, update_record_count, update_record_total";

/// Load the state for a collection type, if one was ever created.
pub async fn get_cache_state(
    pool: &DbPool,
    collection_type: CollectionType,
) -> Result<Option<CacheState>, AppError> {
    let query = format!(
        "SELECT {} FROM cache_states WHERE collection_type = ?",
        SELECT_COLUMNS
    );
    let state = sqlx::query_as::<_, CacheState>(&query)
        .bind(collection_type.as_str())
        .fetch_optional(pool)
        .await?;

    Ok(state)
}

/// Load the state for a collection type, creating a `missing` row on first
/// request.
pub async fn get_or_create_cache_state(
    pool: &DbPool,
    collection_type: CollectionType,
) -> Result<CacheState, AppError> {
    sqlx::query("INSERT OR IGNORE INTO cache_states (collection_type, status) VALUES (?, 'missing')")
        .bind(collection_type.as_str())
        .execute(pool)
        .await?;

    get_cache_state(pool, collection_type)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("CacheState", collection_type.as_str()))
}

/// Persist every column of a state row.
pub async fn save_cache_state(pool: &DbPool, state: &CacheState) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO cache_states (
            collection_type, status,
            build_started_at, build_completed_at, build_record_count, build_record_total,
            update_started_at, update_completed_at, update_record_count, update_record_total
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(collection_type) DO UPDATE SET
            status = excluded.status,
            build_started_at = excluded.build_started_at,
            build_completed_at = excluded.build_completed_at,
            build_record_count = excluded.build_record_count,
            build_record_total = excluded.build_record_total,
            update_started_at = excluded.update_started_at,
            update_completed_at = excluded.update_completed_at,
            update_record_count = excluded.update_record_count,
            update_record_total = excluded.update_record_total
        "#,
    )
    .bind(&state.collection_type)
    .bind(&state.status)
    .bind(state.build_started_at)
    .bind(state.build_completed_at)
    .bind(state.build_record_count)
    .bind(state.build_record_total)
    .bind(state.update_started_at)
    .bind(state.update_completed_at)
    .bind(state.update_record_count)
    .bind(state.update_record_total)
    .execute(pool)
    .await?;

    Ok(())
}

/// All existing state rows, in collection type order.
pub async fn list_cache_states(pool: &DbPool) -> Result<Vec<CacheState>, AppError> {
    let query = format!(
        "SELECT {} FROM cache_states ORDER BY collection_type",
        SELECT_COLUMNS
    );
    let states = sqlx::query_as::<_, CacheState>(&query)
        .fetch_all(pool)
        .await?;

    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    #[test]
    fn test_cache_status_round_trip() {
        for status in [
            CacheStatus::Missing,
            CacheStatus::Building,
            CacheStatus::Built,
            CacheStatus::Updating,
            CacheStatus::Updated,
        ] {
            assert_eq!(CacheStatus::from(status.to_string().as_str()), status);
        }
        assert_eq!(CacheStatus::from("BUILT"), CacheStatus::Built);
        assert_eq!(CacheStatus::from("garbage"), CacheStatus::Missing);
    }

    #[test]
    fn test_watermark_prefers_latest_completion() {
        let mut state = CacheState::missing(CollectionType::Issues);
        assert_eq!(state.watermark(), None);

        state.build_completed_at = Some(100);
        assert_eq!(state.watermark(), Some(100));

        state.update_completed_at = Some(250);
        assert_eq!(state.watermark(), Some(250));

        state.build_completed_at = Some(300);
        assert_eq!(state.watermark(), Some(300));
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let mut state = CacheState::missing(CollectionType::Users);
        state.begin(Operation::Build, 10, 5);
        assert_eq!(state.status_enum(), CacheStatus::Building);
        assert_eq!(state.progress(Operation::Build), (0, 5));

        state.record_progress(Operation::Build, 3, 5);
        assert_eq!(state.progress(Operation::Build), (3, 5));

        state.record_progress(Operation::Build, 9, 5);
        assert_eq!(state.progress(Operation::Build), (5, 5));

        state.record_progress(Operation::Build, 2, 5);
        assert_eq!(state.progress(Operation::Build), (5, 5));

        state.complete(Operation::Build, 20);
        assert_eq!(state.status_enum(), CacheStatus::Built);
        assert_eq!(state.build_completed_at, Some(20));
        assert!(!state.is_running());
    }

    #[test]
    fn test_begin_update_leaves_build_pair_alone() {
        let mut state = CacheState::missing(CollectionType::Issues);
        state.begin(Operation::Build, 1, 2);
        state.record_progress(Operation::Build, 2, 2);
        state.complete(Operation::Build, 5);

        state.begin(Operation::Update, 8, 4);
        assert_eq!(state.status_enum(), CacheStatus::Updating);
        assert_eq!(state.build_completed_at, Some(5));
        assert_eq!(state.update_completed_at, None);
        assert_eq!(state.progress(Operation::Update), (0, 4));
    }

    #[tokio::test]
    async fn test_get_or_create_then_save() {
        let dir = tempdir().unwrap();
        let pool = db::initialize(&dir.path().join("mirror.db")).await.unwrap();

        assert!(get_cache_state(&pool, CollectionType::Projects).await.unwrap().is_none());

        let mut state = get_or_create_cache_state(&pool, CollectionType::Projects)
            .await
            .unwrap();
        assert_eq!(state.status_enum(), CacheStatus::Missing);

        state.begin(Operation::Build, 42, 7);
        save_cache_state(&pool, &state).await.unwrap();

        let reloaded = get_or_create_cache_state(&pool, CollectionType::Projects)
            .await
            .unwrap();
        assert_eq!(reloaded, state);
        assert_eq!(list_cache_states(&pool).await.unwrap().len(), 1);
    }
}
