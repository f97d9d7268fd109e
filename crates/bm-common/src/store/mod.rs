use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::Error as PgError;

use crate::stats::PointsMode;
use crate::{ActivityLog, NewActivityLog, SkillVector, UserProfile};

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod util;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use memory::MemoryStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_from_url_checked};
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map row: {0}")]
    Mapping(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time copy of a user's totals, appended after every stats change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub user_id: String,
    pub recorded_at: DateTime<Utc>,
    pub totals: SkillVector,
}

/// Read side of the profile/stats backend consumed by the matching engine.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Visible profiles other than `excluding`, at most `limit` rows.
    async fn list_visible_profiles(
        &self,
        excluding: &str,
        limit: usize,
    ) -> Result<Vec<UserProfile>, StoreError>;

    async fn get_skill_vector(&self, user_id: &str) -> Result<Option<SkillVector>, StoreError>;

    /// Batched lookup. Users without stats are absent from the map.
    async fn get_skill_vectors(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, SkillVector>, StoreError>;

    /// Newest first.
    async fn get_activity_logs(&self, user_id: &str) -> Result<Vec<ActivityLog>, StoreError>;

    /// Batched lookup. Each log carries its owning `user_id`.
    async fn get_activity_logs_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<ActivityLog>, StoreError>;

    async fn follower_count(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn is_following(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Write side used by the library service, the profile service and the analysis queue.
#[async_trait]
pub trait LibraryStore: ProfileStore {
    async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<ActivityLog, StoreError>;

    async fn get_activity_log(&self, log_id: &str) -> Result<Option<ActivityLog>, StoreError>;

    /// Overwrites the editable columns (title, author, summary, tags, memo). `gained_points` is kept.
    async fn update_activity_log(
        &self,
        log: &ActivityLog,
    ) -> Result<Option<ActivityLog>, StoreError>;

    /// Returns the removed row, or `None` when no row was deleted by this call.
    async fn delete_activity_log(&self, log_id: &str) -> Result<Option<ActivityLog>, StoreError>;

    /// Applies `points` to the stored totals in a single step and returns the new totals.
    ///
    /// A user without a row starts from zero. Subtract floors every counter at zero.
    async fn apply_points(
        &self,
        user_id: &str,
        points: &SkillVector,
        mode: PointsMode,
    ) -> Result<SkillVector, StoreError>;

    async fn insert_stats_snapshot(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError>;

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError>;

    /// `true` when a new follow edge was created.
    async fn follow(&self, follower_id: &str, following_id: &str) -> Result<bool, StoreError>;

    /// `true` when an existing follow edge was removed.
    async fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<bool, StoreError>;
}
