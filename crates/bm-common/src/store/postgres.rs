use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use strum::IntoEnumIterator;
use tokio_postgres::{Row, types::ToSql};
use tracing::instrument;

use super::util::{timed_execute, timed_query, timed_query_opt};
use super::{LibraryStore, PgPool, ProfileStore, StatsSnapshot, StoreError};
use crate::stats::PointsMode;
use crate::{ActivityLog, Attribute, NewActivityLog, SkillVector, UserProfile};

const PROFILE_COLUMNS: &str =
    "id::text AS id, username, bio, avatar_url, career, education, is_visible";

const STATS_COLUMNS: &str = "user_id::text AS user_id, os_strategy, os_execution, os_logic, \
     os_humanity, os_liberal_arts, skill_sales, skill_marketing, skill_technology, \
     skill_finance, skill_management";

const LOG_COLUMNS: &str = "id::text AS id, user_id::text AS user_id, book_title, author, \
     summary, tags, gained_points, memo, created_at";

/// Postgres-backed store over the `profiles`, `latest_stats`, `read_logs` and
/// `stats_history` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn mapping<E: std::fmt::Display>(column: &'static str) -> impl FnOnce(E) -> StoreError {
    move |err| StoreError::Mapping(format!("{column}: {err}"))
}

fn map_profile(row: &Row) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        id: row.try_get("id").map_err(mapping("id"))?,
        display_name: row.try_get("username").map_err(mapping("username"))?,
        bio: row.try_get("bio").map_err(mapping("bio"))?,
        avatar_ref: row.try_get("avatar_url").map_err(mapping("avatar_url"))?,
        career: row.try_get("career").map_err(mapping("career"))?,
        education: row.try_get("education").map_err(mapping("education"))?,
        is_visible: row
            .try_get::<_, Option<bool>>("is_visible")
            .map_err(mapping("is_visible"))?
            .unwrap_or(false),
    })
}

fn map_stats(row: &Row) -> Result<SkillVector, StoreError> {
    let mut stats = SkillVector::default();
    for attr in Attribute::iter() {
        let value: Option<i32> = row
            .try_get(attr.as_ref())
            .map_err(|err| StoreError::Mapping(format!("{}: {err}", attr.as_ref())))?;
        stats.set(attr, value.unwrap_or(0).max(0) as u32);
    }
    Ok(stats)
}

/// `gained_points` is free-form JSON written by earlier clients; unreadable payloads count as zero.
fn parse_points(value: Option<Value>) -> SkillVector {
    value
        .and_then(|v| serde_json::from_value::<SkillVector>(v).ok())
        .unwrap_or_default()
}

fn map_log(row: &Row) -> Result<ActivityLog, StoreError> {
    Ok(ActivityLog {
        id: row.try_get("id").map_err(mapping("id"))?,
        user_id: row.try_get("user_id").map_err(mapping("user_id"))?,
        book_title: row.try_get("book_title").map_err(mapping("book_title"))?,
        author: row.try_get("author").map_err(mapping("author"))?,
        summary: row.try_get("summary").map_err(mapping("summary"))?,
        tags: row.try_get("tags").map_err(mapping("tags"))?,
        gained_points: parse_points(row.try_get("gained_points").map_err(mapping("gained_points"))?),
        memo: row
            .try_get::<_, Option<String>>("memo")
            .map_err(mapping("memo"))?
            .unwrap_or_default(),
        created_at: row
            .try_get::<_, Option<DateTime<Utc>>>("created_at")
            .map_err(mapping("created_at"))?,
    })
}

fn to_db_counts(stats: &SkillVector) -> Vec<i32> {
    Attribute::iter()
        .map(|attr| i32::try_from(stats.get(attr)).unwrap_or(i32::MAX))
        .collect()
}

/// Single-statement upsert that adds or subtracts `$2..$11` relative to the stored row.
///
/// Concurrent callers serialise on the row lock taken by `ON CONFLICT DO UPDATE`.
fn apply_points_sql(mode: PointsMode) -> String {
    let columns: Vec<String> = Attribute::iter().map(|attr| attr.as_ref().to_string()).collect();

    let inserted: Vec<String> = (0..columns.len())
        .map(|i| match mode {
            PointsMode::Add => format!("${}::integer", i + 2),
            PointsMode::Subtract => "0".to_string(),
        })
        .collect();

    let updates: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| match mode {
            PointsMode::Add => format!(
                "{column} = LEAST(latest_stats.{column}::bigint + EXCLUDED.{column}, 2147483647)::integer"
            ),
            PointsMode::Subtract => format!(
                "{column} = GREATEST(0, latest_stats.{column} - ${}::integer)",
                i + 2
            ),
        })
        .collect();

    format!(
        "INSERT INTO latest_stats (user_id, {columns}, updated_at) \
         VALUES ($1::text::uuid, {inserted}, NOW()) \
         ON CONFLICT (user_id) DO UPDATE SET {updates}, updated_at = NOW() \
         RETURNING {STATS_COLUMNS}",
        columns = columns.join(", "),
        inserted = inserted.join(", "),
        updates = updates.join(", "),
    )
}

#[async_trait]
impl ProfileStore for PgStore {
    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id::text = $1");
        let row = timed_query_opt(&client, &sql, &[&user_id], "get_profile").await?;
        row.as_ref().map(map_profile).transpose()
    }

    #[instrument(skip(self))]
    async fn list_visible_profiles(
        &self,
        excluding: &str,
        limit: usize,
    ) -> Result<Vec<UserProfile>, StoreError> {
        let client = self.pool.get().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE id::text <> $1 AND is_visible = TRUE \
             ORDER BY id \
             LIMIT $2"
        );
        let rows = timed_query(&client, &sql, &[&excluding, &limit], "list_visible_profiles").await?;
        rows.iter().map(map_profile).collect()
    }

    #[instrument(skip(self))]
    async fn get_skill_vector(&self, user_id: &str) -> Result<Option<SkillVector>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {STATS_COLUMNS} FROM latest_stats WHERE user_id::text = $1");
        let row = timed_query_opt(&client, &sql, &[&user_id], "get_skill_vector").await?;
        row.as_ref().map(map_stats).transpose()
    }

    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    async fn get_skill_vectors(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, SkillVector>, StoreError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let client = self.pool.get().await?;
        let sql = format!("SELECT {STATS_COLUMNS} FROM latest_stats WHERE user_id::text = ANY($1)");
        let rows = timed_query(&client, &sql, &[&user_ids], "get_skill_vectors").await?;

        rows.iter()
            .map(|row| {
                let user_id: String = row.try_get("user_id").map_err(mapping("user_id"))?;
                Ok((user_id, map_stats(row)?))
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_activity_logs(&self, user_id: &str) -> Result<Vec<ActivityLog>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM read_logs WHERE user_id::text = $1 ORDER BY created_at DESC"
        );
        let rows = timed_query(&client, &sql, &[&user_id], "get_activity_logs").await?;
        rows.iter().map(map_log).collect()
    }

    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    async fn get_activity_logs_for_users(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<ActivityLog>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.pool.get().await?;
        let sql = format!("SELECT {LOG_COLUMNS} FROM read_logs WHERE user_id::text = ANY($1)");
        let rows = timed_query(&client, &sql, &[&user_ids], "get_activity_logs_for_users").await?;
        rows.iter().map(map_log).collect()
    }

    #[instrument(skip(self))]
    async fn follower_count(&self, user_id: &str) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let rows = timed_query(
            &client,
            "SELECT COUNT(*) AS followers FROM follows WHERE following_id::text = $1",
            &[&user_id],
            "follower_count",
        )
        .await?;
        let count: i64 = rows
            .first()
            .ok_or_else(|| StoreError::Mapping("count returned no row".into()))?
            .try_get("followers")
            .map_err(mapping("followers"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn is_following(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let row = timed_query_opt(
            &client,
            "SELECT 1 FROM follows WHERE follower_id::text = $1 AND following_id::text = $2",
            &[&follower_id, &following_id],
            "is_following",
        )
        .await?;
        Ok(row.is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

#[async_trait]
impl LibraryStore for PgStore {
    #[instrument(skip(self, log), fields(user_id = %log.user_id, title = %log.book_title))]
    async fn insert_activity_log(&self, log: &NewActivityLog) -> Result<ActivityLog, StoreError> {
        let client = self.pool.get().await?;
        let points = serde_json::to_value(log.gained_points)
            .map_err(|err| StoreError::Mapping(format!("gained_points: {err}")))?;
        let sql = format!(
            "INSERT INTO read_logs (user_id, book_title, author, summary, tags, gained_points, memo) \
             VALUES ($1::text::uuid, $2, $3, $4, $5, $6, $7) \
             RETURNING {LOG_COLUMNS}"
        );

        let rows = timed_query(
            &client,
            &sql,
            &[
                &log.user_id,
                &log.book_title,
                &log.author,
                &log.summary,
                &log.tags,
                &points,
                &log.memo,
            ],
            "insert_activity_log",
        )
        .await?;

        let row = rows
            .first()
            .ok_or_else(|| StoreError::Mapping("insert returned no row".into()))?;
        map_log(row)
    }

    #[instrument(skip(self))]
    async fn get_activity_log(&self, log_id: &str) -> Result<Option<ActivityLog>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {LOG_COLUMNS} FROM read_logs WHERE id::text = $1");
        let row = timed_query_opt(&client, &sql, &[&log_id], "get_activity_log").await?;
        row.as_ref().map(map_log).transpose()
    }

    #[instrument(skip(self, log), fields(log_id = %log.id))]
    async fn update_activity_log(
        &self,
        log: &ActivityLog,
    ) -> Result<Option<ActivityLog>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE read_logs SET book_title = $2, author = $3, summary = $4, tags = $5, memo = $6 \
             WHERE id::text = $1 \
             RETURNING {LOG_COLUMNS}"
        );
        let row = timed_query_opt(
            &client,
            &sql,
            &[
                &log.id,
                &log.book_title,
                &log.author,
                &log.summary,
                &log.tags,
                &log.memo,
            ],
            "update_activity_log",
        )
        .await?;
        row.as_ref().map(map_log).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_activity_log(&self, log_id: &str) -> Result<Option<ActivityLog>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("DELETE FROM read_logs WHERE id::text = $1 RETURNING {LOG_COLUMNS}");
        let row = timed_query_opt(&client, &sql, &[&log_id], "delete_activity_log").await?;
        row.as_ref().map(map_log).transpose()
    }

    #[instrument(skip(self, points))]
    async fn apply_points(
        &self,
        user_id: &str,
        points: &SkillVector,
        mode: PointsMode,
    ) -> Result<SkillVector, StoreError> {
        let client = self.pool.get().await?;
        let counts = to_db_counts(points);
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&user_id];
        params.extend(counts.iter().map(|c| c as &(dyn ToSql + Sync)));

        let rows = timed_query(&client, &apply_points_sql(mode), &params, "apply_points").await?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::Mapping("stats upsert returned no row".into()))?;
        map_stats(row)
    }

    #[instrument(skip(self, snapshot), fields(user_id = %snapshot.user_id))]
    async fn insert_stats_snapshot(&self, snapshot: &StatsSnapshot) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let counts = to_db_counts(&snapshot.totals);
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&snapshot.user_id, &snapshot.recorded_at];
        params.extend(counts.iter().map(|c| c as &(dyn ToSql + Sync)));

        timed_execute(
            &client,
            "INSERT INTO stats_history (user_id, recorded_at, total_os_strategy, \
                 total_os_execution, total_os_logic, total_os_humanity, total_os_liberal_arts, \
                 total_skill_sales, total_skill_marketing, total_skill_technology, \
                 total_skill_finance, total_skill_management) \
             VALUES ($1::text::uuid, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &params,
            "insert_stats_snapshot",
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO profiles (id, username, bio, avatar_url, career, education, is_visible, updated_at) \
             VALUES ($1::text::uuid, $2, $3, $4, $5, $6, $7, NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 username = EXCLUDED.username, \
                 bio = EXCLUDED.bio, \
                 avatar_url = EXCLUDED.avatar_url, \
                 career = EXCLUDED.career, \
                 education = EXCLUDED.education, \
                 is_visible = EXCLUDED.is_visible, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {PROFILE_COLUMNS}"
        );

        let rows = timed_query(
            &client,
            &sql,
            &[
                &profile.id,
                &profile.display_name,
                &profile.bio,
                &profile.avatar_ref,
                &profile.career,
                &profile.education,
                &profile.is_visible,
            ],
            "upsert_profile",
        )
        .await?;

        let row = rows
            .first()
            .ok_or_else(|| StoreError::Mapping("profile upsert returned no row".into()))?;
        map_profile(row)
    }

    #[instrument(skip(self))]
    async fn follow(&self, follower_id: &str, following_id: &str) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let inserted = timed_execute(
            &client,
            "INSERT INTO follows (follower_id, following_id) \
             VALUES ($1::text::uuid, $2::text::uuid) \
             ON CONFLICT DO NOTHING",
            &[&follower_id, &following_id],
            "follow",
        )
        .await?;
        Ok(inserted > 0)
    }

    #[instrument(skip(self))]
    async fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let deleted = timed_execute(
            &client,
            "DELETE FROM follows WHERE follower_id::text = $1 AND following_id::text = $2",
            &[&follower_id, &following_id],
            "unfollow",
        )
        .await?;
        Ok(deleted > 0)
    }
}
