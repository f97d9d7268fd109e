use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::store::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "profiles, latest_stats, read_logs, stats_history",
        sql: r#"
CREATE TABLE IF NOT EXISTS profiles (
    id UUID PRIMARY KEY,
    username TEXT,
    bio TEXT,
    avatar_url TEXT,
    career TEXT,
    education TEXT,
    is_visible BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS latest_stats (
    user_id UUID PRIMARY KEY,
    os_strategy INTEGER NOT NULL DEFAULT 0,
    os_execution INTEGER NOT NULL DEFAULT 0,
    os_logic INTEGER NOT NULL DEFAULT 0,
    os_humanity INTEGER NOT NULL DEFAULT 0,
    os_liberal_arts INTEGER NOT NULL DEFAULT 0,
    skill_sales INTEGER NOT NULL DEFAULT 0,
    skill_marketing INTEGER NOT NULL DEFAULT 0,
    skill_technology INTEGER NOT NULL DEFAULT 0,
    skill_finance INTEGER NOT NULL DEFAULT 0,
    skill_management INTEGER NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS read_logs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL,
    book_title TEXT NOT NULL,
    author TEXT,
    summary TEXT,
    tags TEXT[],
    gained_points JSONB,
    memo TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS stats_history (
    id BIGSERIAL PRIMARY KEY,
    user_id UUID NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL,
    total_os_strategy INTEGER NOT NULL,
    total_os_execution INTEGER NOT NULL,
    total_os_logic INTEGER NOT NULL,
    total_os_humanity INTEGER NOT NULL,
    total_os_liberal_arts INTEGER NOT NULL,
    total_skill_sales INTEGER NOT NULL,
    total_skill_marketing INTEGER NOT NULL,
    total_skill_technology INTEGER NOT NULL,
    total_skill_finance INTEGER NOT NULL,
    total_skill_management INTEGER NOT NULL
);
"#,
    },
    Migration {
        id: 2,
        description: "indexes for batched candidate lookups",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_read_logs_user_created
    ON read_logs(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_profiles_visible
    ON profiles(id) WHERE is_visible;
CREATE INDEX IF NOT EXISTS idx_stats_history_user_recorded
    ON stats_history(user_id, recorded_at);
"#,
    },
    Migration {
        id: 3,
        description: "follows, profiles.updated_at",
        sql: r#"
CREATE TABLE IF NOT EXISTS follows (
    follower_id UUID NOT NULL,
    following_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (follower_id, following_id)
);
CREATE INDEX IF NOT EXISTS idx_follows_following
    ON follows(following_id);

ALTER TABLE profiles ADD COLUMN IF NOT EXISTS updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW();
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
