use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use tracing::info;

use crate::error::AppError;

pub mod models;
pub mod repository;

pub use models::{Account, MatchRecord, WeeklySummary};
pub use repository::Repository;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    puuid TEXT UNIQUE NOT NULL,
    game_name TEXT NOT NULL,
    tag_line TEXT NOT NULL,
    platform TEXT NOT NULL,
    discord_channel_id INTEGER,
    notify_enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL DEFAULT (unixepoch())
);

CREATE TABLE IF NOT EXISTS matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL,
    match_id TEXT NOT NULL,
    queue_id INTEGER NOT NULL,
    queue_type TEXT NOT NULL,
    champion TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT '',
    win INTEGER NOT NULL,
    kills INTEGER NOT NULL,
    deaths INTEGER NOT NULL,
    assists INTEGER NOT NULL,
    kda REAL NOT NULL,
    gold_earned INTEGER NOT NULL,
    gold_per_min REAL NOT NULL,
    total_damage INTEGER NOT NULL,
    damage_per_min REAL NOT NULL,
    cs_total INTEGER NOT NULL,
    cs_per_min REAL NOT NULL,
    vision_score INTEGER NOT NULL,
    vision_per_min REAL NOT NULL,
    gold_share_pct REAL NOT NULL,
    damage_share_pct REAL NOT NULL,
    kill_participation_pct REAL NOT NULL,
    lane_gold_delta_per_min REAL,
    lane_cs_delta_per_min REAL,
    game_duration_secs INTEGER NOT NULL,
    game_start_ts INTEGER,
    recommendations TEXT NOT NULL DEFAULT '[]',
    llm_analysis TEXT,
    analysis_stale INTEGER NOT NULL DEFAULT 0,
    analysis_generated_at INTEGER,
    notified INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT (unixepoch()),
    UNIQUE (account_id, match_id),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS weekly_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL,
    week_start INTEGER NOT NULL,
    week_end INTEGER NOT NULL,
    total_games INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    avg_kda REAL NOT NULL DEFAULT 0,
    avg_gold_per_min REAL NOT NULL DEFAULT 0,
    avg_damage_per_min REAL NOT NULL DEFAULT 0,
    summary_text TEXT NOT NULL,
    sent_at INTEGER,
    UNIQUE (account_id, week_start),
    FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_matches_account ON matches(account_id);
CREATE INDEX IF NOT EXISTS idx_matches_unnotified ON matches(account_id, notified);
"#;

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("database migrations completed");
    Ok(())
}

/// Single-connection in-memory database, migrated and ready. An
/// in-memory SQLite exists per connection, so the pool must never open
/// a second one.
pub async fn connect_in_memory() -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
