//! SQLite pool and schema

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS chats (
        id TEXT PRIMARY KEY NOT NULL,
        chat_data TEXT NOT NULL,
        image_url TEXT,
        timestamp INTEGER NOT NULL,
        user_address TEXT NOT NULL,
        market_id INTEGER,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS chats_timestamp_idx ON chats (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS chats_user_idx ON chats (user_address)",
    "CREATE INDEX IF NOT EXISTS chats_market_idx ON chats (market_id)",
    "CREATE TABLE IF NOT EXISTS markets (
        market_id INTEGER PRIMARY KEY NOT NULL,
        start_time INTEGER NOT NULL,
        deadline INTEGER NOT NULL,
        participation_fee TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        wallet_address TEXT PRIMARY KEY NOT NULL,
        created_at TEXT NOT NULL
    )",
];

/// Open a pool; in-memory databases are pinned to one long-lived connection
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL '{}'", url))?
        .create_if_missing(true);

    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let pool = if in_memory {
        SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool.connect_with(options).await.with_context(|| format!("Failed to open {}", url))?;
    info!("Connected to {}", url);
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.context("Failed to apply schema")?;
    }
    Ok(())
}
