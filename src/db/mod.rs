pub mod queries;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::Tables;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&normalize_sqlite_url(database_url))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// Single connection pool over a private in-memory database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

fn schema(tables: &Tables) -> Vec<String> {
    let sends = &tables.sends;
    let sendables = &tables.sendables;
    vec![
        format!(
            r#"CREATE TABLE IF NOT EXISTS {sends} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NULL,
                mail_class TEXT NULL,
                subject TEXT NOT NULL,
                content TEXT NULL,
                "from" TEXT NULL,
                reply_to TEXT NULL,
                "to" TEXT NULL,
                cc TEXT NULL,
                bcc TEXT NULL,
                sent_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"#
        ),
        format!("CREATE INDEX IF NOT EXISTS {sends}_uuid_index ON {sends} (uuid)"),
        format!(
            r#"CREATE TABLE IF NOT EXISTS {sendables} (
                send_id INTEGER NOT NULL REFERENCES {sends} (id) ON DELETE CASCADE,
                sendable_type TEXT NOT NULL,
                sendable_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (send_id, sendable_type, sendable_id)
            )"#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {sendables}_sendable_index \
             ON {sendables} (sendable_type, sendable_id)"
        ),
    ]
}

/// Creates the sends and pivot tables if they are missing.
pub async fn run_migrations(pool: &SqlitePool, tables: &Tables) -> Result<()> {
    tables.validate()?;
    for statement in schema(tables) {
        sqlx::query(&statement).execute(pool).await?;
    }
    tracing::debug!(sends = %tables.sends, sendables = %tables.sendables, "schema ready");
    Ok(())
}

pub fn normalize_sqlite_url(input: &str) -> String {
    // Accept forms: sqlite:foo.db (fix), sqlite://foo.db (ok), file:foo.db (convert), just path (prepend)
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if let Some(rest) = input.strip_prefix("sqlite:") {
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if let Some(rest) = input.strip_prefix("file:") {
        return format!("sqlite://{rest}");
    }
    format!("sqlite://{input}")
}
