use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

pub const SCHEMA: &str = include_str!("schema.sql");

pub async fn init_pool(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let database_url = format!("sqlite:{}?mode=rwc", database_path);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    apply_schema(&pool).await?;

    Ok(pool)
}

/// Run `schema.sql` one statement at a time (SQLx doesn't support multi-statement queries).
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    for statement in SCHEMA.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}
