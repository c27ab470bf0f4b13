use anyhow::Result;
use sqlx::SqlitePool;

/// Create the `records` table and its metadata indexes if missing.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            file_hash TEXT NOT NULL,
            category TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_category ON records(category)")
        .execute(pool)
        .await?;

    Ok(())
}
