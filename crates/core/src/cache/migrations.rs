//! Durable cache schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each pending SQL batch
//! runs in its own transaction.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// (version, SQL), ascending.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_cache_entries.sql")),
    (2, include_str!("../../migrations/002_cache_access.sql")),
];

/// Apply every migration newer than the recorded version.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
            .map_err(Error::from)?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::SchemaMigration(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "applied cache schema migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
