//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                jid TEXT NOT NULL UNIQUE,
                phone TEXT,
                name TEXT,
                user_type TEXT NOT NULL DEFAULT 'new',
                current_reach_out TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_type ON users(user_type);

            CREATE TABLE IF NOT EXISTS queries (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL REFERENCES users(id),
                author_role TEXT NOT NULL,
                text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'init',
                reported INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queries_author ON queries(author_id);

            CREATE TABLE IF NOT EXISTS reach_outs (
                id TEXT PRIMARY KEY,
                query_id TEXT NOT NULL REFERENCES queries(id),
                target_id TEXT NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'hold',
                user_info TEXT NOT NULL DEFAULT '',
                ended INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reach_outs_target_status
                ON reach_outs(target_id, status);
            CREATE INDEX IF NOT EXISTS idx_reach_outs_query ON reach_outs(query_id);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                jid TEXT NOT NULL,
                role TEXT NOT NULL,
                user_type TEXT NOT NULL,
                content TEXT NOT NULL,
                has_media INTEGER NOT NULL DEFAULT 0,
                media_type TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_jid_created ON messages(jid, created_at);
        "#,
    },
    Migration {
        version: 2,
        name: "match_job_queue",
        sql: r#"
            CREATE TABLE IF NOT EXISTS match_jobs (
                id TEXT PRIMARY KEY,
                query_id TEXT NOT NULL REFERENCES queries(id),
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_match_jobs_status ON match_jobs(status, created_at);
        "#,
    },
    Migration {
        version: 3,
        name: "reach_out_idempotency_key",
        sql: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reach_outs_query_target
                ON reach_outs(query_id, target_id);
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &[
            "users",
            "queries",
            "reach_outs",
            "messages",
            "match_jobs",
            "_migrations",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migration_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let conn = test_conn().await;
        let fut = run_migrations(&conn);
        assert_send(&fut);
        fut.await.unwrap();
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 3);
    }

    #[tokio::test]
    async fn version_tracking() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT version, name FROM _migrations ORDER BY version", ())
            .await
            .unwrap();
        let mut seen = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            let v: i64 = row.get(0).unwrap();
            let n: String = row.get(1).unwrap();
            seen.push((v, n));
        }
        assert_eq!(
            seen,
            vec![
                (1, "initial_schema".to_string()),
                (2, "match_job_queue".to_string()),
                (3, "reach_out_idempotency_key".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn idempotency_index_rejects_duplicate_pair() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        conn.execute(
            "INSERT INTO users (id, jid, created_at, updated_at)
             VALUES ('u1', 'author', '2026-01-01', '2026-01-01'),
                    ('t1', 'target', '2026-01-01', '2026-01-01')",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO queries (id, author_id, author_role, text, created_at, updated_at)
             VALUES ('q1', 'u1', 'hr', 'Rust engineer', '2026-01-01', '2026-01-01')",
            (),
        )
        .await
        .unwrap();

        let insert = "INSERT INTO reach_outs (id, query_id, target_id, kind, status, created_at, updated_at)
                      VALUES (?1, 'q1', 't1', 'ask', 'hold', '2026-01-01', '2026-01-01')";
        conn.execute(insert, libsql::params!["r1"]).await.unwrap();
        let err = conn.execute(insert, libsql::params!["r2"]).await.unwrap_err();
        assert!(err.to_string().contains("UNIQUE"), "unexpected error: {err}");

        let mut rows = conn.query("SELECT COUNT(*) FROM reach_outs", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }
}
