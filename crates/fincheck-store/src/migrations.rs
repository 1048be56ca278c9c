use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_cache_blobs",
        sql: r#"
CREATE TABLE IF NOT EXISTS cache_blobs (
    cache_key TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    stored_at_ms BIGINT NOT NULL,
    ttl_ms BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_cache_blob_expiry_index",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_cache_blobs_stored_at ON cache_blobs(stored_at_ms);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
