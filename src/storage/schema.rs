//! Database schema and migrations.

use rusqlite::{Connection, Result};

/// Run all pending migrations.
///
/// The `metrics` and `incidents` column names are shared with the agents.db
/// layout written by earlier tooling, so an existing file can be opened in place.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER,
            service TEXT,
            resp_ms REAL,
            mem_mb REAL,
            err_rate REAL
        );

        CREATE TABLE IF NOT EXISTS incidents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER,
            service TEXT,
            type TEXT,
            detail TEXT,
            action TEXT,
            success INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_metrics_service_id ON metrics(service, id);
        CREATE INDEX IF NOT EXISTS idx_incidents_service_id ON incidents(service, id);",
    )?;

    // Migration: incidents gained a stable external id
    let has_uuid: i32 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('incidents') WHERE name='uuid'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if has_uuid == 0 {
        conn.execute("ALTER TABLE incidents ADD COLUMN uuid TEXT", [])?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (1)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }

    #[test]
    fn test_migrate_upgrades_legacy_incidents_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER,
                service TEXT,
                type TEXT,
                detail TEXT,
                action TEXT,
                success INTEGER
            );
            INSERT INTO incidents (timestamp, service, type, detail, action, success)
            VALUES (1700000000, 'real-service', 'gradual_slowdown', 'd', 'a', 1);",
        )
        .unwrap();

        migrate(&conn).unwrap();

        let uuid: Option<String> = conn
            .query_row("SELECT uuid FROM incidents", [], |row| row.get(0))
            .unwrap();
        assert!(uuid.is_none());
    }
}
