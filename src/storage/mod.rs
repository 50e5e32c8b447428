//! SQLite storage layer -- the append-only metric and incident store.

pub mod schema;

use std::path::Path;

use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::heal::Incident;
use crate::monitor::Sample;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    #[error("storage query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("could not create storage directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("storage worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Append-only store of samples and incident records.
///
/// Cloning is cheap; every clone shares the same pool. All methods block on
/// SQLite, so async callers go through `spawn_blocking`.
#[derive(Clone)]
pub struct MetricStore {
    pool: Pool,
}

impl MetricStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(open_pool(path)?))
    }

    /// Append one sample for `service`. Returns the row id.
    pub fn append_sample(
        &self,
        service: &str,
        timestamp: i64,
        response_time_ms: f64,
        memory_mb: f64,
        error_rate: f64,
    ) -> Result<i64, StoreError> {
        self.append(&Sample {
            timestamp,
            service: service.to_string(),
            response_time_ms,
            memory_mb,
            error_rate,
        })
    }

    pub fn append(&self, sample: &Sample) -> Result<i64, StoreError> {
        sample.validate().map_err(StoreError::InvalidSample)?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO metrics (timestamp, service, resp_ms, mem_mb, err_rate)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sample.timestamp,
                sample.service,
                sample.response_time_ms,
                sample.memory_mb,
                sample.error_rate
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// The most recent `n` samples for `service`, oldest first.
    pub fn fetch_recent(&self, service: &str, n: usize) -> Result<Vec<Sample>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, service, resp_ms, mem_mb, err_rate FROM metrics
             WHERE service = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![service, n as i64], |row| {
            Ok(Sample {
                timestamp: row.get::<_, Option<i64>>(0)?.unwrap_or_default(),
                service: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                response_time_ms: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
                memory_mb: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
                error_rate: row.get::<_, Option<f64>>(4)?.unwrap_or_default(),
            })
        })?;

        let mut samples = rows.collect::<Result<Vec<_>, _>>()?;
        samples.reverse();
        Ok(samples)
    }

    /// Distinct services that have at least one sample.
    pub fn services(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT service FROM metrics WHERE service IS NOT NULL ORDER BY service",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn append_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO incidents (uuid, timestamp, service, type, detail, action, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                incident.id.to_string(),
                incident.timestamp,
                incident.service,
                incident.kind,
                incident.detail,
                incident.action,
                incident.success as i64
            ],
        )?;
        Ok(())
    }

    /// The most recent `n` incidents across all services, newest first.
    pub fn fetch_recent_incidents(&self, n: usize) -> Result<Vec<Incident>, StoreError> {
        self.query_incidents(None, n)
    }

    /// The most recent `n` incidents for one service, newest first.
    pub fn fetch_incidents_for(&self, service: &str, n: usize) -> Result<Vec<Incident>, StoreError> {
        self.query_incidents(Some(service), n)
    }

    /// Look up a single incident by its external id.
    pub fn find_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError> {
        let conn = self.pool.get()?;
        let incident = conn
            .query_row(
                "SELECT uuid, timestamp, service, type, detail, action, success
                 FROM incidents WHERE uuid = ?1",
                params![id.to_string()],
                incident_from_row,
            )
            .optional()?;
        Ok(incident)
    }

    fn query_incidents(&self, service: Option<&str>, n: usize) -> Result<Vec<Incident>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, timestamp, service, type, detail, action, success FROM incidents
             WHERE ?1 IS NULL OR service = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![service, n as i64], incident_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn incident_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Incident> {
    // Rows written before the uuid column existed carry NULL there.
    let id = row
        .get::<_, Option<String>>(0)?
        .and_then(|s| Uuid::parse_str(&s).ok())
        .unwrap_or_default();

    Ok(Incident {
        id,
        timestamp: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
        service: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        kind: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        detail: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        action: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        success: row.get::<_, Option<i64>>(6)?.unwrap_or_default() != 0,
    })
}
