//! Database module for the outfit bot
//!
//! Provides persistence for jobs and rate-limit settings.

mod schema;

use schema::{SCHEMA, SETTINGS_ROW_ID};

use crate::job::{Job, JobId, JobStatus, RequestKind};
use crate::rate_limiter::RateLimitSettings;
use crate::state_machine::ImageRef;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Job Operations ====================

    /// Insert a job or overwrite the stored row with the same id. Image
    /// references are stored with any bot token masked.
    pub fn save_job(&self, job: &Job) -> DbResult<()> {
        let images: Vec<ImageRef> = job.images().iter().map(ImageRef::redacted).collect();
        let images = serde_json::to_string(&images)?;
        let result = job.result().map(ImageRef::redacted);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (id, user_id, request_kind, images, brief, status, result_ref, error, created_at, completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                result_ref = excluded.result_ref,
                error = excluded.error,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at",
            params![
                job.id().to_string(),
                job.user_id(),
                job.kind().as_str(),
                images,
                job.brief(),
                job.status().as_str(),
                result.as_ref().map(ImageRef::as_str),
                job.error(),
                job.created_at().to_rfc3339(),
                job.completed_at().map(|at| at.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get job by ID
    #[allow(dead_code)] // Used in tests
    pub fn get_job(&self, id: JobId) -> DbResult<Job> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT user_id, request_kind, images, brief, status, result_ref, error, created_at, completed_at
                 FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(JobRow {
                        user_id: row.get(0)?,
                        request_kind: row.get(1)?,
                        images: row.get(2)?,
                        brief: row.get(3)?,
                        status: row.get(4)?,
                        result_ref: row.get(5)?,
                        error: row.get(6)?,
                        created_at: row.get(7)?,
                        completed_at: row.get(8)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::JobNotFound(id.to_string()),
                other => DbError::Sqlite(other),
            })?;
        row.into_job(id)
    }

    // ==================== Settings Operations ====================

    /// Stored rate-limit settings, if any
    pub fn load_rate_limit_settings(&self) -> DbResult<Option<RateLimitSettings>> {
        let conn = self.lock();
        let settings = conn
            .query_row(
                "SELECT requests_per_minute, max_concurrent_requests FROM app_settings WHERE id = ?1",
                params![SETTINGS_ROW_ID],
                |row| {
                    Ok(RateLimitSettings {
                        requests_per_minute: row.get(0)?,
                        max_concurrent_requests: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    /// Replace the stored rate-limit settings
    pub fn save_rate_limit_settings(&self, settings: RateLimitSettings) -> DbResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO app_settings (id, requests_per_minute, max_concurrent_requests, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                requests_per_minute = excluded.requests_per_minute,
                max_concurrent_requests = excluded.max_concurrent_requests,
                updated_at = excluded.updated_at",
            params![
                SETTINGS_ROW_ID,
                settings.requests_per_minute,
                settings.max_concurrent_requests,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Raw column values of a `jobs` row
struct JobRow {
    user_id: i64,
    request_kind: String,
    images: String,
    brief: String,
    status: String,
    result_ref: Option<String>,
    error: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl JobRow {
    fn into_job(self, id: JobId) -> DbResult<Job> {
        let corrupt = |reason: String| DbError::Corrupt {
            table: "jobs",
            reason,
        };
        let kind: RequestKind = self.request_kind.parse().map_err(corrupt)?;
        let status: JobStatus = self.status.parse().map_err(corrupt)?;
        let images: Vec<ImageRef> = serde_json::from_str(&self.images)?;

        Ok(Job::from_parts(
            id,
            self.user_id,
            kind,
            images,
            self.brief,
            status,
            parse_datetime(&self.created_at),
            self.completed_at.as_deref().map(parse_datetime),
            self.result_ref.map(ImageRef::new),
            self.error,
        ))
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
