//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    request_kind TEXT NOT NULL,
    images TEXT NOT NULL,
    brief TEXT NOT NULL,
    status TEXT NOT NULL,
    result_ref TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_user ON jobs(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

CREATE TABLE IF NOT EXISTS app_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    requests_per_minute INTEGER NOT NULL,
    max_concurrent_requests INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Single row holding the rate-limit settings
pub const SETTINGS_ROW_ID: i64 = 1;
