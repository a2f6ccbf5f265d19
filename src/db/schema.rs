// src/db/schema.rs

//! Embedded DDL applied at startup. Every statement is idempotent so the
//! bootstrap can run on every boot.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL DEFAULT '',
    verified      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_config (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    scope       TEXT NOT NULL DEFAULT 'application',
    content     BLOB NOT NULL,
    format      TEXT NOT NULL DEFAULT 'toml',
    description TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_app_config_scope_created
    ON app_config(scope, created_at DESC);

CREATE TABLE IF NOT EXISTS job_queue (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type        TEXT NOT NULL,
    payload         BLOB NOT NULL DEFAULT x'',
    payload_extra   BLOB NOT NULL DEFAULT x'',
    cooldown_bucket INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL DEFAULT 'pending',
    attempts        INTEGER NOT NULL DEFAULT 0,
    max_attempts    INTEGER NOT NULL DEFAULT 3,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    scheduled_for   TEXT NOT NULL,
    locked_at       TEXT,
    completed_at    TEXT,
    last_error      TEXT,
    recurrent       INTEGER NOT NULL DEFAULT 0,
    interval_secs   INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_job_queue_dedup
    ON job_queue(job_type, payload, cooldown_bucket)
    WHERE status IN ('pending', 'processing');

CREATE INDEX IF NOT EXISTS idx_job_queue_due
    ON job_queue(status, scheduled_for);

CREATE TABLE IF NOT EXISTS logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    level      INTEGER NOT NULL,
    message    TEXT NOT NULL,
    fields     BLOB NOT NULL DEFAULT x'',
    created_at TEXT NOT NULL
);
"#;
