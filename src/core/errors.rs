// src/core/errors.rs

//! Defines the primary error type for the entire framework.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the framework.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum MillraceError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Database Error: {0}")]
    Db(Arc<sqlx::Error>),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    #[error("No configuration found for scope '{0}'")]
    ConfigNotFound(String),

    #[error("No generation {generation} for scope '{scope}'")]
    GenerationNotFound { scope: String, generation: i64 },

    #[error("Invalid identity file: {0}")]
    Identity(String),

    #[error("Sealed payload could not be processed")]
    Sealed,

    #[error("Job already queued for this cooldown bucket")]
    AlreadyQueued,

    #[error("Job {0} not found")]
    JobNotFound(i64),

    #[error("Mailer error: {0}")]
    Mailer(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` and `sqlx::Error` are
// not cloneable. Both are wrapped in an Arc to allow for cheap, shared cloning.
impl Clone for MillraceError {
    fn clone(&self) -> Self {
        match self {
            MillraceError::Io(e) => MillraceError::Io(Arc::clone(e)),
            MillraceError::Db(e) => MillraceError::Db(Arc::clone(e)),
            MillraceError::ConfigParse(s) => MillraceError::ConfigParse(s.clone()),
            MillraceError::ConfigValidation(s) => MillraceError::ConfigValidation(s.clone()),
            MillraceError::ConfigNotFound(s) => MillraceError::ConfigNotFound(s.clone()),
            MillraceError::GenerationNotFound { scope, generation } => {
                MillraceError::GenerationNotFound {
                    scope: scope.clone(),
                    generation: *generation,
                }
            }
            MillraceError::Identity(s) => MillraceError::Identity(s.clone()),
            MillraceError::Sealed => MillraceError::Sealed,
            MillraceError::AlreadyQueued => MillraceError::AlreadyQueued,
            MillraceError::JobNotFound(id) => MillraceError::JobNotFound(*id),
            MillraceError::Mailer(s) => MillraceError::Mailer(s.clone()),
            MillraceError::InvalidRequest(s) => MillraceError::InvalidRequest(s.clone()),
            MillraceError::Internal(s) => MillraceError::Internal(s.clone()),
        }
    }
}

impl PartialEq for MillraceError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MillraceError::Io(e1), MillraceError::Io(e2)) => e1.to_string() == e2.to_string(),
            (MillraceError::Db(e1), MillraceError::Db(e2)) => e1.to_string() == e2.to_string(),
            (MillraceError::ConfigParse(s1), MillraceError::ConfigParse(s2)) => s1 == s2,
            (MillraceError::ConfigValidation(s1), MillraceError::ConfigValidation(s2)) => s1 == s2,
            (MillraceError::ConfigNotFound(s1), MillraceError::ConfigNotFound(s2)) => s1 == s2,
            (
                MillraceError::GenerationNotFound {
                    scope: s1,
                    generation: g1,
                },
                MillraceError::GenerationNotFound {
                    scope: s2,
                    generation: g2,
                },
            ) => s1 == s2 && g1 == g2,
            (MillraceError::Identity(s1), MillraceError::Identity(s2)) => s1 == s2,
            (MillraceError::JobNotFound(a), MillraceError::JobNotFound(b)) => a == b,
            (MillraceError::Mailer(s1), MillraceError::Mailer(s2)) => s1 == s2,
            (MillraceError::InvalidRequest(s1), MillraceError::InvalidRequest(s2)) => s1 == s2,
            (MillraceError::Internal(s1), MillraceError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for MillraceError {
    fn from(e: std::io::Error) -> Self {
        MillraceError::Io(Arc::new(e))
    }
}

impl From<sqlx::Error> for MillraceError {
    fn from(e: sqlx::Error) -> Self {
        // A unique-index violation on the queue's dedup index is the one
        // constraint error callers branch on.
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return MillraceError::AlreadyQueued;
        }
        MillraceError::Db(Arc::new(e))
    }
}

impl From<toml::de::Error> for MillraceError {
    fn from(e: toml::de::Error) -> Self {
        MillraceError::ConfigParse(e.to_string())
    }
}

impl From<toml::ser::Error> for MillraceError {
    fn from(e: toml::ser::Error) -> Self {
        MillraceError::ConfigParse(e.to_string())
    }
}

impl From<serde_json::Error> for MillraceError {
    fn from(e: serde_json::Error) -> Self {
        MillraceError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<regex::Error> for MillraceError {
    fn from(e: regex::Error) -> Self {
        MillraceError::ConfigValidation(format!("invalid regular expression: {e}"))
    }
}
