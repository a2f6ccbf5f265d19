// src/store/config_store.rs

//! Versioned, encrypted configuration records and the reload operation.
//!
//! Records are append-only: `save` encrypts and inserts a new generation,
//! nothing is ever updated in place, and older generations stay available for
//! rollback. Plaintext never appears in logs or errors.

use crate::config::Config;
use crate::core::{ConfigProvider, MillraceError, Snapshot};
use crate::crypto::{self, Identity};
use crate::db;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// The scope used when none is named.
pub const DEFAULT_SCOPE: &str = "application";

/// Metadata of one stored generation; content stays sealed.
#[derive(Debug, Clone)]
pub struct GenerationInfo {
    pub generation: i64,
    pub format: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Access to the `app_config` table, constructed with the private identity
/// that payloads are sealed to.
pub struct ConfigStore {
    pool: SqlitePool,
    identity: Identity,
}

impl ConfigStore {
    pub fn new(pool: SqlitePool, identity: Identity) -> Self {
        Self { pool, identity }
    }

    /// Encrypts `plaintext` and appends it as the new latest generation for
    /// `scope`. The insert is a single atomic statement; on error the store
    /// is unchanged. Returns the new generation id.
    pub async fn save(
        &self,
        scope: &str,
        plaintext: &[u8],
        format: &str,
        description: &str,
    ) -> Result<i64, MillraceError> {
        let sealed = crypto::seal(&self.identity.recipient(), plaintext)?;
        let result = sqlx::query(
            "INSERT INTO app_config (scope, content, format, description, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(scope)
        .bind(sealed)
        .bind(format)
        .bind(description)
        .bind(db::encode_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        let generation = result.last_insert_rowid();
        info!(scope, generation, "Saved new config generation.");
        Ok(generation)
    }

    /// Returns the decrypted payload and format tag of `generation` within
    /// `scope`; generation 0 selects the latest.
    pub async fn get(&self, scope: &str, generation: i64) -> Result<(Vec<u8>, String), MillraceError> {
        let row = if generation == 0 {
            sqlx::query(
                "SELECT content, format FROM app_config WHERE scope = ? ORDER BY id DESC LIMIT 1",
            )
            .bind(scope)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query("SELECT content, format FROM app_config WHERE scope = ? AND id = ?")
                .bind(scope)
                .bind(generation)
                .fetch_optional(&self.pool)
                .await?
        };

        let row = row.ok_or_else(|| {
            if generation == 0 {
                MillraceError::ConfigNotFound(scope.to_string())
            } else {
                MillraceError::GenerationNotFound {
                    scope: scope.to_string(),
                    generation,
                }
            }
        })?;

        let sealed: Vec<u8> = row.get("content");
        let format: String = row.get("format");
        let plaintext = crypto::open(&self.identity, &sealed)?;
        Ok((plaintext, format))
    }

    /// Decrypted payload of the maximum-generation row for `scope`.
    pub async fn latest(&self, scope: &str) -> Result<Vec<u8>, MillraceError> {
        let (plaintext, _) = self.get(scope, 0).await?;
        Ok(plaintext)
    }

    /// All scopes present in the store.
    pub async fn scopes(&self) -> Result<Vec<String>, MillraceError> {
        let rows = sqlx::query("SELECT DISTINCT scope FROM app_config ORDER BY scope")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("scope")).collect())
    }

    /// Generation metadata for `scope`, newest first.
    pub async fn generations(&self, scope: &str) -> Result<Vec<GenerationInfo>, MillraceError> {
        let rows = sqlx::query(
            "SELECT id, format, description, created_at FROM app_config
             WHERE scope = ? ORDER BY id DESC",
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(GenerationInfo {
                    generation: r.get("id"),
                    format: r.get("format"),
                    description: r.get("description"),
                    created_at: db::decode_ts(r.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }
}

/// Re-reads the latest `application` config, parses and validates it, and
/// atomically publishes the new snapshot. On any failure the provider keeps
/// the current snapshot and the error is surfaced to the caller; a reload is
/// never partial.
pub async fn reload(store: &ConfigStore, provider: &ConfigProvider) -> Result<(), MillraceError> {
    let plaintext = store.latest(DEFAULT_SCOPE).await?;
    let contents = String::from_utf8(plaintext)
        .map_err(|_| MillraceError::ConfigParse("config payload is not valid UTF-8".to_string()))?;
    let mut config = Config::from_toml(&contents)?;
    config.source = Some(format!("db:{DEFAULT_SCOPE}"));
    let snapshot = Snapshot::build(config)?;
    provider.replace(snapshot);
    info!("Configuration reloaded.");
    Ok(())
}
