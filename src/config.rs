// src/config.rs

//! The application configuration schema: parsing, defaults, and validation.
//!
//! Unlike a file-based setup, the canonical configuration lives encrypted in
//! the `app_config` table and is decrypted and parsed from TOML at startup and
//! on every reload. This module only defines the shape of that TOML document.

use crate::core::MillraceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Server bind, TLS, and shutdown settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Graceful shutdown deadline for in-flight requests and daemons.
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8090
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            tls: TlsConfig::default(),
        }
    }
}

/// Configuration for TLS termination on the main listener.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_file")]
    pub cert_file: String,
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_cert_file() -> String {
    "millrace.crt".to_string()
}
fn default_key_file() -> String {
    "millrace.key".to_string()
}

/// Per-request log capture in front of the router.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequestLogConfig {
    #[serde(default = "default_true")]
    pub activated: bool,
    /// URIs, remote addresses, user agents and referers are truncated to this
    /// many bytes before being recorded.
    #[serde(default = "default_request_log_field_limit")]
    pub field_limit: usize,
}

fn default_true() -> bool {
    true
}
fn default_request_log_field_limit() -> usize {
    512
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            activated: default_true(),
            field_limit: default_request_log_field_limit(),
        }
    }
}

/// Parameters of the adaptive IP blocker and its sliding-window Top-K sketch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockIpConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Number of heavy-hitter candidates retained.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Number of buckets in the sliding window.
    #[serde(default = "default_window_buckets")]
    pub window_buckets: usize,
    /// Counter columns per sketch row.
    #[serde(default = "default_sketch_width")]
    pub width: usize,
    /// Sketch rows (independent hash functions).
    #[serde(default = "default_sketch_depth")]
    pub depth: usize,
    /// Requests per window-bucket advance.
    #[serde(default = "default_tick_requests")]
    pub tick_requests: u64,
    /// Observed requests-per-second below which no blocking happens.
    #[serde(default = "default_activation_rps")]
    pub activation_rps: f64,
    /// Percentage of window capacity a single IP may consume, 1-100.
    #[serde(default = "default_max_share_percent")]
    pub max_share_percent: u8,
    /// How long a blocked IP stays in the block cache.
    #[serde(with = "humantime_serde", default = "default_block_ttl")]
    pub block_ttl: Duration,
}

fn default_top_k() -> usize {
    10
}
fn default_window_buckets() -> usize {
    10
}
fn default_sketch_width() -> usize {
    1024
}
fn default_sketch_depth() -> usize {
    4
}
fn default_tick_requests() -> u64 {
    1000
}
fn default_activation_rps() -> f64 {
    500.0
}
fn default_max_share_percent() -> u8 {
    20
}
fn default_block_ttl() -> Duration {
    Duration::from_secs(300)
}

impl Default for BlockIpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: default_top_k(),
            window_buckets: default_window_buckets(),
            width: default_sketch_width(),
            depth: default_sketch_depth(),
            tick_requests: default_tick_requests(),
            activation_rps: default_activation_rps(),
            max_share_percent: default_max_share_percent(),
            block_ttl: default_block_ttl(),
        }
    }
}

/// User-agent deny list, matched as a regular expression.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BlockUaConfig {
    #[serde(default)]
    pub activated: bool,
    /// Requests whose User-Agent matches are rejected with 403.
    #[serde(default)]
    pub regexp: String,
}

/// Request body size cap with an exempt-paths list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockBodyConfig {
    #[serde(default)]
    pub activated: bool,
    #[serde(default = "default_body_limit")]
    pub limit_bytes: u64,
    #[serde(default)]
    pub exempt_paths: Vec<String>,
}

fn default_body_limit() -> u64 {
    2 * 1024 * 1024 // 2 MB
}

impl Default for BlockBodyConfig {
    fn default() -> Self {
        Self {
            activated: false,
            limit_bytes: default_body_limit(),
            exempt_paths: vec![],
        }
    }
}

/// HSTS header emission for TLS transports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HstsConfig {
    #[serde(default = "default_hsts_max_age")]
    pub max_age_secs: u64,
    #[serde(default = "default_true")]
    pub include_subdomains: bool,
    #[serde(default)]
    pub preload: bool,
}

fn default_hsts_max_age() -> u64 {
    63072000 // two years
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_hsts_max_age(),
            include_subdomains: default_true(),
            preload: false,
        }
    }
}

/// Maintenance gate; when activated every request short-circuits with 503.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MaintenanceConfig {
    #[serde(default)]
    pub activated: bool,
    /// Retry hint sent to clients in the `Retry-After` header.
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
}

fn default_retry_after() -> u64 {
    300
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            activated: false,
            retry_after_secs: default_retry_after(),
        }
    }
}

/// Batching parameters for the database log daemon.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Bounded channel capacity between producers and the daemon.
    #[serde(default = "default_log_channel_capacity")]
    pub channel_capacity: usize,
    /// Records accumulated before a batch insert.
    #[serde(default = "default_log_batch_size")]
    pub batch_size: usize,
    /// A partial batch is flushed after this long.
    #[serde(with = "humantime_serde", default = "default_log_flush_interval")]
    pub flush_interval: Duration,
    /// Minimum level persisted to the database: trace, debug, info, warn, error.
    #[serde(default = "default_log_db_level")]
    pub db_level: String,
}

fn default_log_channel_capacity() -> usize {
    4096
}
fn default_log_batch_size() -> usize {
    128
}
fn default_log_flush_interval() -> Duration {
    Duration::from_millis(500)
}
fn default_log_db_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_log_channel_capacity(),
            batch_size: default_log_batch_size(),
            flush_interval: default_log_flush_interval(),
            db_level: default_log_db_level(),
        }
    }
}

/// Job queue, scheduler, and retry parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// How often the scheduler claims due jobs.
    #[serde(with = "humantime_serde", default = "default_scheduler_interval")]
    pub interval: Duration,
    /// Maximum jobs claimed per tick.
    #[serde(default = "default_claim_batch")]
    pub claim_batch: u32,
    /// A `processing` row older than this is reclaimed by the reaper.
    #[serde(with = "humantime_serde", default = "default_visibility_timeout")]
    pub visibility_timeout: Duration,
    /// Default attempts cap for enqueued jobs.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay of the exponential backoff.
    #[serde(with = "humantime_serde", default = "default_backoff_base")]
    pub backoff_base: Duration,
    /// Ceiling for the exponential backoff before jitter.
    #[serde(with = "humantime_serde", default = "default_backoff_max")]
    pub backoff_max: Duration,
    /// Default dedup cooldown for notification-style jobs.
    #[serde(with = "humantime_serde", default = "default_cooldown")]
    pub cooldown: Duration,
}

fn default_scheduler_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_claim_batch() -> u32 {
    25
}
fn default_visibility_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> Duration {
    Duration::from_secs(30)
}
fn default_backoff_max() -> Duration {
    Duration::from_secs(3600)
}
fn default_cooldown() -> Duration {
    Duration::from_secs(3600)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_scheduler_interval(),
            claim_batch: default_claim_batch(),
            visibility_timeout: default_visibility_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            cooldown: default_cooldown(),
        }
    }
}

/// Secrets consumed by the (externally provided) auth handlers.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JwtConfig {
    #[serde(default)]
    pub auth_secret: String,
    #[serde(default)]
    pub verification_secret: String,
    #[serde(default)]
    pub password_reset_secret: String,
    #[serde(default)]
    pub email_change_secret: String,
}

/// A single OAuth2 provider entry under `[oauth2.<name>]`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OAuth2Provider {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub user_info_url: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// SMTP settings for the embedding application's mailer implementation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_smtp_from")]
    pub from_address: String,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "noreply@localhost".to_string()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: default_smtp_from(),
            use_tls: default_true(),
        }
    }
}

/// Represents the full, parsed application configuration.
///
/// Handler paths resolve through [`endpoints`](Self::endpoints), so renaming an
/// endpoint is a config edit, not a code change. Each entry maps an endpoint
/// name to a `"METHOD /path"` string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Where this config was loaded from. Informational only and cleared on
    /// serialization so that round-trips compare equal.
    #[serde(skip_serializing, default)]
    pub source: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub request_log: RequestLogConfig,
    #[serde(default)]
    pub block_ip: BlockIpConfig,
    #[serde(default)]
    pub block_ua: BlockUaConfig,
    #[serde(default)]
    pub block_body: BlockBodyConfig,
    #[serde(default)]
    pub hsts: HstsConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub oauth2: BTreeMap<String, OAuth2Provider>,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

fn default_endpoints() -> BTreeMap<String, String> {
    [
        ("auth_refresh", "POST /api/auth-refresh"),
        ("auth_with_password", "POST /api/auth-with-password"),
        ("register_with_password", "POST /api/register-with-password"),
        ("auth_with_oauth2", "POST /api/auth-with-oauth2"),
        ("list_oauth2_providers", "GET /api/list-oauth2-providers"),
        ("request_verification", "POST /api/request-verification"),
        ("confirm_verification", "POST /api/confirm-verification"),
        ("request_password_reset", "POST /api/request-password-reset"),
        ("confirm_password_reset", "POST /api/confirm-password-reset"),
        ("request_email_change", "POST /api/request-email-change"),
        ("confirm_email_change", "POST /api/confirm-email-change"),
        ("list_endpoints", "GET /api/list-endpoints"),
        ("favicon", "GET /favicon.ico"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            server: ServerConfig::default(),
            endpoints: default_endpoints(),
            request_log: RequestLogConfig::default(),
            block_ip: BlockIpConfig::default(),
            block_ua: BlockUaConfig::default(),
            block_body: BlockBodyConfig::default(),
            hsts: HstsConfig::default(),
            maintenance: MaintenanceConfig::default(),
            log: LogConfig::default(),
            scheduler: SchedulerConfig::default(),
            jwt: JwtConfig::default(),
            oauth2: BTreeMap::new(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Config {
    /// Parses a TOML document into a `Config` and validates it.
    pub fn from_toml(contents: &str) -> Result<Self, MillraceError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the parsed configuration for logical consistency.
    pub fn validate(&self) -> Result<(), MillraceError> {
        fn invalid(msg: impl Into<String>) -> MillraceError {
            MillraceError::ConfigValidation(msg.into())
        }

        if self.server.port == 0 {
            return Err(invalid("server.port cannot be 0"));
        }
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host cannot be empty"));
        }
        if self.server.tls.enabled {
            if self.server.tls.cert_file.trim().is_empty() {
                return Err(invalid("server.tls.cert_file cannot be empty when TLS is enabled"));
            }
            if self.server.tls.key_file.trim().is_empty() {
                return Err(invalid("server.tls.key_file cannot be empty when TLS is enabled"));
            }
        }

        for (name, route) in &self.endpoints {
            let Some((method, path)) = route.split_once(' ') else {
                return Err(invalid(format!(
                    "endpoint '{name}' must be of the form \"METHOD /path\", got \"{route}\""
                )));
            };
            if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
                return Err(invalid(format!("endpoint '{name}' has invalid method \"{method}\"")));
            }
            if !path.starts_with('/') {
                return Err(invalid(format!("endpoint '{name}' path must start with '/'")));
            }
        }

        let b = &self.block_ip;
        if b.top_k == 0 || b.window_buckets == 0 || b.width == 0 || b.depth == 0 {
            return Err(invalid("block_ip sketch dimensions cannot be 0"));
        }
        if b.tick_requests == 0 {
            return Err(invalid("block_ip.tick_requests cannot be 0"));
        }
        if !(1..=100).contains(&b.max_share_percent) {
            return Err(invalid("block_ip.max_share_percent must be between 1 and 100"));
        }
        if b.activation_rps < 0.0 {
            return Err(invalid("block_ip.activation_rps cannot be negative"));
        }
        if b.block_ttl.is_zero() {
            return Err(invalid("block_ip.block_ttl cannot be 0"));
        }

        if self.block_ua.activated && self.block_ua.regexp.trim().is_empty() {
            return Err(invalid("block_ua.regexp cannot be empty when block_ua is activated"));
        }
        if self.block_body.activated && self.block_body.limit_bytes == 0 {
            return Err(invalid("block_body.limit_bytes cannot be 0 when block_body is activated"));
        }

        if self.log.channel_capacity == 0 {
            return Err(invalid("log.channel_capacity cannot be 0"));
        }
        if self.log.batch_size == 0 {
            return Err(invalid("log.batch_size cannot be 0"));
        }
        if self.log.flush_interval.is_zero() {
            return Err(invalid("log.flush_interval cannot be 0"));
        }
        if !matches!(
            self.log.db_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(invalid(format!(
                "log.db_level must be one of trace/debug/info/warn/error, got \"{}\"",
                self.log.db_level
            )));
        }

        let s = &self.scheduler;
        if s.interval.is_zero() {
            return Err(invalid("scheduler.interval cannot be 0"));
        }
        if s.claim_batch == 0 {
            return Err(invalid("scheduler.claim_batch cannot be 0"));
        }
        if s.max_attempts == 0 {
            return Err(invalid("scheduler.max_attempts cannot be 0"));
        }
        if s.backoff_base.is_zero() {
            return Err(invalid("scheduler.backoff_base cannot be 0"));
        }
        if s.backoff_max < s.backoff_base {
            return Err(invalid("scheduler.backoff_max cannot be below scheduler.backoff_base"));
        }
        if s.cooldown.as_secs() == 0 {
            return Err(invalid("scheduler.cooldown must be at least one second"));
        }
        if s.visibility_timeout.is_zero() {
            return Err(invalid("scheduler.visibility_timeout cannot be 0"));
        }

        Ok(())
    }

    /// Serializes the configuration back to TOML. The `source` field is
    /// skipped, so `from_toml(to_toml(c))` compares equal to `c` with
    /// `source` cleared.
    pub fn to_toml(&self) -> Result<String, MillraceError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
