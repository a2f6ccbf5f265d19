// src/logging.rs

//! Bridges `tracing` events into the database log pipeline.
//!
//! The bridge is registered as a subscriber layer at process start, before the
//! store (and therefore the log channel) exists; `install` wires the channel in
//! once the server has read its configuration. Offers that would block are
//! dropped and counted so request latency never depends on the database.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// One structured record bound for the `logs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: u8,
    pub message: String,
    /// JSON-encoded event fields, stored as opaque bytes.
    pub fields: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Numeric levels as persisted: trace=0, debug=1, info=2, warn=3, error=4.
pub fn level_to_u8(level: &Level) -> u8 {
    match *level {
        Level::TRACE => 0,
        Level::DEBUG => 1,
        Level::INFO => 2,
        Level::WARN => 3,
        Level::ERROR => 4,
    }
}

pub fn level_from_str(name: &str) -> u8 {
    match name {
        "trace" => 0,
        "debug" => 1,
        "warn" => 3,
        "error" => 4,
        _ => 2,
    }
}

struct BridgeInner {
    tx: OnceLock<mpsc::Sender<LogRecord>>,
    min_level: AtomicU8,
    dropped: AtomicU64,
}

/// The subscriber layer half of the log pipeline. Cloning shares the channel.
#[derive(Clone)]
pub struct LogBridge {
    inner: Arc<BridgeInner>,
}

impl Default for LogBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBridge {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                tx: OnceLock::new(),
                min_level: AtomicU8::new(2),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Connects the bridge to the daemon's channel. Events observed before
    /// this call only reach the terminal subscriber layers.
    pub fn install(&self, tx: mpsc::Sender<LogRecord>, min_level: u8) {
        self.inner.min_level.store(min_level, Ordering::Relaxed);
        if self.inner.tx.set(tx).is_err() {
            tracing::warn!("log bridge installed twice; keeping the first channel");
        }
    }

    /// Records dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Swaps the dropped counter back to zero, returning the old value.
    pub fn take_dropped(&self) -> u64 {
        self.inner.dropped.swap(0, Ordering::Relaxed)
    }

    fn offer(&self, record: LogRecord) {
        if let Some(tx) = self.inner.tx.get()
            && tx.try_send(record).is_err()
        {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogBridge {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // The store's own statement logging must not feed back into the
        // channel it is draining.
        if metadata.target().starts_with("sqlx") {
            return;
        }
        let level = level_to_u8(metadata.level());
        if level < self.inner.min_level.load(Ordering::Relaxed) {
            return;
        }

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);
        let fields = if visitor.fields.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&Value::Object(visitor.fields)).unwrap_or_default()
        };

        self.offer(LogRecord {
            level,
            message: visitor.message,
            fields,
            created_at: Utc::now(),
        });
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Map<String, Value>,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }
}
