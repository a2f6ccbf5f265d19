use chrono::Utc;
use millrace::db::{self, DbOptions};
use millrace::logging::{LogBridge, LogRecord};
use millrace::store::LogStore;
use millrace::tasks::LogDaemon;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::prelude::*;

async fn setup() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let options = DbOptions {
        path: dir.path().join("logs.db").to_string_lossy().into_owned(),
        ..DbOptions::default()
    };
    let pool = db::connect(&options).await.unwrap();
    (dir, pool)
}

fn record(message: &str) -> LogRecord {
    LogRecord {
        level: 2,
        message: message.to_string(),
        fields: b"{}".to_vec(),
        created_at: Utc::now(),
    }
}

async fn persisted_messages(pool: &SqlitePool) -> Vec<String> {
    sqlx::query("SELECT message FROM logs ORDER BY id ASC")
        .fetch_all(pool)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get("message"))
        .collect()
}

#[tokio::test]
async fn test_ping_answers_on_an_open_store() {
    let (_dir, pool) = setup().await;
    LogStore::new(pool).ping().await.unwrap();
}

#[tokio::test]
async fn test_daemon_drains_everything_on_shutdown() {
    let (_dir, pool) = setup().await;
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, _) = broadcast::channel(1);

    let daemon = LogDaemon::new(
        LogStore::new(pool.clone()),
        rx,
        LogBridge::new(),
        10,
        Duration::from_millis(200),
    );
    let handle = tokio::spawn(daemon.run(shutdown_tx.subscribe()));

    for i in 0..25 {
        tx.send(record(&format!("record {i}"))).await.unwrap();
    }
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let messages = persisted_messages(&pool).await;
    assert_eq!(messages.len(), 25);
    // Production order survives batching.
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message, &format!("record {i}"));
    }
}

#[tokio::test]
async fn test_daemon_flushes_when_batch_fills() {
    let (_dir, pool) = setup().await;
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, _) = broadcast::channel(1);

    // Long flush interval: only the size threshold can trigger the insert.
    let daemon = LogDaemon::new(
        LogStore::new(pool.clone()),
        rx,
        LogBridge::new(),
        5,
        Duration::from_secs(60),
    );
    let handle = tokio::spawn(daemon.run(shutdown_tx.subscribe()));

    for i in 0..5 {
        tx.send(record(&format!("batched {i}"))).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(persisted_messages(&pool).await.len(), 5);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_daemon_flushes_partial_batch_on_interval() {
    let (_dir, pool) = setup().await;
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, _) = broadcast::channel(1);

    let daemon = LogDaemon::new(
        LogStore::new(pool.clone()),
        rx,
        LogBridge::new(),
        100,
        Duration::from_millis(100),
    );
    let handle = tokio::spawn(daemon.run(shutdown_tx.subscribe()));

    tx.send(record("lonely")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(persisted_messages(&pool).await, vec!["lonely".to_string()]);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_daemon_exits_when_channel_closes() {
    let (_dir, pool) = setup().await;
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, _) = broadcast::channel(1);

    let daemon = LogDaemon::new(
        LogStore::new(pool.clone()),
        rx,
        LogBridge::new(),
        100,
        Duration::from_secs(60),
    );
    let handle = tokio::spawn(daemon.run(shutdown_tx.subscribe()));

    tx.send(record("last words")).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(persisted_messages(&pool).await, vec!["last words".to_string()]);
}

#[tokio::test]
async fn test_bridge_drops_newest_when_channel_is_full() {
    let (tx, mut rx) = mpsc::channel(2);
    let bridge = LogBridge::new();
    bridge.install(tx, 0);

    let subscriber = tracing_subscriber::registry().with(bridge.clone());
    tracing::subscriber::with_default(subscriber, || {
        for i in 0..5 {
            tracing::info!(sequence = i, "bridge event");
        }
    });

    assert_eq!(bridge.dropped(), 3);
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    assert_eq!(bridge.take_dropped(), 3);
    assert_eq!(bridge.dropped(), 0);
}

#[tokio::test]
async fn test_bridge_respects_min_level_and_skips_sqlx() {
    let (tx, mut rx) = mpsc::channel(16);
    let bridge = LogBridge::new();
    // warn and above.
    bridge.install(tx, 3);

    let subscriber = tracing_subscriber::registry().with(bridge.clone());
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("below threshold");
        tracing::warn!("kept");
        tracing::error!(target: "sqlx::query", "statement noise");
    });

    let record = rx.try_recv().unwrap();
    assert_eq!(record.message, "kept");
    assert_eq!(record.level, 3);
    assert!(rx.try_recv().is_err());
}
