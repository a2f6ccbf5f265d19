use millrace::config::Config;
use millrace::core::{ConfigProvider, MillraceError, Snapshot};
use millrace::crypto::Identity;
use millrace::db::{self, DbOptions};
use millrace::store::{ConfigStore, DEFAULT_SCOPE, reload};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqlitePool, ConfigStore, Identity) {
    let dir = tempfile::tempdir().unwrap();
    let options = DbOptions {
        path: dir.path().join("config.db").to_string_lossy().into_owned(),
        ..DbOptions::default()
    };
    let pool = db::connect(&options).await.unwrap();
    let identity = Identity::generate();
    let store = ConfigStore::new(pool.clone(), identity.clone());
    (dir, pool, store, identity)
}

#[tokio::test]
async fn test_save_and_latest_round_trip() {
    let (_dir, _pool, store, _identity) = setup().await;
    store
        .save(DEFAULT_SCOPE, b"a = 1", "toml", "first")
        .await
        .unwrap();
    store
        .save(DEFAULT_SCOPE, b"a = 2", "toml", "second")
        .await
        .unwrap();

    assert_eq!(store.latest(DEFAULT_SCOPE).await.unwrap(), b"a = 2");
}

#[tokio::test]
async fn test_generations_strictly_increase() {
    let (_dir, _pool, store, _identity) = setup().await;
    let g1 = store.save(DEFAULT_SCOPE, b"a = 1", "toml", "").await.unwrap();
    let g2 = store.save(DEFAULT_SCOPE, b"a = 2", "toml", "").await.unwrap();
    let g3 = store.save(DEFAULT_SCOPE, b"a = 3", "toml", "").await.unwrap();
    assert!(g1 < g2 && g2 < g3);

    let listed = store.generations(DEFAULT_SCOPE).await.unwrap();
    assert_eq!(listed.len(), 3);
    // Newest first, and the maximum generation is the latest.
    assert_eq!(listed[0].generation, g3);
    let (latest, _) = store.get(DEFAULT_SCOPE, 0).await.unwrap();
    let (by_id, _) = store.get(DEFAULT_SCOPE, g3).await.unwrap();
    assert_eq!(latest, by_id);
}

#[tokio::test]
async fn test_get_specific_generation() {
    let (_dir, _pool, store, _identity) = setup().await;
    let g1 = store.save(DEFAULT_SCOPE, b"a = 1", "toml", "").await.unwrap();
    store.save(DEFAULT_SCOPE, b"a = 2", "toml", "").await.unwrap();

    let (bytes, format) = store.get(DEFAULT_SCOPE, g1).await.unwrap();
    assert_eq!(bytes, b"a = 1");
    assert_eq!(format, "toml");
}

#[tokio::test]
async fn test_missing_generation_and_scope_errors() {
    let (_dir, _pool, store, _identity) = setup().await;
    assert!(matches!(
        store.latest(DEFAULT_SCOPE).await.unwrap_err(),
        MillraceError::ConfigNotFound(_)
    ));

    store.save(DEFAULT_SCOPE, b"a = 1", "toml", "").await.unwrap();
    assert!(matches!(
        store.get(DEFAULT_SCOPE, 999).await.unwrap_err(),
        MillraceError::GenerationNotFound { .. }
    ));
}

#[tokio::test]
async fn test_scopes_enumeration() {
    let (_dir, _pool, store, _identity) = setup().await;
    store.save("application", b"a = 1", "toml", "").await.unwrap();
    store.save("warden", b"b = 1", "toml", "").await.unwrap();
    store.save("application", b"a = 2", "toml", "").await.unwrap();

    assert_eq!(store.scopes().await.unwrap(), vec!["application", "warden"]);
}

#[tokio::test]
async fn test_wrong_identity_cannot_decrypt() {
    let (_dir, pool, store, _identity) = setup().await;
    store.save(DEFAULT_SCOPE, b"a = 1", "toml", "").await.unwrap();

    let imposter = ConfigStore::new(pool, Identity::generate());
    assert!(matches!(
        imposter.latest(DEFAULT_SCOPE).await.unwrap_err(),
        MillraceError::Sealed
    ));
}

#[tokio::test]
async fn test_reload_publishes_new_snapshot() {
    let (_dir, _pool, store, _identity) = setup().await;
    let provider = ConfigProvider::new(Snapshot::build(Config::default()).unwrap());

    let mut config = Config::default();
    config
        .endpoints
        .insert("list_endpoints".to_string(), "GET /api/v2/endpoints".to_string());
    store
        .save(DEFAULT_SCOPE, config.to_toml().unwrap().as_bytes(), "toml", "")
        .await
        .unwrap();

    // A snapshot captured before the reload stays stable.
    let stale = provider.get();

    reload(&store, &provider).await.unwrap();

    let fresh = provider.get();
    assert_eq!(
        fresh.resolve(&axum::http::Method::GET, "/api/v2/endpoints"),
        Some("list_endpoints")
    );
    assert_eq!(
        stale.resolve(&axum::http::Method::GET, "/api/list-endpoints"),
        Some("list_endpoints")
    );
}

#[tokio::test]
async fn test_failed_reload_keeps_current_snapshot() {
    let (_dir, _pool, store, _identity) = setup().await;
    let provider = ConfigProvider::new(Snapshot::build(Config::default()).unwrap());

    let mut config = Config::default();
    config
        .endpoints
        .insert("list_endpoints".to_string(), "GET /api/v2/endpoints".to_string());
    store
        .save(DEFAULT_SCOPE, config.to_toml().unwrap().as_bytes(), "toml", "")
        .await
        .unwrap();
    reload(&store, &provider).await.unwrap();

    // Parse failure: reload reports and mutates nothing.
    store
        .save(DEFAULT_SCOPE, b"not [valid toml", "toml", "")
        .await
        .unwrap();
    assert!(matches!(
        reload(&store, &provider).await.unwrap_err(),
        MillraceError::ConfigParse(_)
    ));
    assert_eq!(
        provider.get().resolve(&axum::http::Method::GET, "/api/v2/endpoints"),
        Some("list_endpoints")
    );

    // Validation failure behaves the same.
    store
        .save(DEFAULT_SCOPE, b"[server]\nport = 0", "toml", "")
        .await
        .unwrap();
    assert!(matches!(
        reload(&store, &provider).await.unwrap_err(),
        MillraceError::ConfigValidation(_)
    ));
    assert_eq!(
        provider.get().resolve(&axum::http::Method::GET, "/api/v2/endpoints"),
        Some("list_endpoints")
    );
}
