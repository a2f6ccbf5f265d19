use chrono::Utc;
use millrace::core::MillraceError;
use millrace::db::{self, DbOptions};
use millrace::queue::{BackoffPolicy, JobStatus, JobStore, NewJob};
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqlitePool, JobStore) {
    let dir = tempfile::tempdir().unwrap();
    let options = DbOptions {
        path: dir.path().join("queue.db").to_string_lossy().into_owned(),
        ..DbOptions::default()
    };
    let pool = db::connect(&options).await.unwrap();
    let store = JobStore::new(pool.clone());
    (dir, pool, store)
}

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_secs(30),
        max: Duration::from_secs(3600),
    }
}

#[tokio::test]
async fn test_enqueue_and_claim() {
    let (_dir, _pool, store) = setup().await;
    let id = store
        .enqueue(
            NewJob::new("email_verification", b"user@example.com".to_vec())
                .with_extra(b"{\"locale\":\"en\"}".to_vec()),
        )
        .await
        .unwrap();

    let claimed = store.claim(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let job = &claimed[0];
    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.payload, b"user@example.com");
    assert_eq!(job.payload_extra, b"{\"locale\":\"en\"}");
    assert!(job.locked_at.is_some());

    // Nothing left to claim.
    assert!(store.claim(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueue_rejects_empty_job_type() {
    let (_dir, _pool, store) = setup().await;
    let err = store
        .enqueue(NewJob::new("  ", b"user@example.com".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, MillraceError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_enqueue_same_cooldown_bucket_conflicts() {
    let (_dir, _pool, store) = setup().await;
    let job = NewJob::new("email_verification", b"user@example.com".to_vec())
        .with_cooldown(Duration::from_secs(3600));

    store.enqueue(job.clone()).await.unwrap();
    let err = store.enqueue(job).await.unwrap_err();
    assert!(matches!(err, MillraceError::AlreadyQueued));
}

#[tokio::test]
async fn test_different_payloads_do_not_conflict() {
    let (_dir, _pool, store) = setup().await;
    store
        .enqueue(NewJob::new("email_verification", b"a@example.com".to_vec()))
        .await
        .unwrap();
    store
        .enqueue(NewJob::new("email_verification", b"b@example.com".to_vec()))
        .await
        .unwrap();
    assert_eq!(store.claim(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_uniqueness_releases_after_completion() {
    let (_dir, _pool, store) = setup().await;
    let job = NewJob::new("email_verification", b"user@example.com".to_vec());

    let id = store.enqueue(job.clone()).await.unwrap();
    store.claim(1).await.unwrap();
    store.complete(id).await.unwrap();

    // The partial index only covers pending and processing rows.
    store.enqueue(job).await.unwrap();
}

#[tokio::test]
async fn test_claim_respects_scheduled_for_order() {
    let (_dir, _pool, store) = setup().await;
    let now = Utc::now();
    let later = store
        .enqueue(
            NewJob::new("email_verification", b"later@example.com".to_vec())
                .scheduled_at(now - chrono::Duration::seconds(10)),
        )
        .await
        .unwrap();
    let earlier = store
        .enqueue(
            NewJob::new("email_verification", b"earlier@example.com".to_vec())
                .scheduled_at(now - chrono::Duration::seconds(60)),
        )
        .await
        .unwrap();

    let claimed = store.claim(1).await.unwrap();
    assert_eq!(claimed[0].id, earlier);

    let claimed = store.claim(1).await.unwrap();
    assert_eq!(claimed[0].id, later);
}

#[tokio::test]
async fn test_claim_skips_future_jobs() {
    let (_dir, _pool, store) = setup().await;
    store
        .enqueue(
            NewJob::new("email_verification", b"user@example.com".to_vec())
                .scheduled_at(Utc::now() + chrono::Duration::hours(1)),
        )
        .await
        .unwrap();
    assert!(store.claim(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fail_applies_exponential_backoff() {
    let (_dir, _pool, store) = setup().await;
    let id = store
        .enqueue(
            NewJob::new("email_verification", b"user@example.com".to_vec()).with_max_attempts(3),
        )
        .await
        .unwrap();
    store.claim(1).await.unwrap();

    let before = Utc::now();
    store.fail(id, "smtp timeout", &policy()).await.unwrap();

    let job = store.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("smtp timeout"));
    assert!(job.locked_at.is_none());
    // base * 2^(attempts-1) = 30s, before jitter.
    let floor = before + chrono::Duration::seconds(30);
    assert!(
        job.scheduled_for >= floor - chrono::Duration::seconds(1),
        "{} < {}",
        job.scheduled_for,
        floor
    );
}

#[tokio::test]
async fn test_fail_exhausts_attempts() {
    let (_dir, _pool, store) = setup().await;
    let id = store
        .enqueue(
            NewJob::new("email_verification", b"user@example.com".to_vec()).with_max_attempts(1),
        )
        .await
        .unwrap();
    store.claim(1).await.unwrap();
    store.fail(id, "smtp timeout", &policy()).await.unwrap();

    let job = store.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.attempts <= job.max_attempts);
}

#[tokio::test]
async fn test_fail_permanent_ignores_remaining_attempts() {
    let (_dir, _pool, store) = setup().await;
    let id = store
        .enqueue(
            NewJob::new("email_verification", b"not-an-email".to_vec()).with_max_attempts(5),
        )
        .await
        .unwrap();
    store.claim(1).await.unwrap();
    store.fail_permanent(id, "malformed address").await.unwrap();

    let job = store.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.attempts <= job.max_attempts);
    assert_eq!(job.last_error.as_deref(), Some("malformed address"));
}

#[tokio::test]
async fn test_complete_is_idempotent() {
    let (_dir, _pool, store) = setup().await;
    let id = store
        .enqueue(NewJob::new("email_verification", b"user@example.com".to_vec()))
        .await
        .unwrap();
    store.claim(1).await.unwrap();
    store.complete(id).await.unwrap();

    let first = store.get(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    store.complete(id).await.unwrap();
    let second = store.get(id).await.unwrap();

    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(first.completed_at, second.completed_at);
}

#[tokio::test]
async fn test_recurrent_completion_reenqueues() {
    let (_dir, _pool, store) = setup().await;
    let id = store
        .enqueue(
            NewJob::new("metrics_rollup", Vec::new()).recurring(Duration::from_secs(60)),
        )
        .await
        .unwrap();
    store.claim(1).await.unwrap();

    let before = Utc::now();
    store.complete(id).await.unwrap();

    // The completed instance stays; a fresh pending row exists one interval
    // out.
    let completed = store.get(id).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);

    let next = store.get(id + 1).await.unwrap();
    assert_eq!(next.status, JobStatus::Pending);
    assert!(next.recurrent);
    assert!(next.scheduled_for >= before + chrono::Duration::seconds(59));
}

#[tokio::test]
async fn test_reap_stuck_processing_rows() {
    let (_dir, pool, store) = setup().await;
    let id = store
        .enqueue(NewJob::new("email_verification", b"user@example.com".to_vec()))
        .await
        .unwrap();
    store.claim(1).await.unwrap();

    // Nothing is stuck yet.
    assert_eq!(
        store
            .reap_stuck(Duration::from_secs(60), &policy())
            .await
            .unwrap(),
        0
    );

    // Backdate the lock far past the visibility timeout.
    let stale = db::encode_ts(Utc::now() - chrono::Duration::seconds(600));
    sqlx::query("UPDATE job_queue SET locked_at = ? WHERE id = ?")
        .bind(stale)
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let reclaimed = store
        .reap_stuck(Duration::from_secs(60), &policy())
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    let job = store.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(
        job.last_error.as_deref(),
        Some("reclaimed after visibility timeout")
    );
}
