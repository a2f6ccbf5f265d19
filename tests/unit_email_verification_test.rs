use async_trait::async_trait;
use chrono::Utc;
use millrace::core::MillraceError;
use millrace::jobs::{
    EmailVerificationHandler, JOB_TYPE_EMAIL_VERIFICATION, Mailer, verification_job,
};
use millrace::queue::{Job, JobError, JobHandler, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct RecordingMailer {
    sent: parking_lot::Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MillraceError> {
        if self.fail {
            return Err(MillraceError::Mailer("smtp unreachable".to_string()));
        }
        self.sent.lock().push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

fn job_with_payload(payload: &[u8]) -> Job {
    let now = Utc::now();
    Job {
        id: 1,
        job_type: JOB_TYPE_EMAIL_VERIFICATION.to_string(),
        payload: payload.to_vec(),
        payload_extra: Vec::new(),
        cooldown_bucket: 0,
        status: JobStatus::Processing,
        attempts: 0,
        max_attempts: 3,
        created_at: now,
        updated_at: now,
        scheduled_for: now,
        locked_at: Some(now),
        completed_at: None,
        last_error: None,
        recurrent: false,
        interval: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_delivers_through_mailer() {
    let mailer = Arc::new(RecordingMailer {
        sent: parking_lot::Mutex::new(Vec::new()),
        fail: false,
    });
    let handler = EmailVerificationHandler::new(mailer.clone());

    handler
        .handle(&job_with_payload(b"user@example.com"), CancellationToken::new())
        .await
        .unwrap();

    let sent = mailer.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "user@example.com");
}

#[tokio::test]
async fn test_malformed_payload_is_permanent() {
    let mailer = Arc::new(RecordingMailer {
        sent: parking_lot::Mutex::new(Vec::new()),
        fail: false,
    });
    let handler = EmailVerificationHandler::new(mailer);

    let err = handler
        .handle(&job_with_payload(b"\xff\xfe"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Permanent(_)));

    let handler_err = EmailVerificationHandler::new(Arc::new(RecordingMailer {
        sent: parking_lot::Mutex::new(Vec::new()),
        fail: false,
    }))
    .handle(&job_with_payload(b"not-an-address"), CancellationToken::new())
    .await
    .unwrap_err();
    assert!(matches!(handler_err, JobError::Permanent(_)));
}

#[tokio::test]
async fn test_mailer_failure_is_retryable() {
    let mailer = Arc::new(RecordingMailer {
        sent: parking_lot::Mutex::new(Vec::new()),
        fail: true,
    });
    let handler = EmailVerificationHandler::new(mailer);

    let err = handler
        .handle(&job_with_payload(b"user@example.com"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Retryable(_)));
}

#[tokio::test]
async fn test_cancellation_defers_delivery() {
    let mailer = Arc::new(RecordingMailer {
        sent: parking_lot::Mutex::new(Vec::new()),
        fail: false,
    });
    let handler = EmailVerificationHandler::new(mailer.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = handler
        .handle(&job_with_payload(b"user@example.com"), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Retryable(_)));
    assert!(mailer.sent.lock().is_empty());
}

#[test]
fn test_verification_job_shape() {
    let job = verification_job("user@example.com", Duration::from_secs(900), 5);
    assert_eq!(job.job_type, JOB_TYPE_EMAIL_VERIFICATION);
    assert_eq!(job.payload, b"user@example.com");
    assert_eq!(job.cooldown, Duration::from_secs(900));
    assert_eq!(job.max_attempts, 5);
    assert!(!job.recurrent);
}
