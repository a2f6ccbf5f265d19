// src/jobs/email_verification.rs

//! The built-in `email_verification` job: handlers enqueue one row per
//! address per cooldown bucket, and the executor delivers through the
//! configured mailer.

use crate::jobs::mailer::Mailer;
use crate::queue::{Job, JobError, JobHandler, NewJob};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const JOB_TYPE_EMAIL_VERIFICATION: &str = "email_verification";

/// Builds the queue entry for a verification request. The address is the
/// unique payload, so repeat requests within one cooldown window collapse
/// into a single job.
pub fn verification_job(email: &str, cooldown: Duration, max_attempts: u32) -> NewJob {
    NewJob::new(JOB_TYPE_EMAIL_VERIFICATION, email.as_bytes().to_vec())
        .with_cooldown(cooldown)
        .with_max_attempts(max_attempts)
}

pub struct EmailVerificationHandler {
    mailer: Arc<dyn Mailer>,
}

impl EmailVerificationHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl JobHandler for EmailVerificationHandler {
    async fn handle(&self, job: &Job, cancel: CancellationToken) -> Result<(), JobError> {
        if cancel.is_cancelled() {
            return Err(JobError::Retryable("cancelled before delivery".to_string()));
        }

        let email = std::str::from_utf8(&job.payload)
            .map_err(|_| JobError::Permanent("payload is not valid UTF-8".to_string()))?;
        if !email.contains('@') {
            return Err(JobError::Permanent(format!("'{email}' is not an email address")));
        }

        let body = format!(
            "Hello,\n\nplease confirm your address by following the verification \
             link we sent to {email}.\n"
        );
        self.mailer
            .send(email, "Verify your email address", &body)
            .await
            .map_err(|e| JobError::Retryable(e.to_string()))
    }
}
