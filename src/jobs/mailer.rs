// src/jobs/mailer.rs

//! The outbound mail contract. Real delivery is the embedding application's
//! concern; the framework only defines the seam and a logging default so the
//! verification flow works out of the box.

use crate::core::MillraceError;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MillraceError>;
}

/// Default mailer: records the message instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MillraceError> {
        info!(target: "millrace::mailer", to = %to, subject = %subject, "Mail delivery (log mailer).");
        Ok(())
    }
}
