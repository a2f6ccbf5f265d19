// src/jobs/mod.rs

//! Built-in job handlers and the contracts they depend on.

pub mod email_verification;
pub mod mailer;

pub use email_verification::{
    EmailVerificationHandler, JOB_TYPE_EMAIL_VERIFICATION, verification_job,
};
pub use mailer::{LogMailer, Mailer};
