// src/store/mod.rs

//! Persistence surfaces over the embedded store: configuration records and
//! batched logs. Each consumer depends only on the operation set it needs.

pub mod config_store;
pub mod log_store;

pub use config_store::{ConfigStore, DEFAULT_SCOPE, GenerationInfo, reload};
pub use log_store::LogStore;
