// src/core/mod.rs

//! The central module containing the core logic and data structures of Millrace.

pub mod cache;
pub mod errors;
pub mod provider;
pub mod snapshot;
pub mod state;
pub mod topk;

pub use errors::MillraceError;
pub use provider::ConfigProvider;
pub use snapshot::Snapshot;
