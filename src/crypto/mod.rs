// src/crypto/mod.rs

//! Asymmetric sealing of at-rest configuration payloads.

pub mod sealed;

pub use sealed::{Identity, Recipient, open, seal};
