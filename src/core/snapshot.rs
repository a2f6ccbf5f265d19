// src/core/snapshot.rs

//! The immutable, validated configuration view published by the provider.

use crate::config::Config;
use crate::core::MillraceError;
use axum::http::Method;
use regex::Regex;
use std::collections::HashMap;

/// A validated configuration snapshot plus the artifacts compiled from it.
///
/// Snapshots are immutable once published. Readers obtain one through the
/// [`ConfigProvider`](crate::core::provider::ConfigProvider) and must re-read
/// between requests; a captured snapshot stays stable but goes stale after a
/// reload.
#[derive(Debug)]
pub struct Snapshot {
    pub config: Config,
    /// Compiled user-agent deny pattern. `None` when `block_ua` is inactive
    /// or the pattern is empty.
    pub ua_regex: Option<Regex>,
    /// Reverse endpoint map: `(method, path)` to endpoint name.
    routes: HashMap<(Method, String), String>,
}

impl Snapshot {
    /// Builds a snapshot from a parsed configuration: validates it, compiles
    /// the user-agent pattern, and freezes the endpoint lookup map.
    pub fn build(config: Config) -> Result<Self, MillraceError> {
        config.validate()?;

        let ua_regex = if config.block_ua.activated && !config.block_ua.regexp.trim().is_empty() {
            Some(Regex::new(&config.block_ua.regexp)?)
        } else {
            None
        };

        let mut routes = HashMap::with_capacity(config.endpoints.len());
        for (name, route) in &config.endpoints {
            // Shape already checked by validate().
            let (method, path) = route
                .split_once(' ')
                .ok_or_else(|| MillraceError::ConfigValidation(format!("bad endpoint '{name}'")))?;
            let method = Method::from_bytes(method.as_bytes())
                .map_err(|_| MillraceError::ConfigValidation(format!("bad method in '{name}'")))?;
            routes.insert((method, path.to_string()), name.clone());
        }

        Ok(Self {
            config,
            ua_regex,
            routes,
        })
    }

    /// Resolves a request method and path to the configured endpoint name.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&str> {
        self.routes
            .get(&(method.clone(), path.to_string()))
            .map(String::as_str)
    }
}
