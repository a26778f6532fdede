//! Completion backends and the fallback chain.
//!
//! A backend turns a [`Prompt`] into reply text. The [`BackendChain`] tries
//! its backends in order for each region, bounding every call by that
//! backend's timeout, and stops at the first reply that parses into usable
//! replacement text.

pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::conflict::RegionOutcome;
use crate::errors::BackendError;
use crate::prompt::Prompt;
use crate::response::parse_reply;

pub use openai::HttpBackend;

/// Something that completes prompts.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Name used in logs and failure reasons.
    fn name(&self) -> &str;

    /// Upper bound on one `complete` call.
    fn timeout(&self) -> Duration;

    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError>;
}

/// Ordered list of backends, tried until one produces a usable reply.
pub struct BackendChain {
    backends: Vec<Box<dyn CompletionBackend>>,
}

impl BackendChain {
    pub fn new(backends: Vec<Box<dyn CompletionBackend>>) -> Self {
        Self { backends }
    }

    /// Build HTTP backends for every configured entry, in order.
    ///
    /// Expects `config` to have had its env vars resolved already.
    pub fn from_config(config: &DriverConfig) -> Result<Self, BackendError> {
        let mut backends: Vec<Box<dyn CompletionBackend>> = Vec::with_capacity(config.backends.len());
        for backend in &config.backends {
            backends.push(Box::new(HttpBackend::new(backend)?));
        }
        info!(backends = backends.len(), "backend chain ready");
        Ok(Self::new(backends))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Names in the order they are tried.
    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Resolve one region's prompt.
    ///
    /// Every failure (transport, timeout, API error, unusable reply) moves on
    /// to the next backend. When all of them fail the region is unresolved
    /// and the reason lists each backend's failure.
    pub async fn resolve(&self, prompt: &Prompt, marker_size: usize) -> RegionOutcome {
        let mut failures = Vec::new();

        for backend in &self.backends {
            let limit = backend.timeout();
            let attempt = match tokio::time::timeout(limit, backend.complete(prompt)).await {
                Ok(Ok(reply)) => parse_reply(&reply, marker_size).map(|parsed| parsed.code),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(BackendError::Timeout {
                    backend: backend.name().to_string(),
                    secs: limit.as_secs(),
                }),
            };

            match attempt {
                Ok(code) => {
                    debug!(backend = backend.name(), bytes = code.len(), "region resolved");
                    return RegionOutcome::Resolved(code);
                }
                Err(e) => {
                    let unavailable = e.is_unavailable();
                    warn!(backend = backend.name(), unavailable, error = %e, "backend attempt failed");
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no backends configured".to_string());
        }
        RegionOutcome::Unresolved(failures.join("; "))
    }
}
