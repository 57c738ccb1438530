//! Core types for talking to the local inference runtime (Ollama).
//!
//! - [`RuntimeEndpoint`]: validated base URL of the runtime.
//! - [`ModelName`] / [`ModelSet`]: model identifiers and the required set.
//! - [`ModelRuntime`]: the seam the [`lifecycle`](crate::lifecycle)
//!   coordinator drives. [`OllamaRuntime`] is the HTTP implementation built
//!   on the free functions in [`probe`](crate::probe),
//!   [`catalog`](crate::catalog) and [`pull`](crate::pull).
//!
//! # Wire Protocol
//!
//! | Method | Path | Used by |
//! |--------|------|---------|
//! | `GET`  | `/api/version` | probe |
//! | `GET`  | `/api/tags` | catalog |
//! | `POST` | `/api/pull` | puller (NDJSON stream) |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::{self, CatalogError};
use crate::config::Settings;
use crate::probe;
use crate::progress::PullProgressReporter;
use crate::pull::{self, PullError, PullLimits};

/// Errors raised while building a [`RuntimeEndpoint`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("runtime URL must not be empty")]
    Empty,
    #[error("runtime URL must start with http:// or https://, got '{0}'")]
    UnsupportedScheme(String),
}

/// Base URL (scheme, host, port) of the inference runtime.
///
/// The trailing slash is stripped so API paths can be appended verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    base: String,
}

impl RuntimeEndpoint {
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::Empty);
        }
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(EndpointError::UnsupportedScheme(trimmed.to_string()));
        }
        Ok(Self {
            base: trimmed.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL without a trailing slash.
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Join an absolute API path (e.g. `/api/tags`) onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl fmt::Display for RuntimeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// Opaque model identifier such as `"qwen2.5:7b-instruct"`.
///
/// Equality is exact string comparison; tags are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModelName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The models that must be installed before the service counts as ready.
///
/// Keeps the order the names were supplied in and drops duplicates. Built
/// once and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSet {
    names: Vec<ModelName>,
}

impl ModelSet {
    pub fn iter(&self) -> impl Iterator<Item = &ModelName> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &ModelName) -> bool {
        self.names.contains(name)
    }

    /// Requested names absent from `ensured`, in request order.
    pub fn missing(&self, ensured: &BTreeSet<ModelName>) -> Vec<ModelName> {
        self.names
            .iter()
            .filter(|name| !ensured.contains(*name))
            .cloned()
            .collect()
    }
}

/// `[a, b]` rendering for user-facing messages.
pub fn format_model_list<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a ModelName>,
{
    let joined: Vec<&str> = names.into_iter().map(ModelName::as_str).collect();
    format!("[{}]", joined.join(", "))
}

impl<N: Into<ModelName>> FromIterator<N> for ModelSet {
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        let mut names: Vec<ModelName> = Vec::new();
        for name in iter {
            let name = name.into();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Self { names }
    }
}

/// Operations the lifecycle coordinator needs from a running runtime.
///
/// Implementations must never let transport errors escape as panics; every
/// failure is reported through the return value.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// The endpoint this runtime talks to (used for logging).
    fn endpoint(&self) -> &RuntimeEndpoint;

    /// Single reachability probe. `false` on any failure.
    async fn is_up(&self) -> bool;

    /// Installed model names in server order.
    async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError>;

    /// Pull `model`, reporting progress. `Ok` only once the runtime has
    /// emitted its terminal `success` status.
    async fn pull(
        &self,
        model: &ModelName,
        progress: &dyn PullProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(), PullError>;
}

/// HTTP client for an Ollama server.
#[derive(Clone)]
pub struct OllamaRuntime {
    client: reqwest::Client,
    endpoint: RuntimeEndpoint,
    probe_timeout: Duration,
    catalog_timeout: Duration,
    pull_limits: PullLimits,
}

impl OllamaRuntime {
    pub fn new(endpoint: RuntimeEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            probe_timeout: probe::DEFAULT_PROBE_TIMEOUT,
            catalog_timeout: catalog::DEFAULT_CATALOG_TIMEOUT,
            pull_limits: PullLimits::default(),
        }
    }

    /// Build a runtime client with the timeouts from `settings`, pointed at
    /// `endpoint` (which may differ from `settings.ollama_base_url` when the
    /// CLI passes `--host`).
    pub fn from_settings(endpoint: RuntimeEndpoint, settings: &Settings) -> Self {
        Self::new(endpoint)
            .with_probe_timeout(settings.probe_timeout())
            .with_catalog_timeout(settings.catalog_timeout())
            .with_pull_limits(settings.pull_limits())
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_catalog_timeout(mut self, timeout: Duration) -> Self {
        self.catalog_timeout = timeout;
        self
    }

    pub fn with_pull_limits(mut self, limits: PullLimits) -> Self {
        self.pull_limits = limits;
        self
    }
}

#[async_trait]
impl ModelRuntime for OllamaRuntime {
    fn endpoint(&self) -> &RuntimeEndpoint {
        &self.endpoint
    }

    async fn is_up(&self) -> bool {
        probe::is_up(&self.client, &self.endpoint, self.probe_timeout).await
    }

    async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError> {
        catalog::list_models(&self.client, &self.endpoint, self.catalog_timeout).await
    }

    async fn pull(
        &self,
        model: &ModelName,
        progress: &dyn PullProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(), PullError> {
        pull::pull_model(
            &self.client,
            &self.endpoint,
            model,
            progress,
            &self.pull_limits,
            cancel,
        )
        .await
    }
}
