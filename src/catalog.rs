//! Installed-model catalog (`GET /api/tags`).
//!
//! Returns model names in the order the server lists them. Records without a
//! `name` are skipped; nothing is sorted or deduplicated.
//!
//! [`list_models`] distinguishes "the runtime reports zero models"
//! (`Ok(vec![])`) from "the catalog could not be read" (`Err`).

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::runtime::{ModelName, RuntimeEndpoint};

/// Default timeout for a catalog query.
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(5);

const TAGS_PATH: &str = "/api/tags";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("catalog returned HTTP {0}")]
    Status(u16),
    #[error("catalog response is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Option<Vec<ModelRecord>>,
}

#[derive(Debug, Deserialize)]
struct ModelRecord {
    #[serde(default)]
    name: Option<String>,
}

/// Query the runtime for its installed models.
pub async fn list_models(
    client: &reqwest::Client,
    endpoint: &RuntimeEndpoint,
    timeout: Duration,
) -> Result<Vec<ModelName>, CatalogError> {
    let resp = client
        .get(endpoint.url(TAGS_PATH))
        .timeout(timeout)
        .send()
        .await
        .map_err(CatalogError::Transport)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(CatalogError::Status(status.as_u16()));
    }

    let body = resp.bytes().await.map_err(CatalogError::Transport)?;
    let names = parse_tags(&body)?;
    debug!(endpoint = %endpoint, count = names.len(), "catalog listed models");
    Ok(names)
}

/// Extract model names from a `/api/tags` body.
pub fn parse_tags(body: &[u8]) -> Result<Vec<ModelName>, CatalogError> {
    let tags: TagsResponse = serde_json::from_slice(body).map_err(CatalogError::Decode)?;
    Ok(tags
        .models
        .unwrap_or_default()
        .into_iter()
        .filter_map(|record| record.name)
        .filter(|name| !name.is_empty())
        .map(ModelName::from)
        .collect())
}
