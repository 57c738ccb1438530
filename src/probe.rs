//! Runtime reachability probe.
//!
//! One bounded `GET /api/version`. Only an HTTP 200 counts as "up".

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::runtime::RuntimeEndpoint;

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

const VERSION_PATH: &str = "/api/version";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("runtime did not answer within {0:?}")]
    Timeout(Duration),
    #[error("runtime unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("runtime answered with HTTP {0}")]
    Status(u16),
}

/// Probe the runtime once, keeping the failure reason.
pub async fn probe(
    client: &reqwest::Client,
    endpoint: &RuntimeEndpoint,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let resp = client
        .get(endpoint.url(VERSION_PATH))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Transport(e)
            }
        })?;

    let status = resp.status().as_u16();
    if status != 200 {
        return Err(ProbeError::Status(status));
    }
    Ok(())
}

/// `true` only when the runtime answered 200 within `timeout`.
///
/// Never returns an error; every failure collapses to `false`.
pub async fn is_up(client: &reqwest::Client, endpoint: &RuntimeEndpoint, timeout: Duration) -> bool {
    match probe(client, endpoint, timeout).await {
        Ok(()) => true,
        Err(e) => {
            debug!(endpoint = %endpoint, error = %e, "runtime probe failed");
            false
        }
    }
}
