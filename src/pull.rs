//! Streaming model pull (`POST /api/pull`).
//!
//! The runtime answers with newline-delimited JSON records such as:
//!
//! ```text
//! {"status":"pulling manifest"}
//! {"status":"pulling 2af3b81862c6","digest":"sha256:2af3…","total":4683087332,"completed":1048576}
//! {"status":"verifying sha256 digest"}
//! {"status":"success"}
//! ```
//!
//! # Protocol Rules
//!
//! - Records can straddle network chunks; bytes are buffered until a newline.
//!   A final record without a trailing newline is still processed at EOF.
//! - A record longer than [`MAX_LINE_BYTES`] is dropped whole, up to its
//!   newline. The buffer never grows past that cap.
//! - Blank and malformed lines are skipped silently.
//! - Every record with a `status` is forwarded to the progress reporter
//!   (display only).
//! - `status == "success"` ends the read immediately with `Ok(())`. Nothing
//!   after it is consumed.
//! - End of stream without `success` is a failure. If the runtime sent an
//!   `{"error": ...}` record, that message is returned as
//!   [`PullError::Remote`].
//!
//! # Bounds
//!
//! [`PullLimits`] caps how long the stream may stay silent (`idle_timeout`)
//! and, optionally, the total pull time (`deadline`). A
//! [`CancellationToken`] aborts the pull at the next await point.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::progress::PullProgressReporter;
use crate::runtime::{ModelName, RuntimeEndpoint};

const PULL_PATH: &str = "/api/pull";

/// Longest record the decoder will buffer.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Terminal status emitted by the runtime once a pull has completed.
pub const SUCCESS_STATUS: &str = "success";

/// One decoded record from the pull stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgressEvent {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullProgressEvent {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS_STATUS)
    }
}

#[derive(Debug, Error)]
pub enum PullError {
    #[error("pull request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("pull returned HTTP {0}")]
    Status(u16),
    #[error("runtime reported an error: {0}")]
    Remote(String),
    #[error("pull stream ended without a success status")]
    Incomplete,
    #[error("no data from runtime for {0:?}")]
    IdleTimeout(Duration),
    #[error("pull exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
    #[error("pull cancelled")]
    Cancelled,
}

/// Time bounds for a single pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullLimits {
    /// Longest allowed gap between two chunks of the response.
    pub idle_timeout: Duration,
    /// Optional ceiling on the whole pull, measured from the request.
    pub deadline: Option<Duration>,
}

impl Default for PullLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            deadline: None,
        }
    }
}

impl PullLimits {
    /// How long the next read may wait, and whether the deadline (rather
    /// than the idle timeout) is the binding limit.
    fn next_wait(&self, started: Instant) -> Result<(Duration, bool), PullError> {
        match self.deadline {
            Some(deadline) => {
                let left = deadline.saturating_sub(started.elapsed());
                if left.is_zero() {
                    return Err(PullError::DeadlineExceeded(deadline));
                }
                if left < self.idle_timeout {
                    Ok((left, true))
                } else {
                    Ok((self.idle_timeout, false))
                }
            }
            None => Ok((self.idle_timeout, false)),
        }
    }

    fn timeout_error(&self, deadline_bound: bool) -> PullError {
        match (deadline_bound, self.deadline) {
            (true, Some(deadline)) => PullError::DeadlineExceeded(deadline),
            _ => PullError::IdleTimeout(self.idle_timeout),
        }
    }
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

/// Splits a byte stream into newline-terminated records.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Inside an oversized record; skip until the next newline.
    discarding: bool,
}

impl LineDecoder {
    /// Feed a chunk; returns every record it completed.
    ///
    /// Only `chunk` is scanned for newlines, so the cost per call is linear
    /// in the chunk, not in what is already buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buf.len() + head.len() > MAX_LINE_BYTES {
                warn!(bytes = self.buf.len() + head.len(), "dropping oversized pull record");
                self.buf.clear();
                continue;
            }
            let mut line = std::mem::take(&mut self.buf);
            line.extend_from_slice(head);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
        }
        if !rest.is_empty() && !self.discarding {
            if self.buf.len() + rest.len() > MAX_LINE_BYTES {
                warn!(limit = MAX_LINE_BYTES, "pull record exceeds limit, skipping to next newline");
                self.buf = Vec::new();
                self.discarding = true;
            } else {
                self.buf.extend_from_slice(rest);
            }
        }
        lines
    }

    /// The unterminated tail left at end of stream, if any.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if std::mem::take(&mut self.discarding) || self.buf.is_empty() {
            self.buf.clear();
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Decode one record. `None` for blank or malformed lines.
pub fn parse_event(line: &[u8]) -> Option<PullProgressEvent> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_slice::<PullProgressEvent>(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            trace!(error = %e, "skipping malformed pull record");
            None
        }
    }
}

/// Handle one record; `true` once the terminal success status is seen.
fn handle_line(
    line: &[u8],
    model: &ModelName,
    progress: &dyn PullProgressReporter,
    remote_error: &mut Option<String>,
) -> bool {
    let Some(event) = parse_event(line) else {
        return false;
    };
    if let Some(err) = &event.error {
        warn!(model = %model, error = %err, "runtime reported pull error");
        *remote_error = Some(err.clone());
    }
    match event.status.as_deref() {
        Some(status) if !status.is_empty() => {
            debug!(model = %model, status, completed = ?event.completed, total = ?event.total, "pull progress");
            progress.report(model, &event);
            event.is_success()
        }
        _ => false,
    }
}

/// Pull `model` from the runtime's registry.
///
/// Returns `Ok(())` only after a `success` record has been read.
pub async fn pull_model(
    client: &reqwest::Client,
    endpoint: &RuntimeEndpoint,
    model: &ModelName,
    progress: &dyn PullProgressReporter,
    limits: &PullLimits,
    cancel: &CancellationToken,
) -> Result<(), PullError> {
    let started = Instant::now();
    info!(model = %model, endpoint = %endpoint, "pulling model");

    let (wait, deadline_bound) = limits.next_wait(started)?;
    let send = client
        .post(endpoint.url(PULL_PATH))
        .json(&PullRequest {
            name: model.as_str(),
        })
        .send();
    let resp = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PullError::Cancelled),
        res = tokio::time::timeout(wait, send) => match res {
            Err(_) => return Err(limits.timeout_error(deadline_bound)),
            Ok(res) => res.map_err(PullError::Transport)?,
        },
    };

    let status = resp.status();
    if !status.is_success() {
        return Err(PullError::Status(status.as_u16()));
    }

    let mut stream = resp.bytes_stream();
    let mut decoder = LineDecoder::default();
    let mut remote_error: Option<String> = None;

    loop {
        let (wait, deadline_bound) = limits.next_wait(started)?;
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PullError::Cancelled),
            next = tokio::time::timeout(wait, stream.next()) => next,
        };
        let chunk = match next {
            Err(_) => return Err(limits.timeout_error(deadline_bound)),
            Ok(None) => break,
            Ok(Some(Err(e))) => return Err(PullError::Transport(e)),
            Ok(Some(Ok(bytes))) => bytes,
        };
        for line in decoder.push(&chunk) {
            if handle_line(&line, model, progress, &mut remote_error) {
                info!(model = %model, elapsed = ?started.elapsed(), "model pulled");
                return Ok(());
            }
        }
    }

    if let Some(tail) = decoder.finish() {
        if handle_line(&tail, model, progress, &mut remote_error) {
            info!(model = %model, elapsed = ?started.elapsed(), "model pulled");
            return Ok(());
        }
    }

    Err(remote_error
        .map(PullError::Remote)
        .unwrap_or(PullError::Incomplete))
}
