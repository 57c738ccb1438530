//! Model pull progress reporting.
//!
//! Surfaces the status lines streamed by `POST /api/pull` so users can see a
//! download advance. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts. Reporters are display-only: the puller never makes
//! control decisions based on what a reporter does.

use std::io::Write;

use crate::pull::PullProgressEvent;
use crate::runtime::ModelName;

/// Receives decoded pull progress events.
pub trait PullProgressReporter: Send + Sync {
    /// Emit a progress event for `model`. Called once per status record.
    fn report(&self, model: &ModelName, event: &PullProgressEvent);
}

/// Human-friendly progress on stderr: `[qwen2.5:7b] pulling 2af3b81862c6  1,234 / 5,000 bytes`.
pub struct StderrProgress;

impl PullProgressReporter for StderrProgress {
    fn report(&self, model: &ModelName, event: &PullProgressEvent) {
        let Some(status) = event.status.as_deref() else {
            return;
        };
        let line = match (event.completed, event.total) {
            (Some(done), Some(total)) if total > 0 => format!(
                "[{}] {}  {} / {} bytes\n",
                model,
                status,
                format_number(done),
                format_number(total)
            ),
            _ => format!("[{}] {}\n", model, status),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl PullProgressReporter for JsonProgress {
    fn report(&self, model: &ModelName, event: &PullProgressEvent) {
        let obj = serde_json::json!({
            "event": "pull_progress",
            "model": model,
            "status": event.status,
            "digest": event.digest,
            "completed": event.completed,
            "total": event.total,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter for quiet mode.
pub struct NoProgress;

impl PullProgressReporter for NoProgress {
    fn report(&self, _model: &ModelName, _event: &PullProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Quiet forces [`ProgressMode::Off`]; otherwise keep `self`.
    pub fn quiet(self, quiet: bool) -> Self {
        if quiet {
            ProgressMode::Off
        } else {
            self
        }
    }

    pub fn reporter(&self) -> Box<dyn PullProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
