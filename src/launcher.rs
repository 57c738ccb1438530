//! Background launcher for the inference runtime.
//!
//! Starts `ollama serve` as a detached child and returns immediately. The
//! caller does not wait for readiness here; the
//! [`lifecycle`](crate::lifecycle) coordinator polls the probe for that.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("runtime executable '{}' not found. Is ollama installed?", .executable.display())]
    ExecutableNotFound { executable: PathBuf },
    #[error("failed to spawn '{}': {source}", .executable.display())]
    SpawnFailed {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fire-and-forget handle to a spawned runtime process.
///
/// Only the PID is kept. The process is not a child the caller can join or
/// kill through this handle, and dropping it does nothing: the runtime keeps
/// running after this process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerProcessHandle {
    pid: u32,
}

impl ServerProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Something that can start the runtime in the background.
pub trait Launcher: Send + Sync {
    fn start_background(&self) -> Result<ServerProcessHandle, LaunchError>;
}

/// Launches `<executable> serve`.
#[derive(Debug, Clone)]
pub struct OllamaLauncher {
    executable: PathBuf,
}

impl OllamaLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl Default for OllamaLauncher {
    fn default() -> Self {
        Self::new("ollama")
    }
}

impl Launcher for OllamaLauncher {
    fn start_background(&self) -> Result<ServerProcessHandle, LaunchError> {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LaunchError::ExecutableNotFound {
                executable: self.executable.clone(),
            },
            _ => LaunchError::SpawnFailed {
                executable: self.executable.clone(),
                source: e,
            },
        })?;

        let pid = child.id();
        info!(pid, executable = %self.executable.display(), "started runtime in background");
        // Dropping a `Child` neither waits for nor kills it.
        drop(child);
        debug!(pid, "released runtime process handle");
        Ok(ServerProcessHandle { pid })
    }
}

/// Put the child in its own process group so terminal signals sent to us
/// (Ctrl-C) do not reach it.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_not_found() {
        let launcher = OllamaLauncher::new("/nonexistent/dir/ollama-does-not-exist");
        match launcher.start_background() {
            Err(LaunchError::ExecutableNotFound { executable }) => {
                assert_eq!(executable, PathBuf::from("/nonexistent/dir/ollama-does-not-exist"));
            }
            other => panic!("expected ExecutableNotFound, got {:?}", other),
        }
    }

    #[test]
    fn default_executable_is_ollama() {
        assert_eq!(OllamaLauncher::default().executable(), Path::new("ollama"));
    }

    #[cfg(unix)]
    #[test]
    fn spawns_without_waiting() {
        // `sh serve` fails quickly, but the spawn itself must succeed and
        // return a PID without blocking on the child.
        let launcher = OllamaLauncher::new("sh");
        let handle = launcher.start_background().unwrap();
        assert!(handle.pid() > 0);
    }
}
