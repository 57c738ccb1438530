//! Runtime lifecycle coordinator.
//!
//! Drives the probe → launch → wait → catalog → pull sequence that makes the
//! local runtime usable:
//!
//! ```text
//!            probe ok
//!  Unknown ───────────────────────────▶ ServerUp ──▶ ModelsEnsured
//!     │                                    ▲    └──▶ EnsureFailed
//!     │ probe fails → launch               │
//!     ├── launch ok, poll until up ────────┘
//!     ├── launch ok, still down after wait ──▶ Unreachable
//!     └── launch fails ──────────────────────▶ LaunchFailed
//! ```
//!
//! Readiness is never cached. Every `ensure_*` call re-probes and re-reads
//! the catalog, because the runtime and its models can change behind our
//! back (manual installs, crashes and restarts).
//!
//! Failures stay inside this module: [`Coordinator::ensure_server`] returns a
//! `bool` and [`Coordinator::ensure_models`] returns the subset it could
//! confirm. Callers diff that against the request with
//! [`ModelSet::missing`](crate::runtime::ModelSet::missing).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::launcher::Launcher;
use crate::progress::ProgressMode;
use crate::runtime::{ModelName, ModelRuntime, ModelSet};

/// Default interval between readiness probes after a launch.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time to wait for a freshly launched runtime.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(20);

/// Where the coordinator is in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unknown,
    ServerUp,
    ModelsEnsured,
    EnsureFailed,
    LaunchFailed,
    /// Launch succeeded but the runtime never answered within the wait.
    Unreachable,
}

pub struct Coordinator {
    runtime: Arc<dyn ModelRuntime>,
    launcher: Box<dyn Launcher>,
    poll_interval: Duration,
    progress: ProgressMode,
    cancel: CancellationToken,
    state: LifecycleState,
}

impl Coordinator {
    pub fn new(runtime: Arc<dyn ModelRuntime>, launcher: Box<dyn Launcher>) -> Self {
        Self {
            runtime,
            launcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: ProgressMode::Human,
            cancel: CancellationToken::new(),
            state: LifecycleState::Unknown,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Progress mode used for pulls when not in quiet mode.
    pub fn with_progress(mut self, mode: ProgressMode) -> Self {
        self.progress = mode;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Make sure the runtime answers, launching it if needed.
    ///
    /// The launcher is only called when the first probe fails. After a
    /// launch the probe is polled until `wait_timeout`; then one last probe
    /// decides the result.
    pub async fn ensure_server(&mut self, wait_timeout: Duration) -> bool {
        let endpoint = self.runtime.endpoint().clone();
        if self.runtime.is_up().await {
            debug!(endpoint = %endpoint, "runtime already up");
            self.state = LifecycleState::ServerUp;
            return true;
        }

        info!(endpoint = %endpoint, "runtime not reachable, launching");
        match self.launcher.start_background() {
            Ok(handle) => debug!(pid = handle.pid(), "runtime launched"),
            Err(e) => {
                warn!(error = %e, "could not launch runtime");
                self.state = LifecycleState::LaunchFailed;
                return false;
            }
        }

        let started = Instant::now();
        while started.elapsed() < wait_timeout {
            if self.runtime.is_up().await {
                info!(endpoint = %endpoint, elapsed = ?started.elapsed(), "runtime is up");
                self.state = LifecycleState::ServerUp;
                return true;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("wait for runtime cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        // Best-effort final check; no further retries.
        let up = self.runtime.is_up().await;
        if up {
            self.state = LifecycleState::ServerUp;
        } else {
            warn!(endpoint = %endpoint, timeout = ?wait_timeout, "runtime did not become ready");
            self.state = LifecycleState::Unreachable;
        }
        up
    }

    /// Make sure every model in `required` is installed, pulling missing ones.
    ///
    /// Returns the models confirmed by the catalog. A model pulled during
    /// this call only counts once a fresh catalog query lists it.
    pub async fn ensure_models(&mut self, required: &ModelSet, quiet: bool) -> BTreeSet<ModelName> {
        let installed: BTreeSet<ModelName> = match self.runtime.list_models().await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "could not determine installed models; pulling all required");
                BTreeSet::new()
            }
        };

        let reporter = self.progress.quiet(quiet).reporter();
        let mut ensured = BTreeSet::new();
        let mut pulled = Vec::new();

        for model in required.iter() {
            if installed.contains(model) {
                debug!(model = %model, "model already installed");
                ensured.insert(model.clone());
                continue;
            }
            match self.runtime.pull(model, reporter.as_ref(), &self.cancel).await {
                Ok(()) => pulled.push(model.clone()),
                Err(e) => warn!(model = %model, error = %e, "could not pull model"),
            }
        }

        if !pulled.is_empty() {
            match self.runtime.list_models().await {
                Ok(names) => {
                    let now: BTreeSet<ModelName> = names.into_iter().collect();
                    for model in pulled {
                        if now.contains(&model) {
                            ensured.insert(model);
                        } else {
                            warn!(model = %model, "pull reported success but model is not listed");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "could not confirm pulled models");
                }
            }
        }

        let missing = required.missing(&ensured);
        if missing.is_empty() {
            self.state = LifecycleState::ModelsEnsured;
            info!(count = ensured.len(), "all required models installed");
        } else {
            self.state = LifecycleState::EnsureFailed;
            warn!(missing = ?missing, "some required models are not installed");
        }
        ensured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::launcher::{LaunchError, ServerProcessHandle};
    use crate::progress::PullProgressReporter;
    use crate::pull::PullError;
    use crate::runtime::RuntimeEndpoint;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory runtime: comes up after `up_after` probes; pulls of names
    /// in `pullable` succeed and install the model.
    struct FakeRuntime {
        endpoint: RuntimeEndpoint,
        up_after: usize,
        probes: AtomicUsize,
        catalog_ok: bool,
        installed: Mutex<Vec<ModelName>>,
        pullable: Vec<ModelName>,
        phantom_pull: bool,
        catalog_calls: AtomicUsize,
        pulls: Mutex<Vec<ModelName>>,
    }

    impl FakeRuntime {
        fn new(up_after: usize, installed: &[&str], pullable: &[&str]) -> Self {
            Self {
                endpoint: RuntimeEndpoint::parse("http://127.0.0.1:11434").unwrap(),
                up_after,
                probes: AtomicUsize::new(0),
                catalog_ok: true,
                installed: Mutex::new(installed.iter().map(|s| ModelName::from(*s)).collect()),
                pullable: pullable.iter().map(|s| ModelName::from(*s)).collect(),
                phantom_pull: false,
                catalog_calls: AtomicUsize::new(0),
                pulls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelRuntime for FakeRuntime {
        fn endpoint(&self) -> &RuntimeEndpoint {
            &self.endpoint
        }

        async fn is_up(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst) >= self.up_after
        }

        async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError> {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            if !self.catalog_ok {
                return Err(CatalogError::Status(500));
            }
            Ok(self.installed.lock().unwrap().clone())
        }

        async fn pull(
            &self,
            model: &ModelName,
            _progress: &dyn PullProgressReporter,
            _cancel: &CancellationToken,
        ) -> Result<(), PullError> {
            self.pulls.lock().unwrap().push(model.clone());
            if self.pullable.contains(model) {
                if !self.phantom_pull {
                    self.installed.lock().unwrap().push(model.clone());
                }
                Ok(())
            } else {
                Err(PullError::Incomplete)
            }
        }
    }

    struct CountingLauncher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Launcher for CountingLauncher {
        fn start_background(&self) -> Result<ServerProcessHandle, LaunchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LaunchError::ExecutableNotFound {
                    executable: PathBuf::from("ollama"),
                })
            } else {
                Ok(ServerProcessHandle::new(4242))
            }
        }
    }

    fn coordinator(rt: Arc<FakeRuntime>, fail_launch: bool) -> (Coordinator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let launcher = CountingLauncher {
            calls: calls.clone(),
            fail: fail_launch,
        };
        let c = Coordinator::new(rt, Box::new(launcher))
            .with_poll_interval(Duration::from_millis(10))
            .with_progress(ProgressMode::Off);
        (c, calls)
    }

    fn set(names: &[&str]) -> BTreeSet<ModelName> {
        names.iter().map(|s| ModelName::from(*s)).collect()
    }

    #[tokio::test]
    async fn up_server_is_never_launched() {
        let rt = Arc::new(FakeRuntime::new(0, &[], &[]));
        let (mut c, launches) = coordinator(rt, false);
        assert!(c.ensure_server(Duration::from_secs(1)).await);
        assert_eq!(launches.load(Ordering::SeqCst), 0);
        assert_eq!(c.state(), LifecycleState::ServerUp);
    }

    #[tokio::test]
    async fn down_server_is_launched_once_and_polled() {
        let rt = Arc::new(FakeRuntime::new(3, &[], &[]));
        let (mut c, launches) = coordinator(rt.clone(), false);
        assert!(c.ensure_server(Duration::from_secs(5)).await);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(rt.probes.load(Ordering::SeqCst), 4);
        assert_eq!(c.state(), LifecycleState::ServerUp);
    }

    #[tokio::test]
    async fn launch_failure_stops_early() {
        let rt = Arc::new(FakeRuntime::new(usize::MAX, &[], &[]));
        let (mut c, launches) = coordinator(rt.clone(), true);
        assert!(!c.ensure_server(Duration::from_secs(5)).await);
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(rt.probes.load(Ordering::SeqCst), 1);
        assert_eq!(c.state(), LifecycleState::LaunchFailed);
        assert_eq!(rt.catalog_calls.load(Ordering::SeqCst), 0);
        assert!(rt.pulls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wait_timeout_ends_with_one_final_probe() {
        let rt = Arc::new(FakeRuntime::new(usize::MAX, &[], &[]));
        let (mut c, _) = coordinator(rt.clone(), false);
        let started = Instant::now();
        assert!(!c.ensure_server(Duration::from_millis(100)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(c.state(), LifecycleState::Unreachable);
        assert!(rt.probes.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn cancellation_cuts_the_wait_short() {
        let rt = Arc::new(FakeRuntime::new(usize::MAX, &[], &[]));
        let (c, _) = coordinator(rt, false);
        let token = CancellationToken::new();
        token.cancel();
        let mut c = c.with_cancellation(token);
        let started = Instant::now();
        assert!(!c.ensure_server(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn installed_and_pulled_models_are_ensured() {
        let rt = Arc::new(FakeRuntime::new(0, &["A"], &["B"]));
        let (mut c, _) = coordinator(rt.clone(), false);
        let required: ModelSet = ["A", "B"].into_iter().collect();
        let ensured = c.ensure_models(&required, true).await;
        assert_eq!(ensured, set(&["A", "B"]));
        assert_eq!(*rt.pulls.lock().unwrap(), vec![ModelName::from("B")]);
        assert_eq!(c.state(), LifecycleState::ModelsEnsured);
    }

    #[tokio::test]
    async fn failed_pull_is_omitted() {
        let rt = Arc::new(FakeRuntime::new(0, &["A"], &[]));
        let (mut c, _) = coordinator(rt, false);
        let required: ModelSet = ["A", "B"].into_iter().collect();
        let ensured = c.ensure_models(&required, true).await;
        assert_eq!(ensured, set(&["A"]));
        assert_eq!(required.missing(&ensured), vec![ModelName::from("B")]);
        assert_eq!(c.state(), LifecycleState::EnsureFailed);
    }

    #[tokio::test]
    async fn pull_not_confirmed_by_catalog_is_not_ready() {
        let mut fake = FakeRuntime::new(0, &[], &["B"]);
        fake.phantom_pull = true;
        let rt = Arc::new(fake);
        let (mut c, _) = coordinator(rt.clone(), false);
        let required: ModelSet = ["B"].into_iter().collect();
        assert!(c.ensure_models(&required, true).await.is_empty());
        assert_eq!(rt.catalog_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreadable_catalog_attempts_every_pull() {
        let mut fake = FakeRuntime::new(0, &["A"], &["A", "B"]);
        fake.catalog_ok = false;
        let rt = Arc::new(fake);
        let (mut c, _) = coordinator(rt.clone(), false);
        let required: ModelSet = ["A", "B"].into_iter().collect();
        let ensured = c.ensure_models(&required, true).await;
        assert!(ensured.is_empty());
        assert_eq!(rt.pulls.lock().unwrap().len(), 2);
        assert_eq!(c.state(), LifecycleState::EnsureFailed);
    }

    #[tokio::test]
    async fn nothing_required_is_trivially_ensured() {
        let rt = Arc::new(FakeRuntime::new(0, &["A"], &[]));
        let (mut c, _) = coordinator(rt.clone(), false);
        assert!(c.ensure_models(&ModelSet::default(), true).await.is_empty());
        assert_eq!(c.state(), LifecycleState::ModelsEnsured);
        assert_eq!(rt.catalog_calls.load(Ordering::SeqCst), 1);
    }
}
