//! Process lifecycle: signal capture, graceful cancellation, cleanup hooks.
//!
//! One shutdown controller per process. On SIGINT/SIGTERM it cancels the
//! root token; in-flight cases finish their current step within a grace
//! period, registered cleanup hooks run, and the process exits 130.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code reported after a signal-triggered shutdown.
pub const SIGNAL_EXIT_CODE: i32 = 130;

/// How long in-flight cases get to finish their current step.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

type CleanupHook = Box<dyn FnMut() + Send>;

#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    signalled: Arc<AtomicBool>,
    hooks: Arc<Mutex<Vec<CleanupHook>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root cancellation token; the suite runner derives children from it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn signalled(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    /// Register a cleanup hook to run once during shutdown (e.g. flushing
    /// result files).
    pub fn add_hook(&self, hook: impl FnMut() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Run and drain every registered hook.
    pub fn run_hooks(&self) {
        let mut hooks = self.hooks.lock();
        for hook in hooks.iter_mut() {
            hook();
        }
        hooks.clear();
    }

    /// Cancel as if a signal arrived. Used by the signal listener and by
    /// tests.
    pub fn trigger(&self) {
        self.signalled.store(true, Ordering::Release);
        self.token.cancel();
    }

    /// Spawn the background task watching for SIGINT/SIGTERM.
    pub fn listen_for_signals(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received, cancelling in-flight work");
            this.trigger();
        });
    }

    /// Drive `work` to completion; once cancelled, give it `grace` to
    /// wind down. Returns `None` when the grace period expires or the
    /// task panics.
    pub async fn supervise<T>(
        &self,
        grace: Duration,
        work: impl Future<Output = T> + Send + 'static,
    ) -> Option<T>
    where
        T: Send + 'static,
    {
        let mut handle = tokio::spawn(work);
        tokio::select! {
            joined = &mut handle => joined.ok(),
            () = self.token.cancelled() => {
                match tokio::time::timeout(grace, handle).await {
                    Ok(Ok(value)) => Some(value),
                    Ok(Err(join_err)) => {
                        warn!(error = %join_err, "supervised task died during shutdown");
                        None
                    }
                    Err(_) => {
                        warn!("grace period expired, abandoning in-flight work");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            warn!(error = %err, "could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
