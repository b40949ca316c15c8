//! Background warmup worker.
//!
//! Reads the kernel's asset files into the shared [`AssetCache`] while the
//! process is otherwise idle, so the first real kernel load does not wait
//! on disk. The kernel itself is not constructed here.

use cadbench_kernel::{AssetCache, KernelOptions};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

static GLOBAL_WARMUP: Warmup = Warmup::new();

/// Progress of a warmup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmupStatus {
    /// Still reading assets.
    Warming,
    /// Every asset is cached.
    Done,
    /// Reading an asset failed.
    Error(String),
}

impl fmt::Display for WarmupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarmupStatus::Warming => f.write_str("warming"),
            WarmupStatus::Done => f.write_str("done"),
            WarmupStatus::Error(msg) => write!(f, "error:{msg}"),
        }
    }
}

/// Observer of a running warmup task.
#[derive(Debug)]
pub struct WarmupHandle {
    status: watch::Receiver<WarmupStatus>,
    task: JoinHandle<()>,
}

impl WarmupHandle {
    /// Current status.
    pub fn status(&self) -> WarmupStatus {
        self.status.borrow().clone()
    }

    /// A receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<WarmupStatus> {
        self.status.clone()
    }

    /// Wait until the task reports `Done` or `Error`.
    pub async fn finished(mut self) -> WarmupStatus {
        let status = match self
            .status
            .wait_for(|s| !matches!(s, WarmupStatus::Warming))
            .await
        {
            Ok(status) => status.clone(),
            Err(_) => WarmupStatus::Error("warmup task ended without reporting".into()),
        };
        // The task exits right after its final report.
        let _ = (&mut self.task).await;
        status
    }
}

/// Once-only starter for the warmup task.
#[derive(Debug)]
pub struct Warmup {
    started: AtomicBool,
}

impl Default for Warmup {
    fn default() -> Self {
        Self::new()
    }
}

impl Warmup {
    /// A starter that has not fired yet.
    pub const fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
        }
    }

    /// Whether a task has been started.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spawn the warmup task on the current runtime. Only the first call
    /// starts anything; later calls return `None`.
    pub fn start(
        &self,
        options: KernelOptions,
        idle_delay: Duration,
        assets: &'static AssetCache,
    ) -> Option<WarmupHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("warmup already started");
            return None;
        }
        let (tx, rx) = watch::channel(WarmupStatus::Warming);
        let task = tokio::spawn(async move {
            tokio::time::sleep(idle_delay).await;
            let status = match assets.prefetch(&options).await {
                Ok(fetched) => {
                    tracing::info!(fetched, cached = assets.len(), "kernel assets warmed up");
                    WarmupStatus::Done
                }
                Err(e) => {
                    tracing::warn!(error = %e, "kernel asset warmup failed");
                    WarmupStatus::Error(e.to_string())
                }
            };
            tx.send_replace(status);
        });
        Some(WarmupHandle { status: rx, task })
    }
}

/// Start the process-wide warmup task filling [`AssetCache::global`].
pub fn start_warmup(options: KernelOptions, idle_delay: Duration) -> Option<WarmupHandle> {
    GLOBAL_WARMUP.start(options, idle_delay, AssetCache::global())
}
