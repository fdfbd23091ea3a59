//! Periodic publishing of the local online count.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use online_linker_core::{BroadcastingSettings, OnlineSupplier};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ManagerError;
use crate::target::BroadcastingTarget;

struct Inner {
    supplier: OnlineSupplier,
    targets: Vec<Box<dyn BroadcastingTarget>>,
    only_on_change: bool,
    /// Last broadcast count, -1 before the first write.
    last_count: AtomicI32,
    /// Serializes ticks with shutdown.
    tick_lock: Mutex<()>,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Samples the host's count every `updating-interval` ms and writes it to
/// every target.
pub struct BroadcastingManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastingManager {
    /// Start ticking on the current tokio runtime. The first tick runs
    /// immediately.
    pub fn start(
        settings: &BroadcastingSettings,
        supplier: OnlineSupplier,
        targets: Vec<Box<dyn BroadcastingTarget>>,
    ) -> Result<Self, ManagerError> {
        if !settings.enabled {
            return Err(ManagerError::Disabled("broadcasting"));
        }
        if settings.updating_interval == 0 {
            return Err(ManagerError::InvalidInterval);
        }
        let runtime = Handle::try_current()?;

        if targets.is_empty() {
            warn!("No broadcasting target configured, nothing will be published");
        }

        let inner = Arc::new(Inner {
            supplier,
            targets,
            only_on_change: settings.only_on_change,
            last_count: AtomicI32::new(-1),
            tick_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        });

        let interval = Duration::from_millis(settings.updating_interval);
        let ticker = inner.clone();
        let task = runtime.spawn(async move {
            loop {
                let worker = ticker.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || worker.tick()).await {
                    error!("Broadcast task failed: {}", e);
                }
                tokio::time::sleep(interval).await;
            }
        });

        info!(
            "Broadcasting started ({} target(s), every {} ms)",
            inner.targets.len(),
            settings.updating_interval
        );
        Ok(Self {
            inner,
            task: Mutex::new(Some(task)),
        })
    }

    /// Run one tick on the calling thread.
    pub fn tick(&self) {
        self.inner.tick();
    }

    /// Last broadcast count, -1 if nothing was published yet.
    pub fn last_count(&self) -> i32 {
        self.inner.last_count.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Cancel ticking and shut every target down.
    ///
    /// Blocks until an in-flight tick completes so that no write lands after
    /// the targets are shut down. Calling it again is a no-op.
    pub fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }

        let _tick = lock(&self.inner.tick_lock);
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for target in &self.inner.targets {
            if let Err(e) = target.shutdown() {
                error!("Failed to shut down {} broadcasting target: {}", target.kind(), e);
            }
        }
        info!("Broadcasting stopped");
    }
}

impl Drop for BroadcastingManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BroadcastingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastingManager")
            .field("targets", &self.inner.targets)
            .field("only_on_change", &self.inner.only_on_change)
            .field("last_count", &self.last_count())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn tick(&self) {
        let _tick = lock(&self.tick_lock);
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let online = match panic::catch_unwind(AssertUnwindSafe(|| (self.supplier)())) {
            Ok(online) => online,
            Err(_) => {
                error!("Online count supplier panicked, skipping broadcast");
                return;
            }
        };
        if online < 0 {
            warn!("Invalid online count {}, skipping broadcast", online);
            return;
        }
        if self.only_on_change && self.last_count.load(Ordering::Acquire) == online {
            return;
        }
        self.last_count.store(online, Ordering::Release);

        debug!("Broadcasting online count {}", online);
        for target in &self.targets {
            if let Err(e) = target.broadcast(online) {
                error!("Failed to broadcast to {} target: {}", target.kind(), e);
            }
        }
    }
}
