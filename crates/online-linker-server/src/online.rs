//! Online count aggregation and refresh scheduling.
//!
//! The manager runs in one of two modes:
//! - Scheduled: a background task refreshes the count every
//!   `global-cache-expiration` ms and reads are plain loads. With an
//!   inactivity timeout, the task stops itself when nobody reads the count
//!   and the next read starts it again.
//! - On demand: reads refresh the count once it is older than
//!   `global-cache-expiration`, either inline or, in parallel mode, on a
//!   blocking worker while the caller gets the current value.
//!
//! A refresh fetches every source in order and sums the non-negative results.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use online_linker_core::{Clock, StatusSettings, SystemClock};
use online_linker_sources::StatusSource;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ManagerError;

/// Marks a timestamp that was never set.
const NEVER: u64 = u64::MAX;

/// Observable state of the refresh scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// No refresh task: on-demand mode, or stopped.
    Stopped,
    /// The periodic refresh task is alive.
    Scheduled,
    /// The task stopped itself after inactivity and waits for a read.
    Sleeping,
}

enum SchedulerState {
    Stopped,
    Scheduled(JoinHandle<()>),
    Sleeping,
}

impl SchedulerState {
    fn status(&self) -> SchedulerStatus {
        match self {
            SchedulerState::Stopped => SchedulerStatus::Stopped,
            SchedulerState::Scheduled(_) => SchedulerStatus::Scheduled,
            SchedulerState::Sleeping => SchedulerStatus::Sleeping,
        }
    }
}

struct Inner {
    sources: Vec<Box<dyn StatusSource>>,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,

    /// Cache lifetime / refresh period in ms, <= 0 disables expiration.
    expiration: i64,
    on_demand: bool,
    parallel: bool,
    /// 0 disables inactivity sleep.
    inactivity_timeout: u64,

    online: AtomicI32,
    last_update: AtomicU64,
    last_access: AtomicU64,
    /// Parallel on-demand refresh in flight.
    updating: AtomicBool,
    /// Raised by the scheduler task while it decides to sleep.
    sleeping: AtomicBool,
    stopped: AtomicBool,

    refresh_lock: Mutex<()>,
    scheduler: Mutex<SchedulerState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Aggregates the configured sources into a cached online count.
pub struct OnlineManager {
    inner: Arc<Inner>,
}

impl OnlineManager {
    /// Validate `settings` and start the manager.
    ///
    /// Scheduled and parallel on-demand modes must be started inside a tokio
    /// runtime; the first refresh is triggered immediately in scheduled mode.
    pub fn start(
        settings: &StatusSettings,
        sources: Vec<Box<dyn StatusSource>>,
    ) -> Result<Arc<Self>, ManagerError> {
        Self::start_with_clock(settings, sources, Arc::new(SystemClock))
    }

    /// Same as [`OnlineManager::start`] with an explicit clock.
    pub fn start_with_clock(
        settings: &StatusSettings,
        sources: Vec<Box<dyn StatusSource>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ManagerError> {
        if !settings.enabled {
            return Err(ManagerError::Disabled("status"));
        }
        let expiration = settings.global_cache_expiration;
        let on_demand = settings.request_on_demand;
        if expiration < -1 || (!on_demand && expiration <= 1) {
            return Err(ManagerError::InvalidExpiration(expiration));
        }
        let parallel = on_demand && settings.parallel_request_on_demand;
        let runtime = if !on_demand || parallel {
            Some(Handle::try_current()?)
        } else {
            None
        };

        if sources.is_empty() {
            warn!("No status source configured, online count will stay at 0");
        }
        if on_demand && expiration <= 0 {
            warn!("Global cache expiration is disabled, every online count request will refresh");
        }

        let now = clock.now_millis();
        let inner = Arc::new(Inner {
            sources,
            clock,
            runtime,
            expiration,
            on_demand,
            parallel,
            inactivity_timeout: u64::try_from(settings.inactivity_timeout).unwrap_or(0),
            online: AtomicI32::new(0),
            last_update: AtomicU64::new(NEVER),
            last_access: AtomicU64::new(now),
            updating: AtomicBool::new(false),
            sleeping: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
            scheduler: Mutex::new(SchedulerState::Stopped),
        });

        if !on_demand {
            let mut state = lock(&inner.scheduler);
            *state = SchedulerState::Scheduled(inner.spawn_scheduler()?);
            debug!("Online count refresh scheduled every {} ms", expiration);
        }

        info!(
            "Online manager started ({} source(s), {})",
            inner.sources.len(),
            match (on_demand, parallel) {
                (false, _) => "scheduled",
                (true, false) => "on demand",
                (true, true) => "parallel on demand",
            }
        );
        Ok(Arc::new(Self { inner }))
    }

    /// Current online count.
    ///
    /// In scheduled mode this records the access and wakes a sleeping
    /// scheduler. In on-demand mode it refreshes the count when expired.
    pub fn online_count(&self) -> i32 {
        let inner = &self.inner;
        if inner.on_demand {
            if !inner.stopped.load(Ordering::Acquire) && inner.claim_refresh() {
                if inner.parallel {
                    inner.refresh_in_background();
                } else {
                    inner.refresh();
                }
            }
        } else {
            inner
                .last_access
                .store(inner.clock.now_millis(), Ordering::SeqCst);
            if inner.inactivity_timeout > 0 && inner.sleeping.load(Ordering::SeqCst) {
                inner.wake();
            }
        }
        inner.online.load(Ordering::Acquire)
    }

    /// Last computed count, without side effects.
    pub fn cached_online_count(&self) -> i32 {
        self.inner.online.load(Ordering::Acquire)
    }

    /// Current scheduler state.
    pub fn scheduler_status(&self) -> SchedulerStatus {
        lock(&self.inner.scheduler).status()
    }

    /// Number of configured sources.
    pub fn source_count(&self) -> usize {
        self.inner.sources.len()
    }

    /// Cancel the scheduler. Reads keep returning the last value.
    ///
    /// An in-flight refresh is not interrupted. Calling it again is a no-op.
    pub fn stop(&self) {
        let mut state = lock(&self.inner.scheduler);
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let SchedulerState::Scheduled(handle) =
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        {
            handle.abort();
        }
        self.inner.sleeping.store(false, Ordering::SeqCst);
        info!("Online manager stopped");
    }
}

impl Drop for OnlineManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OnlineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnlineManager")
            .field("sources", &self.inner.sources)
            .field("online", &self.cached_online_count())
            .field("status", &self.scheduler_status())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Fetch every source and store the sum.
    fn refresh(&self) -> i32 {
        let _guard = lock(&self.refresh_lock);

        let mut total: i64 = 0;
        for source in &self.sources {
            match panic::catch_unwind(AssertUnwindSafe(|| source.fetch())) {
                Ok(count) if count >= 0 => total += i64::from(count),
                Ok(count) => debug!("{} source returned {}, counted as 0", source.kind(), count),
                Err(_) => error!("{} source panicked while fetching, counted as 0", source.kind()),
            }
        }

        let online = total.min(i64::from(i32::MAX)) as i32;
        self.online.store(online, Ordering::Release);
        if !self.on_demand {
            self.last_update
                .store(self.clock.now_millis(), Ordering::Release);
        }
        online
    }

    /// Claim the current expiration window.
    ///
    /// The timestamp moves before the fetch, so concurrent callers inside the
    /// same window do not fetch again.
    fn claim_refresh(&self) -> bool {
        if self.expiration <= 0 {
            return true;
        }
        let now = self.clock.now_millis();
        let last = self.last_update.load(Ordering::Acquire);
        if last != NEVER && now.saturating_sub(last) < self.expiration as u64 {
            return false;
        }
        self.last_update
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn refresh_in_background(self: &Arc<Self>) {
        let Some(runtime) = &self.runtime else {
            self.refresh();
            return;
        };
        if self
            .updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = self.clone();
        runtime.spawn_blocking(move || {
            let _updating = UpdatingGuard(&inner.updating);
            inner.refresh();
        });
    }

    /// Spawn the periodic refresh task.
    fn spawn_scheduler(self: &Arc<Self>) -> Result<JoinHandle<()>, ManagerError> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current()?,
        };
        let period = Duration::from_millis(self.expiration.max(1) as u64);
        let inner = self.clone();

        Ok(runtime.spawn(async move {
            loop {
                let worker = inner.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || worker.refresh()).await {
                    error!("Online count refresh task failed: {}", e);
                }
                if inner.try_sleep() {
                    break;
                }
                tokio::time::sleep(period).await;
            }
        }))
    }

    /// Called by the scheduler task after each refresh. Returns true when the
    /// task must exit because nobody read the count for too long.
    fn try_sleep(&self) -> bool {
        if self.inactivity_timeout == 0 {
            return false;
        }
        let mut state = lock(&self.scheduler);
        if !matches!(*state, SchedulerState::Scheduled(_)) {
            return false;
        }

        // Raised before reading the access time: a concurrent reader either
        // shows up in `last_access` here or sees the flag and wakes us.
        self.sleeping.store(true, Ordering::SeqCst);
        let idle = self
            .clock
            .now_millis()
            .saturating_sub(self.last_access.load(Ordering::SeqCst));
        if idle < self.inactivity_timeout {
            self.sleeping.store(false, Ordering::SeqCst);
            return false;
        }

        *state = SchedulerState::Sleeping;
        debug!("No online count request for {} ms, refresh paused", idle);
        true
    }

    /// Restart a sleeping scheduler.
    fn wake(self: &Arc<Self>) {
        let mut state = lock(&self.scheduler);
        if self.stopped.load(Ordering::Acquire) || !matches!(*state, SchedulerState::Sleeping) {
            return;
        }
        match self.spawn_scheduler() {
            Ok(handle) => {
                self.last_access
                    .store(self.clock.now_millis(), Ordering::SeqCst);
                *state = SchedulerState::Scheduled(handle);
                self.sleeping.store(false, Ordering::SeqCst);
                debug!("Online count requested, refresh resumed");
            }
            Err(e) => error!("Failed to resume online count refresh: {}", e),
        }
    }
}

/// Clears the parallel refresh flag, even if the refresh panics.
struct UpdatingGuard<'a>(&'a AtomicBool);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
