//! Caching decorator for any status source.

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use online_linker_core::{Clock, SourceKind, SystemClock};

use crate::source::StatusSource;

/// Marks a cache that was never filled.
const NEVER: u64 = u64::MAX;

/// Wraps a source and serves its last value for `expiration_millis`.
///
/// A failed fetch (negative value) is only cached when `cache_failures` is
/// set. Otherwise the previous value is returned and the window is left
/// untouched, so the next call retries.
pub struct CacheLayerSource {
    delegate: Box<dyn StatusSource>,
    expiration_millis: u64,
    cache_failures: bool,
    clock: Arc<dyn Clock>,
    last_value: AtomicI32,
    last_update: AtomicU64,
}

impl CacheLayerSource {
    /// Wrap `delegate`. An expiration below 1 ms is raised to 1 ms.
    pub fn new(delegate: Box<dyn StatusSource>, expiration_millis: u64, cache_failures: bool) -> Self {
        Self::with_clock(delegate, expiration_millis, cache_failures, Arc::new(SystemClock))
    }

    /// Wrap `delegate` using `clock` for the cache window.
    pub fn with_clock(
        delegate: Box<dyn StatusSource>,
        expiration_millis: u64,
        cache_failures: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            delegate,
            expiration_millis: expiration_millis.max(1),
            cache_failures,
            clock,
            last_value: AtomicI32::new(0),
            last_update: AtomicU64::new(NEVER),
        }
    }

    pub fn expiration_millis(&self) -> u64 {
        self.expiration_millis
    }

    pub fn cache_failures(&self) -> bool {
        self.cache_failures
    }

    pub fn delegate(&self) -> &dyn StatusSource {
        self.delegate.as_ref()
    }
}

impl fmt::Debug for CacheLayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayerSource")
            .field("delegate", &self.delegate)
            .field("expiration_millis", &self.expiration_millis)
            .field("cache_failures", &self.cache_failures)
            .finish_non_exhaustive()
    }
}

impl StatusSource for CacheLayerSource {
    fn fetch(&self) -> i32 {
        let now = self.clock.now_millis();
        let last_update = self.last_update.load(Ordering::Acquire);
        if last_update != NEVER && now.saturating_sub(last_update) < self.expiration_millis {
            return self.last_value.load(Ordering::Acquire);
        }

        let value = self.delegate.fetch();
        if value < 0 && !self.cache_failures {
            return self.last_value.load(Ordering::Acquire);
        }

        self.last_value.store(value, Ordering::Release);
        self.last_update.store(now, Ordering::Release);
        value
    }

    fn kind(&self) -> SourceKind {
        self.delegate.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use online_linker_core::{ManualClock, FETCH_FAILED};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Delegate replaying a script of values and counting calls.
    #[derive(Debug)]
    struct Scripted {
        values: Mutex<Vec<i32>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn boxed(values: &[i32]) -> (Box<dyn StatusSource>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let mut values = values.to_vec();
            values.reverse();
            let source = Scripted {
                values: Mutex::new(values),
                calls: calls.clone(),
            };
            (Box::new(source), calls)
        }
    }

    impl StatusSource for Scripted {
        fn fetch(&self) -> i32 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.values.lock().unwrap().pop().unwrap_or(FETCH_FAILED)
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Ping
        }
    }

    #[test]
    fn test_serves_cached_value_within_window() {
        let clock = Arc::new(ManualClock::new(10_000));
        let (delegate, calls) = Scripted::boxed(&[5, 9]);
        let cache = CacheLayerSource::with_clock(delegate, 1_000, false, clock.clone());

        assert_eq!(cache.fetch(), 5);
        clock.advance(500);
        assert_eq!(cache.fetch(), 5);
        clock.advance(499);
        assert_eq!(cache.fetch(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        assert_eq!(cache.fetch(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let (delegate, calls) = Scripted::boxed(&[5, FETCH_FAILED, 8]);
        let cache = CacheLayerSource::with_clock(delegate, 1_000, false, clock.clone());

        assert_eq!(cache.fetch(), 5);
        clock.advance(1_000);
        // Failure keeps the previous value and does not restart the window.
        assert_eq!(cache.fetch(), 5);
        assert_eq!(cache.fetch(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failure_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let (delegate, calls) = Scripted::boxed(&[5, FETCH_FAILED, 8]);
        let cache = CacheLayerSource::with_clock(delegate, 1_000, true, clock.clone());

        assert_eq!(cache.fetch(), 5);
        clock.advance(1_000);
        assert_eq!(cache.fetch(), FETCH_FAILED);
        clock.advance(999);
        assert_eq!(cache.fetch(), FETCH_FAILED);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        clock.advance(1);
        assert_eq!(cache.fetch(), 8);
    }

    #[test]
    fn test_first_failure_returns_zero() {
        let clock = Arc::new(ManualClock::new(0));
        let (delegate, _) = Scripted::boxed(&[FETCH_FAILED]);
        let cache = CacheLayerSource::with_clock(delegate, 1_000, false, clock);

        assert_eq!(cache.fetch(), 0);
    }

    #[test]
    fn test_kind_and_clamped_expiration() {
        let (delegate, _) = Scripted::boxed(&[]);
        let cache = CacheLayerSource::new(delegate, 0, false);
        assert_eq!(cache.kind(), SourceKind::Ping);
        assert_eq!(cache.expiration_millis(), 1);
    }
}
