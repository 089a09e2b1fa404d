//! Caching decorator for any ReferenceSource.
//!
//! Keeps the last successful snapshot for a fixed TTL. A zero TTL fetches on
//! every call. Refreshes are single-flight: the lock is held across the
//! inner fetch, so concurrent requests wait for one refresh instead of each
//! hitting the remote service.
//!
//! When a refresh fails and a previous snapshot younger than the staleness
//! bound exists, that snapshot is served and the failure is logged. With a
//! zero TTL nothing is ever served stale.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::ReferenceTables;
use crate::ports::{ReferenceError, ReferenceSource};

/// Default staleness bound, in multiples of the TTL.
const MAX_STALE_TTLS: u32 = 12;

struct Snapshot {
    tables: Arc<ReferenceTables>,
    loaded_at: Instant,
}

/// TTL cache over a reference source.
pub struct CachedReferenceSource<R> {
    inner: R,
    ttl: Duration,
    max_stale: Duration,
    snapshot: Mutex<Option<Snapshot>>,
}

impl<R: ReferenceSource> CachedReferenceSource<R> {
    /// Cache with the default staleness bound of twelve TTLs.
    #[must_use]
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            max_stale: ttl.checked_mul(MAX_STALE_TTLS).unwrap_or(Duration::MAX),
            snapshot: Mutex::new(None),
        }
    }

    /// Override how old a snapshot may be when served after a failed refresh.
    #[must_use]
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop the cached snapshot so the next fetch goes to the source.
    pub fn invalidate(&self) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<R: ReferenceSource> ReferenceSource for CachedReferenceSource<R> {
    fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
        // A panic inside a previous refresh leaves the snapshot intact.
        let mut guard = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(snapshot) = guard.as_ref() {
            if !self.ttl.is_zero() && snapshot.loaded_at.elapsed() < self.ttl {
                tracing::debug!("Serving cached reference data");
                return Ok(Arc::clone(&snapshot.tables));
            }
        }

        match self.inner.fetch() {
            Ok(tables) => {
                tracing::debug!("Refreshed reference data from {}", self.inner.describe());
                *guard = Some(Snapshot {
                    tables: Arc::clone(&tables),
                    loaded_at: Instant::now(),
                });
                Ok(tables)
            }
            Err(e) => match guard.as_ref() {
                Some(stale) if !self.ttl.is_zero() && stale.loaded_at.elapsed() < self.max_stale => {
                    tracing::warn!(
                        "Reference refresh from {} failed, serving data fetched at {}: {}",
                        self.inner.describe(),
                        stale.tables.fetched_at,
                        e
                    );
                    Ok(Arc::clone(&stale.tables))
                }
                _ => Err(e),
            },
        }
    }

    fn describe(&self) -> String {
        format!("cached({}, ttl={}s)", self.inner.describe(), self.ttl.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityTable, SlotTable};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Source that counts fetches and can be switched into failure.
    struct FlakySource {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl FlakySource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            }
        }
    }

    impl ReferenceSource for FlakySource {
        fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReferenceError::Timeout);
            }
            Ok(Arc::new(ReferenceTables::new(
                SlotTable::default(),
                ActivityTable::new(vec![1.0]),
            )))
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    #[test]
    fn test_reuses_snapshot_within_ttl() {
        let cache = CachedReferenceSource::new(FlakySource::new(), Duration::from_secs(300));
        let a = cache.fetch().unwrap();
        let b = cache.fetch().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);

        cache.invalidate();
        cache.fetch().unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_ttl_fetches_every_time() {
        let cache = CachedReferenceSource::new(FlakySource::new(), Duration::ZERO);
        cache.fetch().unwrap();
        cache.fetch().unwrap();
        cache.fetch().unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_serves_stale_on_refresh_failure() {
        let cache = CachedReferenceSource::new(FlakySource::new(), Duration::from_millis(1))
            .with_max_stale(Duration::from_secs(60));
        let first = cache.fetch().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        cache.inner.failing.store(true, Ordering::SeqCst);
        let stale = cache.fetch().expect("stale snapshot served");
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_ttl_never_serves_stale() {
        let cache = CachedReferenceSource::new(FlakySource::new(), Duration::ZERO);
        cache.fetch().unwrap();

        cache.inner.failing.store(true, Ordering::SeqCst);
        assert!(matches!(cache.fetch(), Err(ReferenceError::Timeout)));
    }

    #[test]
    fn test_snapshot_older_than_bound_is_not_served() {
        let cache = CachedReferenceSource::new(FlakySource::new(), Duration::from_millis(1))
            .with_max_stale(Duration::from_millis(2));
        cache.fetch().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        cache.inner.failing.store(true, Ordering::SeqCst);
        assert!(matches!(cache.fetch(), Err(ReferenceError::Timeout)));
    }

    /// Source whose first fetch panics.
    struct PanicOnceSource {
        panicked: AtomicBool,
    }

    impl ReferenceSource for PanicOnceSource {
        fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("source exploded");
            }
            Ok(Arc::new(ReferenceTables::new(
                SlotTable::default(),
                ActivityTable::new(vec![1.0]),
            )))
        }

        fn describe(&self) -> String {
            "panic-once".into()
        }
    }

    #[test]
    fn test_recovers_after_panicking_refresh() {
        let cache = CachedReferenceSource::new(
            PanicOnceSource {
                panicked: AtomicBool::new(false),
            },
            Duration::from_secs(60),
        );

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cache.fetch()));
        assert!(crashed.is_err());
        assert!(cache.snapshot.is_poisoned());

        assert!(cache.fetch().is_ok());
    }

    #[test]
    fn test_error_without_snapshot_propagates() {
        let source = FlakySource::new();
        source.failing.store(true, Ordering::SeqCst);
        let cache = CachedReferenceSource::new(source, Duration::from_secs(60));
        assert!(matches!(cache.fetch(), Err(ReferenceError::Timeout)));
    }
}
