//! Time-boxed artifact credentials
//!
//! Credentials issued for a job are valid for 15 minutes. The cache hands out
//! the same credential until it is 14 minutes old, then fetches a new one.
//! Fetches are serialized: concurrent callers wait for the in-flight fetch
//! and share its result.

mod clock;
mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use source::JobDetailsSource;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use pipeline_protocol::ops::ArtifactCredentials;

use crate::logging::LOG_TAG;
use crate::store::StoreError;

/// Validity window of store-issued credentials, in seconds.
pub const CREDENTIAL_VALIDITY_SECS: i64 = 15 * 60;

/// How long a cached credential is handed out, in seconds. Shorter than the
/// validity window to absorb clock skew and request latency.
pub const CACHE_BUDGET_SECS: i64 = 14 * 60;

/// `CACHE_BUDGET_SECS` as a duration
pub fn cache_budget() -> Duration {
    Duration::seconds(CACHE_BUDGET_SECS)
}

/// Errors for credential operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential fetch failed: {0}")]
    Store(#[from] StoreError),

    #[error("job {job_id} returned no artifact credentials")]
    Missing { job_id: String },

    #[error("credential cache lock poisoned")]
    Poisoned,
}

/// A fetched credential and the time it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporaryCredential {
    pub credentials: ArtifactCredentials,
    pub issued_at: DateTime<Utc>,
}

impl TemporaryCredential {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.issued_at
    }
}

/// Supplies a currently valid credential on demand.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Arc<TemporaryCredential>, CredentialError>;
}

/// Fetches a fresh credential from the orchestrator.
pub trait CredentialSource: Send + Sync {
    fn fetch(&self) -> Result<ArtifactCredentials, CredentialError>;
}

/// Credential cache scoped to one work item.
pub struct CachedCredentials<S> {
    source: S,
    clock: Arc<dyn Clock>,
    budget: Duration,
    slot: Mutex<Option<Arc<TemporaryCredential>>>,
    fetches: AtomicU64,
}

impl<S: CredentialSource> CachedCredentials<S> {
    /// Create a cache over `source` using the wall clock
    pub fn new(source: S) -> Self {
        Self::with_clock(source, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock
    pub fn with_clock(source: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            budget: cache_budget(),
            slot: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Override the budget
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Return the cached credential, fetching a new one if none is cached or
    /// the cached one is older than the budget.
    pub fn get(&self) -> Result<Arc<TemporaryCredential>, CredentialError> {
        let mut slot = self.lock()?;
        if let Some(cached) = slot.as_ref() {
            if cached.age(self.clock.now()) <= self.budget {
                return Ok(Arc::clone(cached));
            }
            tracing::debug!(issued_at = %cached.issued_at, "{LOG_TAG} cached credential expired");
        }
        self.fetch_into(&mut slot)
    }

    /// Fetch and replace unconditionally.
    pub fn refresh(&self) -> Result<Arc<TemporaryCredential>, CredentialError> {
        let mut slot = self.lock()?;
        self.fetch_into(&mut slot)
    }

    /// Number of fetches performed so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Arc<TemporaryCredential>>>, CredentialError> {
        self.slot.lock().map_err(|_| CredentialError::Poisoned)
    }

    /// Runs with the slot lock held, so only one fetch is ever in flight.
    fn fetch_into(
        &self,
        slot: &mut Option<Arc<TemporaryCredential>>,
    ) -> Result<Arc<TemporaryCredential>, CredentialError> {
        let credentials = self.source.fetch()?;
        let fresh = Arc::new(TemporaryCredential {
            credentials,
            issued_at: self.clock.now(),
        });
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *slot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}

impl<S: CredentialSource> CredentialProvider for CachedCredentials<S> {
    fn credentials(&self) -> Result<Arc<TemporaryCredential>, CredentialError> {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Source that issues numbered credentials
    struct CountingSource {
        issued: AtomicU64,
        delay: std::time::Duration,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                issued: AtomicU64::new(0),
                delay: std::time::Duration::ZERO,
            }
        }
    }

    impl CredentialSource for CountingSource {
        fn fetch(&self) -> Result<ArtifactCredentials, CredentialError> {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ArtifactCredentials {
                access_key_id: format!("AKID-{}", n),
                secret_access_key: format!("secret-{}", n),
                session_token: format!("token-{}", n),
            })
        }
    }

    struct FailingSource;

    impl CredentialSource for FailingSource {
        fn fetch(&self) -> Result<ArtifactCredentials, CredentialError> {
            Err(CredentialError::Missing {
                job_id: "job-1".to_string(),
            })
        }
    }

    #[test]
    fn test_budget_is_inside_validity_window() {
        assert!(CACHE_BUDGET_SECS < CREDENTIAL_VALIDITY_SECS);
    }

    #[test]
    fn test_get_within_budget_returns_same_instance() {
        let clock = ManualClock::default();
        let cache = CachedCredentials::with_clock(CountingSource::new(), Arc::new(clock.clone()));

        let first = cache.get().unwrap();
        clock.advance(Duration::minutes(14));
        let second = cache.get().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn test_get_past_budget_fetches_once_more() {
        let clock = ManualClock::default();
        let cache = CachedCredentials::with_clock(CountingSource::new(), Arc::new(clock.clone()));

        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        clock.advance(cache_budget() + Duration::seconds(1));
        let third = cache.get().unwrap();

        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.credentials.access_key_id, "AKID-2");
        assert_eq!(cache.fetch_count(), 2);

        // The new credential starts its own budget
        let fourth = cache.get().unwrap();
        assert!(Arc::ptr_eq(&third, &fourth));
    }

    #[test]
    fn test_issued_at_is_fetch_time() {
        let clock = ManualClock::default();
        let start = clock.now();
        let cache = CachedCredentials::with_clock(CountingSource::new(), Arc::new(clock.clone()));

        clock.advance(Duration::minutes(2));
        let credential = cache.get().unwrap();
        assert_eq!(credential.issued_at, start + Duration::minutes(2));
    }

    #[test]
    fn test_refresh_is_unconditional() {
        let clock = ManualClock::default();
        let cache = CachedCredentials::with_clock(CountingSource::new(), Arc::new(clock));

        let first = cache.get().unwrap();
        let refreshed = cache.refresh().unwrap();
        let after = cache.get().unwrap();

        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert!(Arc::ptr_eq(&refreshed, &after));
        assert_eq!(cache.fetch_count(), 2);
    }

    #[test]
    fn test_concurrent_gets_fetch_once() {
        let source = CountingSource {
            issued: AtomicU64::new(0),
            delay: std::time::Duration::from_millis(20),
        };
        let cache = Arc::new(CachedCredentials::new(source));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get().unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.fetch_count(), 1);
        assert!(results.iter().all(|c| Arc::ptr_eq(c, &results[0])));
    }

    #[test]
    fn test_fetch_failure_leaves_cache_empty() {
        let cache = CachedCredentials::new(FailingSource);
        assert!(matches!(cache.get(), Err(CredentialError::Missing { .. })));
        assert_eq!(cache.fetch_count(), 0);
    }
}
