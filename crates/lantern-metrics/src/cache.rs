//! Computation cache.
//!
//! Metric computations are memoized by a content fingerprint of their
//! inputs. The cache is process-scoped with no eviction (it lives for one
//! audit run) and guarantees at-most-one execution per fingerprint even
//! under concurrent callers: the pending cell is shared, never restarted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use lantern_core::Error;
use sha2::{Digest, Sha256};

use crate::metric::MetricResult;

/// Cached outcome of one metric computation. Both sides are shared so the
/// cache can hand the same allocation to every caller.
pub type SharedMetricResult = std::result::Result<Arc<MetricResult>, Arc<Error>>;

/// Keyed store of finished (and in-flight) metric computations.
#[derive(Default)]
pub struct ComputationCache {
    entries: Mutex<HashMap<String, Arc<OnceLock<SharedMetricResult>>>>,
}

impl ComputationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome for `key`, computing it with `compute` if
    /// absent. Concurrent callers with the same key block on the same cell;
    /// exactly one of them runs `compute`.
    pub fn get_or_compute(
        &self,
        key: &str,
        compute: impl FnOnce() -> lantern_core::Result<MetricResult>,
    ) -> SharedMetricResult {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.entry(key.to_string()).or_default().clone()
        };
        cell.get_or_init(|| compute().map(Arc::new).map_err(Arc::new))
            .clone()
    }

    /// Number of fingerprints ever computed or in flight.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable fingerprint over a metric's inputs: the metric name plus the
/// serialized artifacts and settings.
pub fn fingerprint(metric_name: &str, parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(metric_name.as_bytes());
    for part in parts {
        hasher.update([0u8]); // field separator
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_result(timing: f64) -> MetricResult {
        MetricResult {
            timing,
            timestamp: 0.0,
            optimistic_estimate: None,
            pessimistic_estimate: None,
        }
    }

    #[test]
    fn test_computes_once_per_fingerprint() {
        let cache = ComputationCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_compute("abc", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(make_result(42.0))
        });
        let second = cache.get_or_compute("abc", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(make_result(99.0))
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = first.unwrap();
        let second = second.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.timing, 42.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let cache = ComputationCache::new();
        let calls = AtomicUsize::new(0);
        let barrier = std::sync::Barrier::new(4);

        let outcomes: Vec<SharedMetricResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.get_or_compute("shared", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // Keep the computation in flight while the other
                            // callers arrive at the cell.
                            std::thread::sleep(std::time::Duration::from_millis(50));
                            Ok(make_result(7.0))
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = outcomes[0].clone().unwrap();
        for outcome in outcomes {
            assert!(Arc::ptr_eq(&first, &outcome.unwrap()));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_are_cached_too() {
        let cache = ComputationCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let outcome = cache.get_or_compute("bad", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::MetricPrerequisite("missing mark".to_string()))
            });
            assert_eq!(outcome.unwrap_err().code(), "METRIC_PREREQUISITE");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fingerprint_is_input_sensitive() {
        let a = fingerprint("tti", &[b"trace", b"log"]);
        let b = fingerprint("tti", &[b"trace", b"log2"]);
        let c = fingerprint("fcp", &[b"trace", b"log"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, fingerprint("tti", &[b"trace", b"log"]));
    }
}
