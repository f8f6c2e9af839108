//! Process-wide single-flight memoisation of phase results

use crate::{Error, Result};
use deploy_model::{ArtifactCollection, Phase, PhaseResult};
use futures::channel::oneshot;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Key identifying one memoised phase execution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The phase that ran
    pub phase: Phase,
    /// The service it ran for
    pub service: String,
    /// Stable hash of the previous phase's artifacts, if any
    pub inputs: Option<u64>,
}

impl CacheKey {
    /// Create a cache key
    pub fn new(phase: Phase, service: impl Into<String>, inputs: Option<u64>) -> Self {
        Self {
            phase,
            service: service.into(),
            inputs,
        }
    }
}

/// Stable hash over the ordered (kind, location) pairs of a collection
pub fn input_hash(artifacts: &ArtifactCollection) -> u64 {
    let mut hasher = DefaultHasher::new();
    for artifact in artifacts.iter() {
        artifact.kind.hash(&mut hasher);
        artifact.location.hash(&mut hasher);
    }
    hasher.finish()
}

type Waiter = oneshot::Sender<std::result::Result<Arc<PhaseResult>, Arc<Error>>>;

enum Slot {
    Ready(Arc<PhaseResult>),
    InFlight(Vec<Waiter>),
}

/// Shared memoisation of phase results, keyed by (phase, service, inputs).
///
/// Values are held for the life of the process; there is no expiry. The
/// cache may be shared across [`ServiceManager`](crate::ServiceManager)
/// instances so that e.g. a `build` run by an earlier `package` command is
/// not repeated by a later `deploy` in the same process.
///
/// Computation is single-flight per key: the first caller runs it and every
/// concurrent caller for the same key receives the same result instance.
/// Failures are never cached.
#[derive(Clone, Default)]
pub struct OperationCache {
    slots: Arc<Mutex<HashMap<CacheKey, Slot>>>,
}

impl OperationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek at a cached result without computing
    pub fn get(&self, key: &CacheKey) -> Option<Arc<PhaseResult>> {
        match self.slots.lock().unwrap().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the cached result for `key`, or run `compute` to produce it.
    ///
    /// Exactly one caller runs the computation; concurrent callers wait for
    /// and share its outcome.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Arc<PhaseResult>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PhaseResult>>,
    {
        // Fast path / claim leadership; never await while holding the lock.
        // The lock guard must lexically end before any `.await` below (and
        // not merely be `drop()`-ed) or the returned future loses `Send`.
        enum FastPath {
            Ready(Arc<PhaseResult>),
            Wait(oneshot::Receiver<std::result::Result<Arc<PhaseResult>, Arc<Error>>>),
            Lead,
        }

        let fast_path = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get_mut(&key) {
                Some(Slot::Ready(value)) => {
                    debug!("Cache hit for {} {}", key.phase, key.service);
                    FastPath::Ready(value.clone())
                }
                Some(Slot::InFlight(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    FastPath::Wait(rx)
                }
                None => {
                    slots.insert(key.clone(), Slot::InFlight(Vec::new()));
                    FastPath::Lead
                }
            }
        };

        match fast_path {
            FastPath::Ready(value) => return Ok(value),
            FastPath::Wait(rx) => {
                return match rx.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(Error::Shared(error)),
                    // The leader was dropped before completing.
                    Err(_) => Err(Error::Cancelled),
                };
            }
            FastPath::Lead => {}
        }

        // Leader path. The guard clears the in-flight entry if the leader's
        // future is dropped mid-computation, waking waiters with an error.
        let mut guard = LeaderGuard {
            cache: self,
            key: key.clone(),
            armed: true,
        };

        let outcome = compute().await;
        guard.armed = false;

        let waiters = {
            let mut slots = self.slots.lock().unwrap();
            match slots.remove(&key) {
                Some(Slot::InFlight(waiters)) => waiters,
                _ => Vec::new(),
            }
        };

        match outcome {
            Ok(value) => {
                let value = Arc::new(value);
                self.slots
                    .lock()
                    .unwrap()
                    .insert(key, Slot::Ready(value.clone()));
                for waiter in waiters {
                    let _ = waiter.send(Ok(value.clone()));
                }
                Ok(value)
            }
            Err(error) => {
                let error = Arc::new(error);
                for waiter in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
                Err(Error::Shared(error))
            }
        }
    }
}

struct LeaderGuard<'a> {
    cache: &'a OperationCache,
    key: CacheKey,
    armed: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // Dropping the waiters' senders wakes them with a recv error.
            self.cache.slots.lock().unwrap().remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_model::RestoreResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(service: &str) -> CacheKey {
        CacheKey::new(Phase::Restore, service, None)
    }

    fn result() -> PhaseResult {
        PhaseResult::Restore(RestoreResult::default())
    }

    #[smol_potat::test]
    async fn test_second_call_returns_identical_instance() {
        let cache = OperationCache::new();
        let runs = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(key("api"), || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(result())
            })
            .await
            .unwrap();

        let second = cache
            .get_or_compute(key("api"), || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(result())
            })
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[smol_potat::test]
    async fn test_failures_are_not_cached() {
        let cache = OperationCache::new();

        let err = cache
            .get_or_compute(key("api"), || async {
                Err(Error::config("plug-in exploded"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Shared(_)));
        assert!(cache.get(&key("api")).is_none());

        // A later call computes again and may succeed
        let value = cache
            .get_or_compute(key("api"), || async { Ok(result()) })
            .await
            .unwrap();
        assert!(cache.get(&key("api")).is_some());
        assert!(Arc::ptr_eq(&value, &cache.get(&key("api")).unwrap()));
    }

    #[smol_potat::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = OperationCache::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = async_channel::bounded::<()>(1);

        let leader = smol::spawn({
            let cache = cache.clone();
            let runs = runs.clone();
            async move {
                cache
                    .get_or_compute(key("api"), || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.recv().await;
                        Ok(result())
                    })
                    .await
            }
        });

        // Give the leader time to claim the slot
        smol::Timer::after(std::time::Duration::from_millis(20)).await;

        let follower = smol::spawn({
            let cache = cache.clone();
            let runs = runs.clone();
            async move {
                cache
                    .get_or_compute(key("api"), || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(result())
                    })
                    .await
            }
        });

        smol::Timer::after(std::time::Duration::from_millis(20)).await;
        release_tx.send(()).await.unwrap();

        let first = leader.await.unwrap();
        let second = follower.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[smol_potat::test]
    async fn test_distinct_keys_do_not_collide() {
        let cache = OperationCache::new();
        cache
            .get_or_compute(key("api"), || async { Ok(result()) })
            .await
            .unwrap();

        assert!(cache.get(&key("web")).is_none());
        assert!(
            cache
                .get(&CacheKey::new(Phase::Build, "api", None))
                .is_none()
        );
    }

    #[test]
    fn test_input_hash_is_order_sensitive() {
        use deploy_model::{Artifact, ArtifactKind};

        let a = Artifact::local(ArtifactKind::File, "/a").unwrap();
        let b = Artifact::local(ArtifactKind::File, "/b").unwrap();

        let ab: ArtifactCollection = [a.clone(), b.clone()].into_iter().collect();
        let ba: ArtifactCollection = [b, a].into_iter().collect();

        assert_ne!(input_hash(&ab), input_hash(&ba));
        assert_eq!(input_hash(&ab), input_hash(&ab.clone()));
    }
}
