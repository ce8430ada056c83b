//! Consumes an ordered candidate sequence and deletes images until a byte
//! target is met or the sequence is exhausted; also implements the
//! age-driven sweep and the unconditional delete-unused entry point.

use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{Cancelled, DeleteFailures};
use crate::metrics::Metrics;
use crate::planner::EvictionCandidate;
use crate::policy::ImageGcPolicy;
use crate::record::{elapsed_since, ImageRecordStore};
use crate::recorder::EventRecorder;
use crate::runtime::ContainerRuntime;

/// Label used on the per-sweep-kind metrics counters.
#[derive(Debug, Clone, Copy)]
pub enum SweepKind {
    Age,
    Capacity,
    DeleteUnused,
}

impl SweepKind {
    fn as_str(self) -> &'static str {
        match self {
            SweepKind::Age => "age",
            SweepKind::Capacity => "capacity",
            SweepKind::DeleteUnused => "delete_unused",
        }
    }
}

pub struct FreeSpaceEngine {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<ImageRecordStore>,
    policy: ImageGcPolicy,
    metrics: Arc<Metrics>,
    recorder: Arc<dyn EventRecorder>,
}

impl FreeSpaceEngine {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<ImageRecordStore>,
        policy: ImageGcPolicy,
        metrics: Arc<Metrics>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        FreeSpaceEngine {
            runtime,
            store,
            policy,
            metrics,
            recorder,
        }
    }

    /// Capacity-driven eviction: delete candidates, in the order given,
    /// until `bytes_to_free` is reclaimed or the list is exhausted.
    /// Candidates younger than `minAge` are skipped, not deferred (they
    /// are never deleted by this call even if nothing else meets the
    /// target).
    pub async fn free_space(
        &self,
        bytes_to_free: u64,
        now: SystemTime,
        candidates: Vec<EvictionCandidate>,
        cancel: &CancellationToken,
    ) -> Result<(u64, DeleteFailures), Cancelled> {
        let min_age = self.policy.min_age;
        let outcome = self
            .sweep(
                candidates,
                cancel,
                SweepKind::Capacity,
                |c| elapsed_since(c.first_detected, now) >= min_age,
                Some(bytes_to_free),
            )
            .await?;
        Ok((outcome.freed, outcome.failures))
    }

    /// Age-driven eviction: delete every candidate whose `lastUsed` is
    /// older than `maxAge`, regardless of fullness. Returns the
    /// candidates that were *not* evicted, ready for a subsequent
    /// capacity sweep. `maxAge == 0` is the identity (age sweep disabled).
    pub async fn free_old_images(
        &self,
        candidates: Vec<EvictionCandidate>,
        now: SystemTime,
        cancel: &CancellationToken,
    ) -> Result<Vec<EvictionCandidate>, Cancelled> {
        if !self.policy.age_sweep_enabled() {
            return Ok(candidates);
        }

        let max_age = self.policy.max_age;
        let outcome = self
            .sweep(
                candidates,
                cancel,
                SweepKind::Age,
                |c| elapsed_since(c.last_used, now) > max_age,
                None,
            )
            .await?;
        Ok(outcome.remaining)
    }

    /// Bypasses the policy entirely: evict every candidate. Consults no
    /// thresholds or ages.
    pub async fn delete_unused_images(
        &self,
        candidates: Vec<EvictionCandidate>,
        cancel: &CancellationToken,
    ) -> Result<(u64, DeleteFailures), Cancelled> {
        let outcome = self
            .sweep(candidates, cancel, SweepKind::DeleteUnused, |_| true, None)
            .await?;
        Ok((outcome.freed, outcome.failures))
    }

    /// Shared delete loop backing all three public entry points above.
    ///
    /// `eligible` decides whether a candidate may be deleted at all in
    /// this sweep. Ineligible candidates are left untouched and returned
    /// in `remaining`. `stop_once_freed`, when set, ends the loop as soon
    /// as that many bytes have been reclaimed, leaving any unprocessed
    /// candidates in `remaining` too.
    async fn sweep(
        &self,
        candidates: Vec<EvictionCandidate>,
        cancel: &CancellationToken,
        kind: SweepKind,
        eligible: impl Fn(&EvictionCandidate) -> bool,
        stop_once_freed: Option<u64>,
    ) -> Result<SweepOutcome, Cancelled> {
        let mut freed = 0u64;
        let mut failures = DeleteFailures::default();
        let mut remaining = Vec::new();
        let mut candidates = candidates.into_iter();

        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            if let Some(target) = stop_once_freed {
                if freed >= target {
                    remaining.extend(candidates);
                    break;
                }
            }

            let Some(candidate) = candidates.next() else {
                break;
            };

            if !eligible(&candidate) {
                remaining.push(candidate);
                continue;
            }

            match self.runtime.remove_image(&candidate.id).await {
                Ok(()) => {
                    freed += candidate.size;
                    self.store.remove(&candidate.id);
                    self.metrics.images_deleted_total(kind.as_str()).inc();
                    self.metrics.bytes_freed_total().inc_by(candidate.size as f64);
                    self.recorder.image_freed(&candidate.id, candidate.size);
                    info!(id = %candidate.id, size = candidate.size, sweep = kind.as_str(), "evicted image");
                }
                Err(e) => {
                    warn!(id = %candidate.id, error = %e, sweep = kind.as_str(), "failed to evict image, continuing sweep");
                    failures.record(candidate.size, &e);
                    self.metrics.delete_failures_total().inc();
                    remaining.push(candidate);
                }
            }
        }

        Ok(SweepOutcome {
            freed,
            failures,
            remaining,
        })
    }
}

struct SweepOutcome {
    freed: u64,
    failures: DeleteFailures,
    remaining: Vec<EvictionCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::TracingEventRecorder;
    use crate::runtime::{PodSandbox, RuntimeError, RuntimeImage};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MapRuntime {
        images: Mutex<HashMap<String, RuntimeImage>>,
        fail: Vec<String>,
    }

    #[async_trait]
    impl ContainerRuntime for MapRuntime {
        async fn list_images(&self) -> Result<Vec<RuntimeImage>, RuntimeError> {
            Ok(self.images.lock().unwrap().values().cloned().collect())
        }
        async fn list_pods(&self) -> Result<Vec<PodSandbox>, RuntimeError> {
            Ok(vec![])
        }
        async fn remove_image(&self, id: &str) -> Result<(), RuntimeError> {
            if self.fail.iter().any(|f| f == id) {
                return Err(RuntimeError::RemoveImage {
                    id: id.to_string(),
                    reason: "simulated failure".into(),
                });
            }
            self.images.lock().unwrap().remove(id);
            Ok(())
        }
    }

    fn candidate(id: &str, size: u64, last_used_secs: u64, first_detected_secs: u64) -> EvictionCandidate {
        EvictionCandidate {
            id: id.to_string(),
            size,
            first_detected: SystemTime::UNIX_EPOCH + Duration::from_secs(first_detected_secs),
            last_used: SystemTime::UNIX_EPOCH + Duration::from_secs(last_used_secs),
        }
    }

    fn policy(min_age: Duration, max_age: Duration) -> ImageGcPolicy {
        ImageGcPolicy {
            high_threshold_percent: 90,
            low_threshold_percent: 80,
            min_age,
            max_age,
        }
    }

    #[tokio::test]
    async fn free_space_stops_once_target_met() {
        let mut images = HashMap::new();
        images.insert("img0".to_string(), RuntimeImage { id: "img0".into(), size_bytes: 1024, pinned: false });
        images.insert("img1".to_string(), RuntimeImage { id: "img1".into(), size_bytes: 2048, pinned: false });
        let runtime = Arc::new(MapRuntime { images: Mutex::new(images), fail: vec![] });
        let store = Arc::new(ImageRecordStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let engine = FreeSpaceEngine::new(runtime.clone(), store, policy(Duration::ZERO, Duration::ZERO), metrics, Arc::new(TracingEventRecorder));

        let candidates = vec![candidate("img0", 1024, 0, 0), candidate("img1", 2048, 60, 0)];
        let (freed, failures) = engine
            .free_space(1024, SystemTime::UNIX_EPOCH + Duration::from_secs(120), candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(freed, 1024);
        assert!(failures.is_empty());
        assert_eq!(runtime.images.lock().unwrap().len(), 1);
        assert!(runtime.images.lock().unwrap().contains_key("img1"));
    }

    #[tokio::test]
    async fn free_space_respects_min_age() {
        let mut images = HashMap::new();
        images.insert("img0".to_string(), RuntimeImage { id: "img0".into(), size_bytes: 1024, pinned: false });
        let runtime = Arc::new(MapRuntime { images: Mutex::new(images), fail: vec![] });
        let store = Arc::new(ImageRecordStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let engine = FreeSpaceEngine::new(runtime.clone(), store, policy(Duration::from_secs(60), Duration::ZERO), metrics, Arc::new(TracingEventRecorder));

        let candidates = vec![candidate("img0", 1024, 0, 0)];
        let (freed, _) = engine
            .free_space(1024, SystemTime::UNIX_EPOCH, candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(freed, 0);
        assert_eq!(runtime.images.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_failure_does_not_abort_sweep() {
        let mut images = HashMap::new();
        images.insert("bad".to_string(), RuntimeImage { id: "bad".into(), size_bytes: 10, pinned: false });
        images.insert("good".to_string(), RuntimeImage { id: "good".into(), size_bytes: 10, pinned: false });
        let runtime = Arc::new(MapRuntime { images: Mutex::new(images), fail: vec!["bad".to_string()] });
        let store = Arc::new(ImageRecordStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let engine = FreeSpaceEngine::new(runtime.clone(), store, policy(Duration::ZERO, Duration::ZERO), metrics, Arc::new(TracingEventRecorder));

        let candidates = vec![candidate("bad", 10, 0, 0), candidate("good", 10, 0, 0)];
        let (freed, failures) = engine
            .free_space(20, SystemTime::UNIX_EPOCH + Duration::from_secs(5), candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(freed, 10);
        assert_eq!(failures.count, 1);
        assert!(!runtime.images.lock().unwrap().contains_key("good"));
        assert!(runtime.images.lock().unwrap().contains_key("bad"));
    }

    #[tokio::test]
    async fn free_old_images_identity_when_disabled() {
        let runtime = Arc::new(MapRuntime { images: Mutex::new(HashMap::new()), fail: vec![] });
        let store = Arc::new(ImageRecordStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let engine = FreeSpaceEngine::new(runtime, store, policy(Duration::ZERO, Duration::ZERO), metrics, Arc::new(TracingEventRecorder));

        let candidates = vec![candidate("img0", 10, 0, 0)];
        let remaining = engine
            .free_old_images(candidates.clone(), SystemTime::now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(remaining, candidates);
    }

    #[tokio::test]
    async fn free_old_images_evicts_past_max_age() {
        let mut images = HashMap::new();
        images.insert("img0".to_string(), RuntimeImage { id: "img0".into(), size_bytes: 10, pinned: false });
        let runtime = Arc::new(MapRuntime { images: Mutex::new(images), fail: vec![] });
        let store = Arc::new(ImageRecordStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let engine = FreeSpaceEngine::new(runtime.clone(), store, policy(Duration::ZERO, Duration::from_secs(60)), metrics, Arc::new(TracingEventRecorder));

        let candidate0 = candidate("img0", 10, 0, 0);
        let remaining = engine
            .free_old_images(vec![candidate0.clone()], SystemTime::UNIX_EPOCH, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);

        let remaining = engine
            .free_old_images(
                vec![candidate0],
                SystemTime::UNIX_EPOCH + Duration::from_secs(61),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(remaining.is_empty());
        assert!(runtime.images.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unused_ignores_age_and_target() {
        let mut images = HashMap::new();
        images.insert("img0".to_string(), RuntimeImage { id: "img0".into(), size_bytes: 10, pinned: false });
        let runtime = Arc::new(MapRuntime { images: Mutex::new(images), fail: vec![] });
        let store = Arc::new(ImageRecordStore::new());
        let metrics = Arc::new(Metrics::new_for_test());
        let engine = FreeSpaceEngine::new(runtime.clone(), store, policy(Duration::from_secs(3600), Duration::ZERO), metrics, Arc::new(TracingEventRecorder));

        let candidates = vec![candidate("img0", 10, 0, 0)];
        let (freed, failures) = engine
            .delete_unused_images(candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(freed, 10);
        assert!(failures.is_empty());
    }
}
