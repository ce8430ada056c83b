//! Top-level entry point: decides whether a collection is needed,
//! computes the byte target, drives the engine, and reports the outcome.
//! Also owns the periodic background loop the enclosing agent would
//! otherwise have to wire up itself.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::detector::Detector;
use crate::engine::FreeSpaceEngine;
use crate::errors::GcError;
use crate::fs_stats::FsStatsProvider;
use crate::metrics::Metrics;
use crate::planner::EvictionPlanner;
use crate::policy::{self, ImageGcPolicy, ValidationError};
use crate::record::{ImageRecord, ImageRecordStore};
use crate::recorder::EventRecorder;
use crate::runtime::ContainerRuntime;

/// Cadence of the two periodic loops `start()` spawns. Scheduling cadence
/// is a concern of the enclosing agent, not the core policy; this struct
/// exists only so the CLI has a non-bespoke way to express that cadence.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicConfig {
    pub detect_period: Duration,
    pub collect_period: Duration,
}

pub struct ImageGcManager {
    runtime: Arc<dyn ContainerRuntime>,
    stats: Arc<dyn FsStatsProvider>,
    recorder: Arc<dyn EventRecorder>,
    clock: Arc<dyn Clock>,
    policy: ImageGcPolicy,
    store: Arc<ImageRecordStore>,
    planner: EvictionPlanner,
    engine: FreeSpaceEngine,
    metrics: Arc<Metrics>,
    // Serializes the periodic loop against one-shot calls, so the Detector
    // and Free-Space Engine are never driven concurrently from two
    // callers (the controller, not its collaborators, owns serialization).
    run_lock: tokio::sync::Mutex<()>,
}

impl ImageGcManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        stats: Arc<dyn FsStatsProvider>,
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
        policy: ImageGcPolicy,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ValidationError> {
        policy::validate(&policy)?;

        let store = Arc::new(ImageRecordStore::new());
        let detector = Detector::new(runtime.clone(), store.clone());
        let planner = EvictionPlanner::new(detector, store.clone());
        let engine = FreeSpaceEngine::new(runtime.clone(), store.clone(), policy, metrics.clone(), recorder.clone());

        Ok(ImageGcManager {
            runtime,
            stats,
            recorder,
            clock,
            policy,
            store,
            planner,
            engine,
            metrics,
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Spawns the periodic detection loop and the periodic collection
    /// loop. Each is a `loop` that runs an iteration, then sleeps until
    /// the next period or cancellation, whichever comes first.
    pub fn start(self: &Arc<Self>, periods: PeriodicConfig, cancel: CancellationToken) {
        let detect_manager = self.clone();
        let detect_cancel = cancel.clone();
        tokio::spawn(async move {
            detect_manager
                .run_periodically(periods.detect_period, detect_cancel, |m, c| {
                    Box::pin(async move {
                        let now = m.clock.now();
                        if let Err(e) = m.planner.images_in_eviction_order(now, &c).await {
                            warn!(error = %e, "periodic detection failed");
                        }
                    })
                })
                .await;
        });

        let collect_manager = self.clone();
        let collect_cancel = cancel;
        tokio::spawn(async move {
            collect_manager
                .run_periodically(periods.collect_period, collect_cancel, |m, c| {
                    Box::pin(async move {
                        if let Err(e) = m.garbage_collect(&c).await {
                            warn!(error = %e, "periodic collection failed");
                            m.recorder.collection_failed(&e);
                        }
                    })
                })
                .await;
        });
    }

    async fn run_periodically<F>(self: Arc<Self>, period: Duration, cancel: CancellationToken, iteration: F)
    where
        F: Fn(Arc<Self>, CancellationToken) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>,
    {
        loop {
            let start = tokio::time::Instant::now();
            iteration(self.clone(), cancel.clone()).await;

            let sleep_until = start + period;
            if tokio::time::timeout_at(sleep_until, cancel.cancelled())
                .await
                .is_ok()
            {
                break;
            }
        }
    }

    /// One-shot collection cycle.
    #[instrument(skip_all)]
    pub async fn garbage_collect(&self, cancel: &CancellationToken) -> Result<(), GcError> {
        let _guard = self.run_lock.lock().await;
        let started = std::time::Instant::now();
        let result = self.garbage_collect_inner(cancel).await;
        self.metrics
            .observe_collection_duration(started.elapsed().as_secs_f64());
        self.metrics.set_record_store_size(self.store.len());
        result
    }

    async fn garbage_collect_inner(&self, cancel: &CancellationToken) -> Result<(), GcError> {
        let now = self.clock.now();

        // Step 1: age sweep runs first, unconditional of fullness, and its
        // deletions must be visible to the capacity sweep that follows.
        let candidates = self.planner.images_in_eviction_order(now, cancel).await?;
        let candidates = self.engine.free_old_images(candidates, now, cancel).await?;

        // Step 2: query current fullness.
        let usage = self.stats.image_fs_stats().await?;
        if usage.capacity_bytes == 0 {
            return Ok(());
        }

        let used = usage.capacity_bytes.saturating_sub(usage.available_bytes);
        let used_pct = (used as u128 * 100) / usage.capacity_bytes as u128;

        if used_pct < self.policy.high_threshold_percent as u128 {
            return Ok(());
        }

        let target_used = (usage.capacity_bytes as u128 * self.policy.low_threshold_percent as u128) / 100;
        let bytes_to_free = (used as u128).saturating_sub(target_used) as u64;

        let (freed, failures) = self
            .engine
            .free_space(bytes_to_free, now, candidates, cancel)
            .await?;

        if freed < bytes_to_free {
            return Err(GcError::Shortfall {
                requested: bytes_to_free,
                freed,
                failures: if failures.is_empty() { None } else { Some(failures) },
            });
        }

        info!(freed, bytes_to_free, "garbage collection cycle complete");
        Ok(())
    }

    /// Aggressive eviction of every unpinned, unreferenced image,
    /// bypassing thresholds and ages entirely.
    #[instrument(skip_all)]
    pub async fn delete_unused_images(&self, cancel: &CancellationToken) -> Result<(), GcError> {
        let _guard = self.run_lock.lock().await;
        let now = self.clock.now();
        let candidates = self.planner.images_in_eviction_order(now, cancel).await?;
        let (freed, _failures) = self
            .engine
            .delete_unused_images(candidates, cancel)
            .await?;
        info!(freed, "deleted all unused images");
        Ok(())
    }

    // --- test-only accessors ---

    pub fn image_records_len(&self) -> usize {
        self.store.len()
    }

    pub fn get_image_record(&self, id: &str) -> Option<ImageRecord> {
        self.store.get(id)
    }
}
