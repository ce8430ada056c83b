//! Produces the totally ordered eviction candidate sequence.

use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::detector::Detector;
use crate::errors::DetectError;
use crate::record::{ImageRecord, ImageRecordStore};

/// A non-pinned, not-currently-in-use image, ready to be considered for
/// eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub id: String,
    pub first_detected: SystemTime,
    pub last_used: SystemTime,
    pub size: u64,
}

impl From<ImageRecord> for EvictionCandidate {
    fn from(record: ImageRecord) -> Self {
        EvictionCandidate {
            id: record.id,
            first_detected: record.first_detected,
            last_used: record.last_used,
            size: record.size,
        }
    }
}

pub struct EvictionPlanner {
    detector: Detector,
    store: Arc<ImageRecordStore>,
}

impl EvictionPlanner {
    pub fn new(detector: Detector, store: Arc<ImageRecordStore>) -> Self {
        EvictionPlanner { detector, store }
    }

    /// Run a fresh detection, then return candidates in eviction order:
    /// least-recently-used first, ties broken by oldest `firstDetected`,
    /// remaining ties broken by id for a fully deterministic total order.
    pub async fn images_in_eviction_order(
        &self,
        now: SystemTime,
        cancel: &CancellationToken,
    ) -> Result<Vec<EvictionCandidate>, DetectError> {
        let in_use = self.detector.detect(now, cancel).await?;

        let mut candidates: Vec<EvictionCandidate> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|record| !in_use.contains(&record.id) && !record.pinned)
            .map(EvictionCandidate::from)
            .collect();

        candidates.sort_by(|a, b| {
            a.last_used
                .cmp(&b.last_used)
                .then(a.first_detected.cmp(&b.first_detected))
                .then(a.id.cmp(&b.id))
        });

        Ok(candidates)
    }
}
