//! Fire-and-forget event notifications. Has no semantic effect on
//! collection outcomes; it exists purely so operators and observability
//! pipelines learn when images were freed or a cycle failed.

use crate::errors::GcError;

pub trait EventRecorder: Send + Sync {
    fn image_freed(&self, id: &str, bytes: u64);
    fn collection_failed(&self, error: &GcError);
}

/// Default recorder: turns events into `tracing` records, the baseline
/// observability surface used before any external sink is wired up.
#[derive(Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn image_freed(&self, id: &str, bytes: u64) {
        tracing::info!(id, bytes, "image freed");
    }

    fn collection_failed(&self, error: &GcError) {
        tracing::warn!(error = %error, "image collection failed");
    }
}
