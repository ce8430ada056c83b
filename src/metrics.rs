//! Prometheus metrics, wrapping `prometheus::register_*` behind a small
//! struct rather than scattering bare globals through the codebase.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub struct Metrics {
    registry: Registry,
    bytes_freed_total: prometheus::Counter,
    images_deleted_total: IntCounterVec,
    delete_failures_total: IntCounter,
    collection_duration_seconds: Histogram,
    record_store_size: IntGauge,
}

impl Metrics {
    /// Creates a fresh, privately-owned registry (rather than the
    /// process-global default) so a caller can construct more than one
    /// `Metrics` (one per test, say) without hitting prometheus's
    /// duplicate-registration panic.
    pub fn new() -> Self {
        let registry = Registry::new();

        let bytes_freed_total = prometheus::Counter::with_opts(Opts::new(
            "image_gc_bytes_freed_total",
            "Total bytes freed by the image garbage collector.",
        ))
        .expect("metric options are valid");

        let images_deleted_total = IntCounterVec::new(
            Opts::new(
                "image_gc_images_deleted_total",
                "Total images deleted by the image garbage collector, by sweep kind.",
            ),
            &["sweep"],
        )
        .expect("metric options are valid");

        let delete_failures_total = IntCounter::with_opts(Opts::new(
            "image_gc_delete_failures_total",
            "Total image delete attempts that failed.",
        ))
        .expect("metric options are valid");

        let collection_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "image_gc_collection_duration_seconds",
            "Wall-clock duration of a garbage_collect() cycle.",
        ))
        .expect("metric options are valid");

        let record_store_size = IntGauge::with_opts(Opts::new(
            "image_gc_record_store_size",
            "Number of image records currently tracked.",
        ))
        .expect("metric options are valid");

        registry
            .register(Box::new(bytes_freed_total.clone()))
            .expect("metric registration cannot fail on a fresh registry");
        registry
            .register(Box::new(images_deleted_total.clone()))
            .expect("metric registration cannot fail on a fresh registry");
        registry
            .register(Box::new(delete_failures_total.clone()))
            .expect("metric registration cannot fail on a fresh registry");
        registry
            .register(Box::new(collection_duration_seconds.clone()))
            .expect("metric registration cannot fail on a fresh registry");
        registry
            .register(Box::new(record_store_size.clone()))
            .expect("metric registration cannot fail on a fresh registry");

        Metrics {
            registry,
            bytes_freed_total,
            images_deleted_total,
            delete_failures_total,
            collection_duration_seconds,
            record_store_size,
        }
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self::new()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bytes_freed_total(&self) -> &prometheus::Counter {
        &self.bytes_freed_total
    }

    pub fn images_deleted_total(&self, sweep: &str) -> prometheus::IntCounter {
        self.images_deleted_total.with_label_values(&[sweep])
    }

    pub fn delete_failures_total(&self) -> &IntCounter {
        &self.delete_failures_total
    }

    pub fn observe_collection_duration(&self, seconds: f64) {
        self.collection_duration_seconds.observe(seconds);
    }

    pub fn set_record_store_size(&self, size: usize) {
        self.record_store_size.set(size as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
