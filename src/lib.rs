//! Image Garbage Collector (IGC): keeps the on-disk container image cache
//! below a configured high-water mark by evicting unused images, while
//! never evicting images referenced by running containers, pinned images,
//! or images younger than a minimum-age grace period.
//!
//! [`record`] is the durable memory, [`detector`] reconciles it against
//! runtime state, [`planner`] orders eviction candidates, [`engine`]
//! performs the actual deletes, and [`controller`] ties it all together
//! as the single entry point an enclosing agent drives periodically.

pub mod clock;
pub mod config;
pub mod controller;
pub mod detector;
pub mod engine;
pub mod errors;
pub mod fs_stats;
pub mod metrics;
pub mod planner;
pub mod policy;
pub mod record;
pub mod recorder;
pub mod runtime;
pub mod runtime_cli;

pub use clock::{Clock, SystemClock};
pub use config::{GcConfig, LogFormat};
pub use controller::{ImageGcManager, PeriodicConfig};
pub use errors::GcError;
pub use fs_stats::{FsStatsProvider, FsUsage, StatvfsFsStats};
pub use metrics::Metrics;
pub use planner::EvictionCandidate;
pub use policy::{ImageGcPolicy, ValidationError};
pub use record::ImageRecord;
pub use recorder::{EventRecorder, TracingEventRecorder};
pub use runtime::{ContainerInfo, ContainerRuntime, PodSandbox, RuntimeError, RuntimeImage};
