//! Read-only (plus delete) view of the container runtime, modeled as a
//! collaborator trait object so a fake implementation can back tests.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("listing images: {0}")]
    ListImages(String),
    #[error("listing pods: {0}")]
    ListPods(String),
    #[error("removing image {id}: {reason}")]
    RemoveImage { id: String, reason: String },
}

/// An image as reported by `listImages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeImage {
    pub id: String,
    pub size_bytes: u64,
    pub pinned: bool,
}

/// A single container within a pod, as reported by `listPods`.
///
/// `image_name` (the human-readable reference, e.g. `nginx:latest`) is
/// carried for parity with the runtime's reporting shape but is never
/// used for identity; only `image_id` is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub image_id: String,
    pub image_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSandbox {
    pub containers: Vec<ContainerInfo>,
}

/// Read-only view of the container runtime, plus the ability to delete an
/// image by id.
///
/// `remove_image` must be idempotent: removing an id the runtime no
/// longer has is a successful no-op (treat "not found" as a successful
/// deletion).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_images(&self) -> Result<Vec<RuntimeImage>, RuntimeError>;
    async fn list_pods(&self) -> Result<Vec<PodSandbox>, RuntimeError>;
    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError>;
}
