//! A [`ContainerRuntime`] implementation that shells out to the `docker`
//! CLI, for use when the enclosing agent has no richer CRI client wired
//! up: spawn the `docker` binary and parse its JSON output rather than
//! link a client library.
//!
//! This is deliberately not a CRI (gRPC) client; implementing one is out
//! of scope. It exists so the `image-gcd` binary has something real to
//! drive.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::runtime::{ContainerInfo, ContainerRuntime, PodSandbox, RuntimeError, RuntimeImage};

const PINNED_LABEL: &str = "io.image-gc.pinned";

pub struct DockerCliRuntime {
    binary: String,
}

impl DockerCliRuntime {
    pub fn new() -> Self {
        DockerCliRuntime {
            binary: "docker".to_string(),
        }
    }
}

impl Default for DockerCliRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct DockerInspectImage {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "Config")]
    config: DockerInspectConfig,
}

#[derive(Deserialize, Default)]
struct DockerInspectConfig {
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

#[derive(Deserialize)]
struct DockerInspectContainer {
    #[serde(rename = "Image")]
    image: String,
}

async fn run_json_lines(binary: &str, args: &[&str]) -> Result<Vec<String>, RuntimeError> {
    let output = Command::new(binary)
        .args(args)
        .output()
        .await
        .map_err(|e| RuntimeError::ListImages(e.to_string()))?;

    if !output.status.success() {
        return Err(RuntimeError::ListImages(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect())
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn list_images(&self) -> Result<Vec<RuntimeImage>, RuntimeError> {
        let ids = run_json_lines(&self.binary, &["image", "ls", "-q", "--no-trunc"]).await?;

        let mut images = Vec::with_capacity(ids.len());
        for id in ids {
            let inspected = run_json_lines(&self.binary, &["image", "inspect", &id]).await?;
            let Some(raw) = inspected.into_iter().next() else {
                continue;
            };
            let parsed: Vec<DockerInspectImage> = serde_json::from_str(&raw)
                .map_err(|e| RuntimeError::ListImages(e.to_string()))?;
            let Some(image) = parsed.into_iter().next() else {
                continue;
            };
            let pinned = image
                .config
                .labels
                .get(PINNED_LABEL)
                .map(|v| v == "true")
                .unwrap_or(false);
            images.push(RuntimeImage {
                id: image.id,
                size_bytes: image.size,
                pinned,
            });
        }
        Ok(images)
    }

    async fn list_pods(&self) -> Result<Vec<PodSandbox>, RuntimeError> {
        let container_ids = run_json_lines(&self.binary, &["ps", "-q"])
            .await
            .map_err(|e| RuntimeError::ListPods(e.to_string()))?;

        let mut pods = Vec::with_capacity(container_ids.len());
        for cid in container_ids {
            let inspected = run_json_lines(&self.binary, &["inspect", &cid])
                .await
                .map_err(|e| RuntimeError::ListPods(e.to_string()))?;
            let Some(raw) = inspected.into_iter().next() else {
                continue;
            };
            let parsed: Vec<DockerInspectContainer> = serde_json::from_str(&raw)
                .map_err(|e| RuntimeError::ListPods(e.to_string()))?;
            let Some(container) = parsed.into_iter().next() else {
                continue;
            };
            pods.push(PodSandbox {
                containers: vec![ContainerInfo {
                    image_id: container.image,
                    image_name: None,
                }],
            });
        }
        Ok(pods)
    }

    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError> {
        let output = Command::new(&self.binary)
            .args(["image", "rm", id])
            .output()
            .await
            .map_err(|e| RuntimeError::RemoveImage {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        // Idempotent delete: an id the runtime no longer has is success.
        if stderr.contains("No such image") {
            return Ok(());
        }

        Err(RuntimeError::RemoveImage {
            id: id.to_string(),
            reason: stderr.into_owned(),
        })
    }
}
