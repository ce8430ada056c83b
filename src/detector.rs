//! Reconciles the runtime's current image/pod state against the record
//! store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::DetectError;
use crate::record::ImageRecordStore;
use crate::runtime::ContainerRuntime;

pub struct Detector {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<ImageRecordStore>,
}

impl Detector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, store: Arc<ImageRecordStore>) -> Self {
        Detector { runtime, store }
    }

    /// Run one detection scan at `now`, returning the set of image ids
    /// referenced by at least one container. None of the I/O happens
    /// while the store lock is held.
    pub async fn detect(
        &self,
        now: SystemTime,
        cancel: &CancellationToken,
    ) -> Result<HashSet<String>, DetectError> {
        if cancel.is_cancelled() {
            return Err(DetectError::Cancelled);
        }

        // Step 1: collect image ids referenced by any container. Containers
        // with an empty image id are ignored.
        let pods = self.runtime.list_pods().await?;
        let in_use: HashSet<String> = pods
            .into_iter()
            .flat_map(|pod| pod.containers.into_iter())
            .map(|c| c.image_id)
            .filter(|id| !id.is_empty())
            .collect();

        if cancel.is_cancelled() {
            return Err(DetectError::Cancelled);
        }

        // Step 2: current runtime image set.
        let current_images = self.runtime.list_images().await?;
        let current_ids: HashSet<String> =
            current_images.iter().map(|img| img.id.clone()).collect();

        // Step 3: insert-or-update every currently reported image. If the
        // runtime reports the same id twice (e.g. a pinned and unpinned
        // duplicate), the later entry in this loop wins: the record
        // reflects whichever entry was observed last.
        for image in &current_images {
            let image_in_use = in_use.contains(&image.id);
            self.store
                .upsert_seen(&image.id, now, image.size_bytes, image.pinned, image_in_use);
        }

        // Step 4: drop records for ids the runtime no longer reports.
        let removed = self.store.retain_only(&current_ids);
        if !removed.is_empty() {
            debug!(count = removed.len(), "dropped vanished image records");
        }

        Ok(in_use)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerInfo, PodSandbox, RuntimeError, RuntimeImage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedRuntime {
        images: Vec<RuntimeImage>,
        pods: Vec<PodSandbox>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerRuntime for FixedRuntime {
        async fn list_images(&self) -> Result<Vec<RuntimeImage>, RuntimeError> {
            Ok(self.images.clone())
        }
        async fn list_pods(&self) -> Result<Vec<PodSandbox>, RuntimeError> {
            Ok(self.pods.clone())
        }
        async fn remove_image(&self, id: &str) -> Result<(), RuntimeError> {
            self.removed.lock().unwrap().push(id.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn initial_detect_mixed_usage() {
        let runtime = Arc::new(FixedRuntime {
            images: vec![
                RuntimeImage { id: "img0".into(), size_bytes: 1024, pinned: false },
                RuntimeImage { id: "img1".into(), size_bytes: 2048, pinned: false },
                RuntimeImage { id: "img2".into(), size_bytes: 2048, pinned: false },
            ],
            pods: vec![PodSandbox {
                containers: vec![
                    ContainerInfo { image_id: "img1".into(), image_name: None },
                    ContainerInfo { image_id: "img2".into(), image_name: Some("img2:latest".into()) },
                ],
            }],
            removed: Mutex::new(Vec::new()),
        });
        let store = Arc::new(ImageRecordStore::new());
        let detector = Detector::new(runtime, store.clone());

        let cancel = CancellationToken::new();
        let in_use = detector
            .detect(crate::record::ZERO_TIME, &cancel)
            .await
            .unwrap();
        assert_eq!(in_use.len(), 2);
        assert_eq!(store.len(), 3);

        let img0 = store.get("img0").unwrap();
        assert_eq!(img0.first_detected, crate::record::ZERO_TIME);
        assert_eq!(img0.last_used, crate::record::ZERO_TIME);

        let img1 = store.get("img1").unwrap();
        assert_eq!(img1.last_used, crate::record::ZERO_TIME);
    }

    #[tokio::test]
    async fn vanished_image_is_removed() {
        let runtime = Arc::new(FixedRuntime {
            images: vec![RuntimeImage { id: "img0".into(), size_bytes: 10, pinned: false }],
            pods: vec![],
            removed: Mutex::new(Vec::new()),
        });
        let store = Arc::new(ImageRecordStore::new());
        store.upsert_seen("stale", SystemTime::now(), 1, false, false);

        let detector = Detector::new(runtime, store.clone());
        let cancel = CancellationToken::new();
        detector.detect(SystemTime::now(), &cancel).await.unwrap();

        assert!(store.get("stale").is_none());
        assert!(store.get("img0").is_some());
    }

    #[tokio::test]
    async fn empty_image_id_ignored() {
        let runtime = Arc::new(FixedRuntime {
            images: vec![RuntimeImage { id: "img0".into(), size_bytes: 10, pinned: false }],
            pods: vec![PodSandbox {
                containers: vec![ContainerInfo { image_id: String::new(), image_name: None }],
            }],
            removed: Mutex::new(Vec::new()),
        });
        let store = Arc::new(ImageRecordStore::new());
        let detector = Detector::new(runtime, store);
        let cancel = CancellationToken::new();
        let in_use = detector.detect(SystemTime::now(), &cancel).await.unwrap();
        assert!(in_use.is_empty());
    }
}
