//! Container image pulled through containerd

use super::{verify_digest, ImageSource, RootfsImageBuilder};
use crate::error::ExecutorError;
use crate::runner::BoxedRunner;
use agent_client::UpdateRequest;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

const NAMESPACE: &str = "k8s.io";
const MOUNT_DIR_NAME: &str = "rootfs-snapshot";

/// Pulls `containerImage` with `ctr`, checks its digest, mounts the image
/// snapshot and packs it into an ext4 image.
#[derive(Debug, Clone)]
pub struct RegistryImageSource {
    runner: BoxedRunner,
    builder: RootfsImageBuilder,
}

/// Digest column of `ctr images ls` for `image`
fn parse_listed_digest(listing: &str, image: &str) -> Option<String> {
    listing.lines().skip(1).find_map(|line| {
        let mut columns = line.split_whitespace();
        let reference = columns.next()?;
        let _media_type = columns.next()?;
        let digest = columns.next()?;
        (reference == image).then(|| digest.to_string())
    })
}

impl RegistryImageSource {
    pub fn new(runner: BoxedRunner, builder: RootfsImageBuilder) -> Self {
        Self { runner, builder }
    }

    async fn ctr(&self, args: &[&str]) -> Result<String, ExecutorError> {
        let mut full = vec!["-n", NAMESPACE];
        full.extend_from_slice(args);
        Ok(self.runner.run("ctr", &full).await?.stdout)
    }

    async fn listed_digest(&self, image: &str) -> Result<String, ExecutorError> {
        let filter = format!("name=={}", image);
        let listing = self.ctr(&["images", "ls", &filter]).await?;
        parse_listed_digest(&listing, image)
            .ok_or_else(|| ExecutorError::Image(format!("{} not found after pull", image)))
    }
}

#[async_trait]
impl ImageSource for RegistryImageSource {
    async fn prepare(&self, request: &UpdateRequest) -> Result<PathBuf, ExecutorError> {
        let image = request
            .container_image
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| ExecutorError::InvalidRequest("containerImage is required".to_string()))?;

        self.builder.ensure_space().await?;
        info!("Pulling {} with containerd", image);
        self.ctr(&["images", "pull", image]).await?;

        let digest = self.listed_digest(image).await?;
        if let Err(e) = verify_digest(&request.checksum, &digest) {
            warn!("Digest of {} does not match, removing it", image);
            if let Err(rm) = self.ctr(&["images", "rm", image]).await {
                warn!("Failed to remove {}: {}", image, rm);
            }
            return Err(e);
        }

        let mount_dir = self.builder.image_dir().join(MOUNT_DIR_NAME);
        tokio::fs::create_dir_all(&mount_dir).await?;
        let mount_arg = mount_dir.to_string_lossy().into_owned();
        self.ctr(&["images", "mount", image, &mount_arg]).await?;

        let built = self.builder.from_directory(&mount_dir).await;

        // the snapshot mount must not outlive the request
        if let Err(e) = self.ctr(&["images", "unmount", &mount_arg]).await {
            warn!("Failed to unmount {}: {}", mount_arg, e);
            if built.is_ok() {
                return Err(e);
            }
        }
        if let Err(e) = tokio::fs::remove_dir(&mount_dir).await {
            warn!("Failed to remove {}: {}", mount_dir.display(), e);
        }
        built
    }
}
