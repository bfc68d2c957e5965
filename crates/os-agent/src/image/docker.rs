//! Container image pulled through the docker daemon

use super::{remove_if_exists, verify_digest, ImageSource, RootfsImageBuilder};
use crate::error::ExecutorError;
use crate::runner::BoxedRunner;
use agent_client::UpdateRequest;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

const EXPORT_CONTAINER: &str = "fleetos-rootfs-export";
const EXPORT_TARBALL: &str = "rootfs.tar";

/// Pulls `containerImage` with docker, checks its repo digest, exports the
/// container filesystem and packs it into an ext4 image.
#[derive(Debug, Clone)]
pub struct ContainerImageSource {
    runner: BoxedRunner,
    builder: RootfsImageBuilder,
}

impl ContainerImageSource {
    pub fn new(runner: BoxedRunner, builder: RootfsImageBuilder) -> Self {
        Self { runner, builder }
    }

    async fn repo_digest(&self, image: &str) -> Result<String, ExecutorError> {
        let output = self
            .runner
            .run("docker", &["image", "inspect", "--format", "{{index .RepoDigests 0}}", image])
            .await?;
        // repo@sha256:...
        output
            .stdout
            .trim()
            .rsplit_once('@')
            .map(|(_, digest)| digest.to_string())
            .ok_or_else(|| ExecutorError::Image(format!("no repo digest for {}", image)))
    }

    async fn export(&self, image: &str, tarball: &str) -> Result<(), ExecutorError> {
        // leftovers from an interrupted run
        let _ = self.runner.run("docker", &["rm", "-f", EXPORT_CONTAINER]).await;

        self.runner
            .run("docker", &["create", "--name", EXPORT_CONTAINER, image])
            .await?;
        let exported = self
            .runner
            .run("docker", &["export", "-o", tarball, EXPORT_CONTAINER])
            .await;
        if let Err(e) = self.runner.run("docker", &["rm", EXPORT_CONTAINER]).await {
            warn!("Failed to remove export container: {}", e);
        }
        exported?;
        Ok(())
    }
}

#[async_trait]
impl ImageSource for ContainerImageSource {
    async fn prepare(&self, request: &UpdateRequest) -> Result<PathBuf, ExecutorError> {
        let image = request
            .container_image
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| ExecutorError::InvalidRequest("containerImage is required".to_string()))?;

        self.builder.ensure_space().await?;
        info!("Pulling {} with docker", image);
        self.runner.run("docker", &["pull", image]).await?;

        let digest = self.repo_digest(image).await?;
        if let Err(e) = verify_digest(&request.checksum, &digest) {
            warn!("Digest of {} does not match, removing it", image);
            if let Err(rm) = self.runner.run("docker", &["rmi", image]).await {
                warn!("Failed to remove {}: {}", image, rm);
            }
            return Err(e);
        }

        let tarball = self.builder.image_dir().join(EXPORT_TARBALL);
        let tarball_arg = tarball.to_string_lossy().into_owned();
        let result = match self.export(image, &tarball_arg).await {
            Ok(()) => self.builder.from_tarball(&tarball).await,
            Err(e) => Err(e),
        };
        remove_if_exists(&tarball).await;
        result
    }
}
