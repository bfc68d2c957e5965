//! Image acquisition strategies
//!
//! Each strategy turns an `UpdateRequest` into a single verified image file
//! under the staging directory, ready to be written to the inactive
//! partition. Strategies are registered once per process by image kind.

mod containerd;
mod disk;
mod docker;
mod rootfs;

pub use containerd::RegistryImageSource;
pub use disk::DiskImageSource;
pub use docker::ContainerImageSource;
pub use rootfs::RootfsImageBuilder;

use crate::config::AgentConfig;
use crate::error::ExecutorError;
use crate::runner::BoxedRunner;
use agent_client::{ImageKind, UpdateRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name of the staged image inside the image directory
pub const UPDATE_IMAGE_NAME: &str = "update.img";

/// Produces a verified image file for an update
#[async_trait]
pub trait ImageSource: Send + Sync + std::fmt::Debug {
    /// Returns the path of the staged image file
    async fn prepare(&self, request: &UpdateRequest) -> Result<PathBuf, ExecutorError>;
}

/// Image sources keyed by kind
#[derive(Debug, Default)]
pub struct ImageRegistry {
    sources: HashMap<ImageKind, Box<dyn ImageSource>>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in strategies
    pub fn standard(config: &AgentConfig, runner: BoxedRunner) -> Self {
        let builder = RootfsImageBuilder::new(runner.clone(), config.image_dir.clone(), config.rootfs_size_mb);
        let mut registry = Self::new();
        registry.register(
            ImageKind::RawDiskImage,
            Box::new(DiskImageSource::new(runner.clone(), config.image_dir.clone(), config.cert_dir.clone())),
        );
        registry.register(
            ImageKind::ContainerImage,
            Box::new(ContainerImageSource::new(runner.clone(), builder.clone())),
        );
        registry.register(
            ImageKind::RegistryImage,
            Box::new(RegistryImageSource::new(runner, builder)),
        );
        registry
    }

    pub fn register(&mut self, kind: ImageKind, source: Box<dyn ImageSource>) {
        self.sources.insert(kind, source);
    }

    pub fn get(&self, kind: ImageKind) -> Result<&dyn ImageSource, ExecutorError> {
        self.sources
            .get(&kind)
            .map(|source| &**source)
            .ok_or_else(|| ExecutorError::InvalidRequest(format!("unsupported image kind {:?}", kind)))
    }
}

/// Lowercases a digest and strips an optional `sha256:` prefix
pub fn normalize_digest(digest: &str) -> String {
    let digest = digest.trim().to_ascii_lowercase();
    digest.strip_prefix("sha256:").map(str::to_string).unwrap_or(digest)
}

/// Compares an observed digest against the expected checksum
pub fn verify_digest(expected: &str, actual: &str) -> Result<(), ExecutorError> {
    let expected = normalize_digest(expected);
    let actual = normalize_digest(actual);
    if expected.is_empty() || expected != actual {
        return Err(ExecutorError::Integrity { expected, actual });
    }
    Ok(())
}

/// Free bytes on the filesystem holding `dir`
pub async fn available_bytes(runner: &BoxedRunner, dir: &Path) -> Result<u64, ExecutorError> {
    let dir = dir.to_string_lossy();
    let output = runner.run("df", &["--output=avail", "-B1", &dir]).await?;
    output
        .stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<u64>().ok())
        .ok_or_else(|| ExecutorError::Image(format!("cannot parse free space of {}", dir)))
}

/// Fails when fewer than `needed` bytes are free under `dir`
pub async fn ensure_free_space(runner: &BoxedRunner, dir: &Path, needed: u64) -> Result<(), ExecutorError> {
    let available = available_bytes(runner, dir).await?;
    if available < needed {
        return Err(ExecutorError::Image(format!(
            "not enough space in {}: need {} bytes, {} available",
            dir.display(),
            needed,
            available
        )));
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
