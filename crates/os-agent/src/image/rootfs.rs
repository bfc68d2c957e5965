//! Builds a flat ext4 image from a container root filesystem

use super::{ensure_free_space, remove_if_exists, UPDATE_IMAGE_NAME};
use crate::error::ExecutorError;
use crate::runner::BoxedRunner;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MOUNT_DIR_NAME: &str = "rootfs-build";

/// Where the root filesystem content comes from
#[derive(Debug, Clone, Copy)]
enum Content<'a> {
    Tarball(&'a Path),
    Directory(&'a Path),
}

#[derive(Debug, Clone)]
pub struct RootfsImageBuilder {
    runner: BoxedRunner,
    image_dir: PathBuf,
    size_mb: u64,
}

impl RootfsImageBuilder {
    pub fn new(runner: BoxedRunner, image_dir: PathBuf, size_mb: u64) -> Self {
        Self {
            runner,
            image_dir,
            size_mb,
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn image_path(&self) -> PathBuf {
        self.image_dir.join(UPDATE_IMAGE_NAME)
    }

    /// Fails when the staging directory cannot hold the image
    pub async fn ensure_space(&self) -> Result<(), ExecutorError> {
        ensure_free_space(&self.runner, &self.image_dir, self.size_mb * 1024 * 1024).await
    }

    /// Builds the image from an exported root filesystem tarball
    pub async fn from_tarball(&self, tarball: &Path) -> Result<PathBuf, ExecutorError> {
        self.build(Content::Tarball(tarball)).await
    }

    /// Builds the image from a mounted root filesystem
    pub async fn from_directory(&self, dir: &Path) -> Result<PathBuf, ExecutorError> {
        self.build(Content::Directory(dir)).await
    }

    async fn build(&self, content: Content<'_>) -> Result<PathBuf, ExecutorError> {
        let image = self.image_path();
        let mount_dir = self.image_dir.join(MOUNT_DIR_NAME);
        info!("Building {} MiB root filesystem image at {}", self.size_mb, image.display());

        match self.fill(&image, &mount_dir, content).await {
            Ok(()) => Ok(image),
            Err(e) => {
                remove_if_exists(&image).await;
                Err(e)
            }
        }
    }

    async fn fill(&self, image: &Path, mount_dir: &Path, content: Content<'_>) -> Result<(), ExecutorError> {
        let image_arg = image.to_string_lossy().into_owned();
        let mount_arg = mount_dir.to_string_lossy().into_owned();

        let of = format!("of={}", image_arg);
        let count = format!("count={}", self.size_mb);
        self.runner.run("dd", &["if=/dev/zero", &of, "bs=1M", &count]).await?;
        self.runner.run("mkfs.ext4", &["-F", &image_arg]).await?;

        tokio::fs::create_dir_all(mount_dir).await?;
        self.runner.run("mount", &["-o", "loop", &image_arg, &mount_arg]).await?;

        let copied = match content {
            Content::Tarball(tarball) => {
                let tarball = tarball.to_string_lossy();
                self.runner.run("tar", &["-xf", &tarball, "-C", &mount_arg]).await
            }
            Content::Directory(dir) => {
                let source = format!("{}/.", dir.display());
                self.runner.run("cp", &["-a", &source, &mount_arg]).await
            }
        };

        // unmount even when the copy failed
        let unmounted = self.runner.run("umount", &[&mount_arg]).await;
        copied?;
        unmounted?;
        if let Err(e) = tokio::fs::remove_dir(mount_dir).await {
            warn!("Failed to remove {}: {}", mount_dir.display(), e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::FakeRunner;

    #[tokio::test]
    async fn test_build_from_tarball_command_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let builder = RootfsImageBuilder::new(runner.clone(), dir.path().to_path_buf(), 64);

        let image = builder.from_tarball(&dir.path().join("rootfs.tar")).await.unwrap();
        assert_eq!(image, dir.path().join("update.img"));

        let programs: Vec<String> = runner
            .calls()
            .iter()
            .filter_map(|c| c.split_whitespace().next().map(str::to_string))
            .collect();
        assert_eq!(programs, vec!["dd", "mkfs.ext4", "mount", "tar", "umount"]);
        assert!(runner.calls()[0].ends_with("bs=1M count=64"));
    }

    #[tokio::test]
    async fn test_failed_copy_still_unmounts_and_removes_image() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("update.img");
        let marker = image_path.clone();
        let runner = FakeRunner::with_handler(move |cmd| {
            if cmd.starts_with("dd") {
                std::fs::write(&marker, b"blank").map_err(|e| e.to_string())?;
            }
            if cmd.starts_with("cp") {
                return Err("read error".to_string());
            }
            Ok(String::new())
        });
        let builder = RootfsImageBuilder::new(runner.clone(), dir.path().to_path_buf(), 64);

        assert!(builder.from_directory(Path::new("/mnt/rootfs")).await.is_err());
        assert_eq!(runner.calls_to("umount").len(), 1);
        assert!(!image_path.exists());
    }
}
