//! A/B partition switching
//!
//! The inactive partition is found by asking where partition A is mounted:
//! if A is the root filesystem the target is B, otherwise A. Boot entries
//! are named after the partition ("A" boots partition A).

use crate::error::ExecutorError;
use crate::runner::BoxedRunner;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// One of the two root partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    A,
    B,
}

impl Partition {
    /// Bootloader menu entry that boots this partition
    pub fn boot_entry(self) -> &'static str {
        match self {
            Partition::A => "A",
            Partition::B => "B",
        }
    }

    pub fn other(self) -> Partition {
        match self {
            Partition::A => Partition::B,
            Partition::B => Partition::A,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.boot_entry())
    }
}

#[derive(Debug, Clone)]
pub struct PartitionSwitcher {
    runner: BoxedRunner,
    partition_a: PathBuf,
    partition_b: PathBuf,
    grub_env_path: PathBuf,
}

impl PartitionSwitcher {
    pub fn new(runner: BoxedRunner, partition_a: PathBuf, partition_b: PathBuf, grub_env_path: PathBuf) -> Self {
        Self {
            runner,
            partition_a,
            partition_b,
            grub_env_path,
        }
    }

    pub fn device(&self, partition: Partition) -> &Path {
        match partition {
            Partition::A => &self.partition_a,
            Partition::B => &self.partition_b,
        }
    }

    /// Partition that is not mounted at `/`
    pub async fn inactive(&self) -> Result<Partition, ExecutorError> {
        let device = self.partition_a.to_string_lossy();
        let output = self
            .runner
            .run("lsblk", &["-no", "MOUNTPOINT", &device])
            .await
            .map_err(|e| ExecutorError::Partition(format!("cannot query mount point of {}: {}", device, e)))?;
        let mounted_at_root = output.stdout.lines().any(|line| line.trim() == "/");
        Ok(if mounted_at_root { Partition::B } else { Partition::A })
    }

    /// Partition currently booted
    pub async fn active(&self) -> Result<Partition, ExecutorError> {
        Ok(self.inactive().await?.other())
    }

    /// Writes `image` over the raw device of `partition`
    pub async fn write_image(&self, image: &Path, partition: Partition) -> Result<(), ExecutorError> {
        let device = self.device(partition).to_string_lossy().into_owned();
        info!("Writing {} to partition {} ({})", image.display(), partition, device);
        let input = format!("if={}", image.display());
        let output = format!("of={}", device);
        self.runner
            .run("dd", &[&input, &output, "bs=8M"])
            .await
            .map_err(|e| ExecutorError::Partition(format!("image write to {} failed: {}", device, e)))?;
        Ok(())
    }

    /// Points the bootloader's default entry at `partition`
    pub async fn set_default_entry(&self, partition: Partition) -> Result<(), ExecutorError> {
        let env_path = self.grub_env_path.to_string_lossy();
        let saved_entry = format!("saved_entry={}", partition.boot_entry());
        info!("Setting default boot entry to {}", partition);
        self.runner
            .run("grub2-editenv", &[&env_path, "set", &saved_entry])
            .await
            .map_err(|e| ExecutorError::Partition(format!("cannot set default boot entry: {}", e)))?;
        Ok(())
    }

    /// Flushes storage and reboots the machine
    pub async fn reboot(&self) -> Result<(), ExecutorError> {
        self.runner.run("sync", &[]).await?;
        info!("Rebooting");
        self.runner.run("systemctl", &["reboot"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::FakeRunner;
    use std::sync::Arc;

    fn switcher(root_mount: &'static str) -> (Arc<FakeRunner>, PartitionSwitcher) {
        let runner = FakeRunner::with_handler(move |cmd| {
            if cmd.starts_with("lsblk") {
                Ok(format!("{}\n", root_mount))
            } else {
                Ok(String::new())
            }
        });
        let switcher = PartitionSwitcher::new(
            runner.clone(),
            PathBuf::from("/dev/sda2"),
            PathBuf::from("/dev/sda3"),
            PathBuf::from("/boot/efi/EFI/fleetos/grubenv"),
        );
        (runner, switcher)
    }

    #[tokio::test]
    async fn test_booted_from_a_targets_b() {
        let (runner, switcher) = switcher("/");
        assert_eq!(switcher.inactive().await.unwrap(), Partition::B);
        assert_eq!(switcher.active().await.unwrap(), Partition::A);
        assert_eq!(runner.calls()[0], "lsblk -no MOUNTPOINT /dev/sda2");
    }

    #[tokio::test]
    async fn test_booted_from_b_targets_a() {
        let (_, switcher) = switcher("");
        assert_eq!(switcher.inactive().await.unwrap(), Partition::A);
    }

    #[tokio::test]
    async fn test_write_and_switch_commands() {
        let (runner, switcher) = switcher("/");
        switcher.write_image(Path::new("/persist/update.img"), Partition::B).await.unwrap();
        switcher.set_default_entry(Partition::B).await.unwrap();
        assert_eq!(
            runner.calls(),
            vec![
                "dd if=/persist/update.img of=/dev/sda3 bs=8M",
                "grub2-editenv /boot/efi/EFI/fleetos/grubenv set saved_entry=B",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_partition_error() {
        let runner = FakeRunner::with_handler(|cmd| {
            if cmd.starts_with("dd") {
                Err("No space left on device".to_string())
            } else {
                Ok(String::new())
            }
        });
        let switcher = PartitionSwitcher::new(runner, "/dev/a".into(), "/dev/b".into(), "/env".into());
        let err = switcher.write_image(Path::new("/img"), Partition::A).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Partition(_)));
    }
}
