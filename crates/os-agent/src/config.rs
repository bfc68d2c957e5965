//! Agent configuration
//!
//! Host paths are fixed per image build and overridable through the
//! environment. The A/B device nodes must be known in advance: partition
//! identity is positional, not read from filesystem labels.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_SOCKET_PATH: &str = "/run/os-agent/os-agent.sock";
pub const DEFAULT_PARTITION_A: &str = "/dev/sda2";
pub const DEFAULT_PARTITION_B: &str = "/dev/sda3";
pub const DEFAULT_GRUB_ENV_PATH: &str = "/boot/efi/EFI/fleetos/grubenv";
pub const DEFAULT_GRUB_CFG_PATH: &str = "/boot/efi/EFI/fleetos/grub.cfg";
pub const DEFAULT_SYSCTL_PERSIST_PATH: &str = "/etc/sysctl.conf";
pub const DEFAULT_CERT_DIR: &str = "/etc/fleetos/certs";
pub const DEFAULT_IMAGE_DIR: &str = "/persist";
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_ROOTFS_SIZE_MB: u64 = 2048;

/// Runtime configuration for the node agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Unix socket the agent listens on
    pub socket_path: PathBuf,
    /// Device node of root partition A
    pub partition_a: PathBuf,
    /// Device node of root partition B
    pub partition_b: PathBuf,
    /// Bootloader environment file holding `saved_entry`
    pub grub_env_path: PathBuf,
    /// Rendered bootloader menu
    pub grub_cfg_path: PathBuf,
    /// Default target of `kernel.sysctl.persist`
    pub sysctl_persist_path: PathBuf,
    /// Directory certificate file names are resolved under
    pub cert_dir: PathBuf,
    /// Staging directory for downloaded and built images
    pub image_dir: PathBuf,
    /// Root of the proc filesystem (`<proc_root>/sys/...`)
    pub proc_root: PathBuf,
    /// Size of the ext4 image built from container root filesystems
    pub rootfs_size_mb: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            partition_a: PathBuf::from(DEFAULT_PARTITION_A),
            partition_b: PathBuf::from(DEFAULT_PARTITION_B),
            grub_env_path: PathBuf::from(DEFAULT_GRUB_ENV_PATH),
            grub_cfg_path: PathBuf::from(DEFAULT_GRUB_CFG_PATH),
            sysctl_persist_path: PathBuf::from(DEFAULT_SYSCTL_PERSIST_PATH),
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            rootfs_size_mb: DEFAULT_ROOTFS_SIZE_MB,
        }
    }
}

impl AgentConfig {
    /// Reads overrides from the process environment
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        let rootfs_size_mb = match lookup("ROOTFS_SIZE_MB") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|mb| *mb > 0)
                .ok_or_else(|| format!("ROOTFS_SIZE_MB must be a positive integer, got '{}'", raw))?,
            None => defaults.rootfs_size_mb,
        };

        let config = Self {
            socket_path: path("AGENT_SOCKET", defaults.socket_path),
            partition_a: path("PARTITION_A", defaults.partition_a),
            partition_b: path("PARTITION_B", defaults.partition_b),
            grub_env_path: path("GRUB_ENV_PATH", defaults.grub_env_path),
            grub_cfg_path: path("GRUB_CFG_PATH", defaults.grub_cfg_path),
            sysctl_persist_path: path("SYSCTL_PERSIST_PATH", defaults.sysctl_persist_path),
            cert_dir: path("CERT_DIR", defaults.cert_dir),
            image_dir: path("IMAGE_DIR", defaults.image_dir),
            proc_root: path("PROC_SYS_ROOT", defaults.proc_root),
            rootfs_size_mb,
        };

        if config.partition_a == config.partition_b {
            return Err(format!(
                "PARTITION_A and PARTITION_B must differ (both {})",
                config.partition_a.display()
            ));
        }
        Ok(config)
    }
}
