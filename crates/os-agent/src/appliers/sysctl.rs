//! Live kernel parameters

use super::ConfigApplier;
use crate::error::ExecutorError;
use agent_client::{ConfigOperation, ConfigUnit};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

/// Writes `key = value` to `<proc_root>/sys/<key with dots as slashes>`.
/// Changes last until the next reboot.
#[derive(Debug, Clone)]
pub struct KernelSysctl {
    proc_root: PathBuf,
}

impl KernelSysctl {
    pub fn new(proc_root: PathBuf) -> Self {
        Self { proc_root }
    }

    fn param_path(&self, key: &str) -> Result<PathBuf, ExecutorError> {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.is_empty() || s.contains('/') || *s == "..") {
            return Err(ExecutorError::Config(format!("invalid sysctl key '{}'", key)));
        }
        let mut path = self.proc_root.join("sys");
        path.extend(segments);
        Ok(path)
    }
}

#[async_trait]
impl ConfigApplier for KernelSysctl {
    async fn apply(&self, unit: &ConfigUnit) -> Result<(), ExecutorError> {
        for entry in &unit.contents {
            match entry.operation {
                ConfigOperation::Delete => {
                    warn!("Cannot delete live kernel parameter {}, skipping", entry.key);
                }
                ConfigOperation::Set => {
                    let Some(value) = entry.value.as_deref().filter(|v| !v.is_empty()) else {
                        warn!("Kernel parameter {} has no value, skipping", entry.key);
                        continue;
                    };
                    let path = self.param_path(&entry.key)?;
                    tokio::fs::write(&path, value)
                        .await
                        .map_err(|e| ExecutorError::Config(format!("cannot set {}: {}", entry.key, e)))?;
                    info!("Set kernel parameter {} = {}", entry.key, value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_client::ConfigEntry;

    fn unit(entries: Vec<ConfigEntry>) -> ConfigUnit {
        ConfigUnit {
            model: "kernel.sysctl".to_string(),
            config_path: None,
            contents: entries,
        }
    }

    #[tokio::test]
    async fn test_writes_proc_sys_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sys/net/ipv4")).unwrap();
        let applier = KernelSysctl::new(dir.path().to_path_buf());

        applier
            .apply(&unit(vec![ConfigEntry {
                key: "net.ipv4.ip_forward".to_string(),
                value: Some("1".to_string()),
                operation: ConfigOperation::Set,
            }]))
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("sys/net/ipv4/ip_forward")).unwrap();
        assert_eq!(written, "1");
    }

    #[tokio::test]
    async fn test_delete_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let applier = KernelSysctl::new(dir.path().to_path_buf());
        applier
            .apply(&unit(vec![ConfigEntry {
                key: "net.ipv4.ip_forward".to_string(),
                value: None,
                operation: ConfigOperation::Delete,
            }]))
            .await
            .unwrap();
    }

    #[test]
    fn test_rejects_traversal() {
        let applier = KernelSysctl::new(PathBuf::from("/proc"));
        assert!(applier.param_path("net..ipv4").is_err());
        assert!(applier.param_path("kernel/../x").is_err());
        assert_eq!(
            applier.param_path("kernel.pid_max").unwrap(),
            PathBuf::from("/proc/sys/kernel/pid_max")
        );
    }
}
