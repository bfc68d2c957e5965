//! Config appliers
//!
//! A `Configure` request carries an ordered list of units; each unit names
//! its applier by model string. Units are applied in order and the call
//! stops at the first failure. Units applied before the failure stay
//! applied.

mod grub;
mod sysctl;
mod sysctl_persist;

pub use grub::{rewrite_grub_cfg, GrubCmdline, GrubTarget};
pub use sysctl::KernelSysctl;
pub use sysctl_persist::{rewrite_sysctl_conf, KernelSysctlPersist};

use crate::config::AgentConfig;
use crate::error::ExecutorError;
use crate::partition::PartitionSwitcher;
use agent_client::ConfigUnit;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// Applier selected by a unit's model string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    /// `kernel.sysctl`: live `/proc/sys` write
    KernelSysctl,
    /// `kernel.sysctl.persist`: sysctl config file
    KernelSysctlPersist,
    /// `grub.cmdline`: kernel command line of every boot entry
    GrubCmdline,
    /// `grub.cmdline.current`: entry of the running partition
    GrubCmdlineCurrent,
    /// `grub.cmdline.next`: entry of the other partition
    GrubCmdlineNext,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 5] = [
        ConfigKind::KernelSysctl,
        ConfigKind::KernelSysctlPersist,
        ConfigKind::GrubCmdline,
        ConfigKind::GrubCmdlineCurrent,
        ConfigKind::GrubCmdlineNext,
    ];

    pub fn model(self) -> &'static str {
        match self {
            ConfigKind::KernelSysctl => "kernel.sysctl",
            ConfigKind::KernelSysctlPersist => "kernel.sysctl.persist",
            ConfigKind::GrubCmdline => "grub.cmdline",
            ConfigKind::GrubCmdlineCurrent => "grub.cmdline.current",
            ConfigKind::GrubCmdlineNext => "grub.cmdline.next",
        }
    }

    pub fn from_model(model: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.model() == model)
    }
}

/// Applies one config unit
#[async_trait]
pub trait ConfigApplier: Send + Sync + std::fmt::Debug {
    async fn apply(&self, unit: &ConfigUnit) -> Result<(), ExecutorError>;
}

/// Appliers keyed by kind, built once per process
#[derive(Debug)]
pub struct ApplierRegistry {
    appliers: HashMap<ConfigKind, Box<dyn ConfigApplier>>,
}

impl ApplierRegistry {
    pub fn new(config: &AgentConfig, switcher: PartitionSwitcher) -> Self {
        let mut appliers: HashMap<ConfigKind, Box<dyn ConfigApplier>> = HashMap::new();
        appliers.insert(ConfigKind::KernelSysctl, Box::new(KernelSysctl::new(config.proc_root.clone())));
        appliers.insert(
            ConfigKind::KernelSysctlPersist,
            Box::new(KernelSysctlPersist::new(config.sysctl_persist_path.clone())),
        );
        for (kind, target) in [
            (ConfigKind::GrubCmdline, GrubTarget::All),
            (ConfigKind::GrubCmdlineCurrent, GrubTarget::Active),
            (ConfigKind::GrubCmdlineNext, GrubTarget::Inactive),
        ] {
            appliers.insert(
                kind,
                Box::new(GrubCmdline::new(config.grub_cfg_path.clone(), target, switcher.clone())),
            );
        }
        Self { appliers }
    }

    /// Applies `units` in order, stopping at the first failure
    pub async fn apply_all(&self, units: &[ConfigUnit]) -> Result<(), ExecutorError> {
        for unit in units {
            let kind = ConfigKind::from_model(&unit.model)
                .ok_or_else(|| ExecutorError::InvalidRequest(format!("unknown config model '{}'", unit.model)))?;
            let applier = self
                .appliers
                .get(&kind)
                .ok_or_else(|| ExecutorError::InvalidRequest(format!("no applier for '{}'", unit.model)))?;
            if unit.contents.is_empty() {
                info!("Config unit {} has no entries, skipping", unit.model);
                continue;
            }
            info!("Applying {} ({} entries)", unit.model, unit.contents.len());
            applier.apply(unit).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::FakeRunner;
    use agent_client::{ConfigEntry, ConfigOperation};
    use std::path::Path;

    fn registry(root: &Path) -> ApplierRegistry {
        let config = AgentConfig {
            sysctl_persist_path: root.join("sysctl.conf"),
            proc_root: root.join("proc"),
            grub_cfg_path: root.join("grub.cfg"),
            ..AgentConfig::default()
        };
        let switcher = PartitionSwitcher::new(
            FakeRunner::new(),
            config.partition_a.clone(),
            config.partition_b.clone(),
            config.grub_env_path.clone(),
        );
        ApplierRegistry::new(&config, switcher)
    }

    fn persist_unit(key: &str, value: &str) -> ConfigUnit {
        ConfigUnit {
            model: "kernel.sysctl.persist".to_string(),
            config_path: None,
            contents: vec![ConfigEntry {
                key: key.to_string(),
                value: Some(value.to_string()),
                operation: ConfigOperation::Set,
            }],
        }
    }

    #[test]
    fn test_model_names_round_trip() {
        for kind in ConfigKind::ALL {
            assert_eq!(ConfigKind::from_model(kind.model()), Some(kind));
        }
        assert_eq!(ConfigKind::from_model("kernel.modules"), None);
    }

    #[tokio::test]
    async fn test_unknown_model_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let unit = ConfigUnit {
            model: "kernel.modules".to_string(),
            config_path: None,
            contents: vec![],
        };
        let err = registry(dir.path()).apply_all(&[unit]).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_partial_apply_is_expected() {
        // the first unit lands, the second fails, nothing is undone
        let dir = tempfile::tempdir().unwrap();
        let bad = ConfigUnit {
            model: "kernel.sysctl.persist".to_string(),
            config_path: Some(dir.path().join("broken.conf").to_string_lossy().into_owned()),
            contents: persist_unit("b", "2").contents,
        };
        std::fs::write(dir.path().join("broken.conf"), "not a sysctl line\n").unwrap();

        let result = registry(dir.path())
            .apply_all(&[persist_unit("a", "1"), bad, persist_unit("c", "3")])
            .await;

        assert!(matches!(result, Err(ExecutorError::Config(_))));
        let applied = std::fs::read_to_string(dir.path().join("sysctl.conf")).unwrap();
        assert_eq!(applied, "a = 1\n");
    }
}
