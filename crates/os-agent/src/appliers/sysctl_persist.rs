//! Persisted kernel parameters

use super::ConfigApplier;
use crate::error::ExecutorError;
use agent_client::{ConfigEntry, ConfigOperation, ConfigUnit};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Read-modify-write of a sysctl config file (default `/etc/sysctl.conf`,
/// or the unit's `configPath`).
#[derive(Debug, Clone)]
pub struct KernelSysctlPersist {
    default_path: PathBuf,
}

impl KernelSysctlPersist {
    pub fn new(default_path: PathBuf) -> Self {
        Self { default_path }
    }
}

fn is_passthrough(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';')
}

/// Applies `entries` to sysctl file `content`.
///
/// Comments and blank lines are kept verbatim. Existing keys are rewritten
/// in place, new keys are appended in request order. A delete with a value
/// only removes the line when the current value matches. Any other line
/// that is not `key = value` is an error.
pub fn rewrite_sysctl_conf(content: &str, entries: &[ConfigEntry]) -> Result<String, ExecutorError> {
    let mut sets: Vec<(&str, &str)> = Vec::new();
    let mut deletes: HashMap<&str, Option<&str>> = HashMap::new();
    for entry in entries {
        let key = entry.key.trim();
        if key.is_empty() {
            return Err(ExecutorError::Config("sysctl entry with empty key".to_string()));
        }
        let value = entry.value.as_deref().map(str::trim).filter(|v| !v.is_empty());
        match entry.operation {
            ConfigOperation::Set => match value {
                Some(value) => sets.push((key, value)),
                None => warn!("Persisted parameter {} has no value, skipping", key),
            },
            ConfigOperation::Delete => {
                deletes.insert(key, value);
            }
        }
    }

    let mut seen: Vec<&str> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if is_passthrough(line) {
            lines.push(line.to_string());
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            ExecutorError::Config(format!("malformed line {} in sysctl file: '{}'", number + 1, line))
        })?;
        let (key, value) = (key.trim(), value.trim());

        if let Some(expected) = deletes.get(key) {
            match expected {
                Some(expected) if *expected != value => {
                    warn!("Not deleting {}: current value {} differs from {}", key, value, expected);
                }
                _ => continue,
            }
        }
        if let Some((_, new_value)) = sets.iter().rev().find(|(k, _)| *k == key) {
            lines.push(format!("{} = {}", key, new_value));
            seen.push(key);
            continue;
        }
        lines.push(line.to_string());
    }

    let mut appended: Vec<&str> = Vec::new();
    for (key, _) in &sets {
        if seen.contains(key) || appended.contains(key) {
            continue;
        }
        if let Some((_, value)) = sets.iter().rev().find(|(k, _)| k == key) {
            lines.push(format!("{} = {}", key, value));
        }
        appended.push(*key);
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl ConfigApplier for KernelSysctlPersist {
    async fn apply(&self, unit: &ConfigUnit) -> Result<(), ExecutorError> {
        let path = unit
            .config_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_path.clone());

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ExecutorError::Config(format!("cannot read {}: {}", path.display(), e))),
        };
        let rewritten = rewrite_sysctl_conf(&content, &unit.contents)?;
        tokio::fs::write(&path, rewritten)
            .await
            .map_err(|e| ExecutorError::Config(format!("cannot write {}: {}", path.display(), e)))?;
        info!("Updated {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, value: &str) -> ConfigEntry {
        ConfigEntry {
            key: key.to_string(),
            value: Some(value.to_string()),
            operation: ConfigOperation::Set,
        }
    }

    fn delete(key: &str, value: Option<&str>) -> ConfigEntry {
        ConfigEntry {
            key: key.to_string(),
            value: value.map(str::to_string),
            operation: ConfigOperation::Delete,
        }
    }

    #[test]
    fn test_delete_and_add_leaves_single_line() {
        let out = rewrite_sysctl_conf("a = 1", &[delete("a", None), set("b", "2")]).unwrap();
        assert_eq!(out, "b = 2\n");
        assert_eq!(out.lines().collect::<Vec<_>>(), vec!["b = 2"]);
    }

    #[test]
    fn test_comments_and_blank_lines_preserved() {
        let content = "# kernel tuning\n\nkernel.pid_max = 4096\n; legacy\nvm.swappiness=10\n";
        let out = rewrite_sysctl_conf(content, &[set("vm.swappiness", "1")]).unwrap();
        assert_eq!(out, "# kernel tuning\n\nkernel.pid_max = 4096\n; legacy\nvm.swappiness = 1\n");
    }

    #[test]
    fn test_delete_with_mismatched_value_keeps_line() {
        let out = rewrite_sysctl_conf("a = 1\n", &[delete("a", Some("2"))]).unwrap();
        assert_eq!(out, "a = 1\n");
        let out = rewrite_sysctl_conf("a = 1\n", &[delete("a", Some("1"))]).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_malformed_line_is_error() {
        let err = rewrite_sysctl_conf("a = 1\nbogus\n", &[set("b", "2")]).unwrap_err();
        assert!(matches!(err, ExecutorError::Config(_)));
    }

    #[test]
    fn test_new_keys_appended_in_order() {
        let out = rewrite_sysctl_conf("", &[set("z", "1"), set("a", "2")]).unwrap();
        assert_eq!(out, "z = 1\na = 2\n");
    }

    #[tokio::test]
    async fn test_apply_uses_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("90-fleetos.conf");
        std::fs::write(&path, "a = 1\n").unwrap();
        let applier = KernelSysctlPersist::new(dir.path().join("unused.conf"));
        let unit = ConfigUnit {
            model: "kernel.sysctl.persist".to_string(),
            config_path: Some(path.to_string_lossy().into_owned()),
            contents: vec![set("a", "3")],
        };
        applier.apply(&unit).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a = 3\n");
        assert!(!dir.path().join("unused.conf").exists());
    }
}
