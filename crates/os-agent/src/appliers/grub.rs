//! Kernel command line in the bootloader menu

use super::ConfigApplier;
use crate::error::ExecutorError;
use crate::partition::{Partition, PartitionSwitcher};
use agent_client::{ConfigEntry, ConfigOperation, ConfigUnit};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::info;

static MENUENTRY: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"^\s*menuentry\s+['"]([^'"]+)['"]"#));
static LINUX_LINE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(\s*)(linux|linuxefi|linux16)\s+(\S+)\s*(.*)$"));

/// Which boot entries a grub applier edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrubTarget {
    /// Both A and B
    All,
    /// The running partition's entry
    Active,
    /// The other partition's entry
    Inactive,
}

#[derive(Debug, Clone)]
pub struct GrubCmdline {
    grub_cfg_path: PathBuf,
    target: GrubTarget,
    switcher: PartitionSwitcher,
}

impl GrubCmdline {
    pub fn new(grub_cfg_path: PathBuf, target: GrubTarget, switcher: PartitionSwitcher) -> Self {
        Self {
            grub_cfg_path,
            target,
            switcher,
        }
    }

    async fn entries(&self) -> Result<Vec<&'static str>, ExecutorError> {
        Ok(match self.target {
            GrubTarget::All => vec![Partition::A.boot_entry(), Partition::B.boot_entry()],
            GrubTarget::Active => vec![self.switcher.active().await?.boot_entry()],
            GrubTarget::Inactive => vec![self.switcher.inactive().await?.boot_entry()],
        })
    }
}

fn compiled(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex, ExecutorError> {
    match &**re {
        Ok(regex) => Ok(regex),
        Err(e) => Err(ExecutorError::Config(format!("invalid pattern: {}", e))),
    }
}

/// One compiled edit against kernel parameters
struct ParamEdit<'a> {
    entry: &'a ConfigEntry,
    pattern: Regex,
}

impl<'a> ParamEdit<'a> {
    fn new(entry: &'a ConfigEntry) -> Result<Self, ExecutorError> {
        let key = entry.key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) || key.contains('=') {
            return Err(ExecutorError::Config(format!("invalid kernel parameter '{}'", entry.key)));
        }
        let pattern = Regex::new(&format!(r"^{}(=.*)?$", regex::escape(key)))
            .map_err(|e| ExecutorError::Config(e.to_string()))?;
        Ok(Self { entry, pattern })
    }

    fn rendered(&self) -> String {
        let key = self.entry.key.trim();
        match self.entry.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => format!("{}={}", key, value),
            None => key.to_string(),
        }
    }

    fn apply(&self, params: &mut Vec<String>) {
        match self.entry.operation {
            ConfigOperation::Set => {
                let rendered = self.rendered();
                let mut replaced = false;
                params.retain_mut(|param| {
                    if !self.pattern.is_match(param) {
                        return true;
                    }
                    if replaced {
                        return false;
                    }
                    param.clone_from(&rendered);
                    replaced = true;
                    true
                });
                if !replaced {
                    params.push(rendered);
                }
            }
            ConfigOperation::Delete => {
                let exact = self.entry.value.as_deref().is_some_and(|v| !v.trim().is_empty());
                let rendered = self.rendered();
                params.retain(|param| {
                    if exact {
                        *param != rendered
                    } else {
                        !self.pattern.is_match(param)
                    }
                });
            }
        }
    }
}

/// Applies `entries` to the `linux` lines of the menu entries named in
/// `targets`. Other lines, entries and parameters are left untouched.
pub fn rewrite_grub_cfg(content: &str, entries: &[ConfigEntry], targets: &[&str]) -> Result<String, ExecutorError> {
    let menuentry = compiled(&MENUENTRY)?;
    let linux_line = compiled(&LINUX_LINE)?;
    let edits = entries.iter().map(ParamEdit::new).collect::<Result<Vec<_>, _>>()?;

    let mut current_entry: Option<String> = None;
    let mut edited = 0;
    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        if let Some(caps) = menuentry.captures(line) {
            current_entry = Some(caps[1].to_string());
            lines.push(line.to_string());
            continue;
        }
        if line.trim() == "}" {
            current_entry = None;
            lines.push(line.to_string());
            continue;
        }
        let targeted = current_entry.as_deref().is_some_and(|e| targets.contains(&e));
        match linux_line.captures(line) {
            Some(caps) if targeted => {
                let mut params: Vec<String> = caps[4].split_whitespace().map(str::to_string).collect();
                for edit in &edits {
                    edit.apply(&mut params);
                }
                let mut rewritten = format!("{}{} {}", &caps[1], &caps[2], &caps[3]);
                if !params.is_empty() {
                    rewritten.push(' ');
                    rewritten.push_str(&params.join(" "));
                }
                lines.push(rewritten);
                edited += 1;
            }
            _ => lines.push(line.to_string()),
        }
    }

    if edited == 0 {
        return Err(ExecutorError::Config(format!(
            "no kernel command line found for boot entries {:?}",
            targets
        )));
    }

    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl ConfigApplier for GrubCmdline {
    async fn apply(&self, unit: &ConfigUnit) -> Result<(), ExecutorError> {
        let targets = self.entries().await?;
        let content = tokio::fs::read_to_string(&self.grub_cfg_path)
            .await
            .map_err(|e| ExecutorError::Config(format!("cannot read {}: {}", self.grub_cfg_path.display(), e)))?;
        let rewritten = rewrite_grub_cfg(&content, &unit.contents, &targets)?;
        tokio::fs::write(&self.grub_cfg_path, rewritten)
            .await
            .map_err(|e| ExecutorError::Config(format!("cannot write {}: {}", self.grub_cfg_path.display(), e)))?;
        info!("Updated kernel command line of boot entries {:?}", targets);
        Ok(())
    }
}
