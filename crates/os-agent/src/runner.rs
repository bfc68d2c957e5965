//! Host command execution
//!
//! Everything the agent does to the machine beyond plain file edits goes
//! through `CommandRunner`: `HostRunner` spawns real processes, `FakeRunner`
//! records command lines and answers from a handler under test.

use async_trait::async_trait;
use std::sync::Arc;
#[cfg(any(test, feature = "test-util"))]
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Shared runner handle
pub type BoxedRunner = Arc<dyn CommandRunner>;

/// Runs a program to completion and returns its output.
///
/// A non-zero exit status is an error.
#[async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs commands on the host with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command = command_line(program, args);
        info!("Running command: {}", command);
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stdout.is_empty() {
            debug!("'{}' stdout: {}", command, stdout.trim_end());
        }
        if !stderr.is_empty() {
            debug!("'{}' stderr: {}", command, stderr.trim_end());
        }

        if !output.status.success() {
            return Err(CommandError::Failed {
                command,
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(any(test, feature = "test-util"))]
/// Handler deciding a fake command's outcome: `Ok(stdout)` or `Err(stderr)`
pub type FakeHandler = Box<dyn FnMut(&str) -> Result<String, String> + Send>;

#[cfg(any(test, feature = "test-util"))]
/// A runner that records command lines and answers from a handler
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    handler: Mutex<FakeHandler>,
}

#[cfg(any(test, feature = "test-util"))]
impl std::fmt::Debug for FakeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRunner").field("calls", &self.calls).finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for FakeRunner {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Mutex::new(Box::new(|_| Ok(String::new()))),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl FakeRunner {
    /// A runner where every command succeeds with empty output
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A runner answering from `handler`
    pub fn with_handler<F>(handler: F) -> Arc<Self>
    where
        F: FnMut(&str) -> Result<String, String> + Send + 'static,
    {
        let runner = Self::default();
        if let Ok(mut slot) = runner.handler.lock() {
            *slot = Box::new(handler);
        }
        Arc::new(runner)
    }

    /// Command lines run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Command lines starting with `program`
    pub fn calls_to(&self, program: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .collect()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command = command_line(program, args);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }
        let outcome = match self.handler.lock() {
            Ok(mut handler) => handler(&command),
            Err(_) => Err("fake runner handler poisoned".to_string()),
        };
        match outcome {
            Ok(stdout) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Err(stderr) => Err(CommandError::Failed {
                command,
                code: Some(1),
                stderr,
            }),
        }
    }
}
