//! FleetOS node agent
//!
//! Executes `Update`, `Rollback` and `Configure` requests received over a
//! local Unix socket. At most one request runs at a time; a second request
//! arriving while one is in flight is rejected as busy.
//!
//! - `image`: image acquisition strategies (raw disk, docker, containerd)
//! - `partition`: A/B partition detection, image write, boot entry switch
//! - `appliers`: config appliers (sysctl, persisted sysctl, grub cmdline)
//! - `executor`: single-flight request execution
//! - `server`: socket listener

pub mod appliers;
pub mod certs;
pub mod config;
pub mod error;
pub mod executor;
pub mod image;
pub mod partition;
pub mod runner;
pub mod server;

pub use config::AgentConfig;
pub use error::ExecutorError;
pub use executor::Executor;
pub use runner::{BoxedRunner, CommandRunner, HostRunner};
#[cfg(any(test, feature = "test-util"))]
pub use runner::FakeRunner;
pub use server::AgentServer;
