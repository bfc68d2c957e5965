//! FleetOS node agent client
//!
//! Request/response types for the machine-local agent RPC, the
//! length-prefixed JSON framing shared with the agent server, and a Unix
//! socket client used by the per-node proxy.
//!
//! # Example
//!
//! ```no_run
//! use agent_client::{AgentClient, AgentClientTrait, ConfigureRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), agent_client::AgentError> {
//! let client = AgentClient::new("/run/os-agent/os-agent.sock", Duration::from_secs(30));
//! client.configure(&ConfigureRequest { configs: vec![] }).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod framing;
pub mod protocol;
#[path = "trait.rs"]
pub mod agent_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use agent_trait::AgentClientTrait;
pub use client::AgentClient;
pub use error::{AgentError, AgentErrorKind};
pub use protocol::*;
#[cfg(feature = "test-util")]
pub use mock::MockAgentClient;
