//! Cluster Client
//!
//! Access to the declarative resource store used as coordination state by the
//! FleetOS operator and proxy: nodes, pods, `DesiredState` and `MachineStatus`.
//!
//! Controllers depend on [`ClusterClientTrait`] rather than on `kube::Api`
//! directly so reconciliation logic can run against [`MockClusterClient`]
//! in unit tests.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, Expression, KubeClusterClient, Selector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//! let selector = Selector::from(Expression::DoesNotExist("node-role.kubernetes.io/control-plane".into()));
//! let workers = client
//!     .list_nodes(&selector, Some(10))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod node;
pub mod selector;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
pub use node::*;
pub use selector::*;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
