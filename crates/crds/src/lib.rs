//! FleetOS CRD Definitions
//!
//! Kubernetes Custom Resource Definitions and shared constants for the
//! FleetOS operator, proxy and agent.

pub mod config;
pub mod desired_state;
pub mod labels;
pub mod machine_status;

pub use config::*;
pub use desired_state::*;
pub use labels::*;
pub use machine_status::*;
