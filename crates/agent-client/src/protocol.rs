//! Agent RPC messages
//!
//! One request frame, one response frame per connection. The config types
//! mirror the CRD bundle units but carry no Kubernetes dependency, so the
//! agent binary stays independent of the cluster API.

use crate::error::AgentErrorKind;
use serde::{Deserialize, Serialize};

/// How the agent obtains the root filesystem image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ImageKind {
    /// Pulled through containerd (`ctr`)
    RegistryImage,
    /// Pulled through the docker daemon
    ContainerImage,
    /// Downloaded over HTTP(S)
    #[default]
    RawDiskImage,
}

/// Certificate file names, resolved by the agent under its certificate directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

/// Parameters of an `Update` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub version: String,
    pub image_kind: ImageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
    /// Hex sha256 of the image file, or the image digest for pulled images
    pub checksum: String,
    /// Allow plain HTTP transfers
    #[serde(default)]
    pub flag_safe: bool,
    #[serde(default)]
    pub mtls: bool,
    #[serde(default)]
    pub certs: CertRefs,
}

/// Set or delete a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOperation {
    #[default]
    Set,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub operation: ConfigOperation,
}

/// One applier invocation: the applier is selected by `model`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUnit {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(default)]
    pub contents: Vec<ConfigEntry>,
}

/// Parameters of a `Configure` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub configs: Vec<ConfigUnit>,
}

/// A request frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum AgentRequest {
    Update(UpdateRequest),
    Rollback,
    Configure(ConfigureRequest),
}

impl AgentRequest {
    /// Method name used in logs and metrics
    pub fn method(&self) -> &'static str {
        match self {
            AgentRequest::Update(_) => "update",
            AgentRequest::Rollback => "rollback",
            AgentRequest::Configure(_) => "configure",
        }
    }
}

/// A response frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AgentResponse {
    Ok,
    Error { kind: AgentErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(AgentRequest::Rollback).unwrap();
        assert_eq!(json, serde_json::json!({"method": "rollback"}));

        let req = AgentRequest::Update(UpdateRequest {
            version: "v2".to_string(),
            image_kind: ImageKind::RawDiskImage,
            image_url: Some("https://images/v2.img".to_string()),
            checksum: "abc".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "update");
        assert_eq!(json["params"]["imageKind"], "raw-disk-image");
        assert_eq!(json["params"]["imageUrl"], "https://images/v2.img");
        assert!(json["params"].get("containerImage").is_none());
    }

    #[test]
    fn test_config_entry_defaults_to_set() {
        let entry: ConfigEntry = serde_json::from_str(r#"{"key":"kernel.pid_max","value":"4096"}"#).unwrap();
        assert_eq!(entry.operation, ConfigOperation::Set);
    }

    #[test]
    fn test_error_response_shape() {
        let resp = AgentResponse::Error {
            kind: AgentErrorKind::Busy,
            message: "another operation is running".to_string(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "busy");
    }
}
