//! Mapping from CRD types to agent requests

use agent_client::{CertRefs, ConfigureRequest, UpdateRequest};
use crds::{ConfigBundle, ConfigOperation, DesiredStateSpec, ImageKind};

fn image_kind(kind: ImageKind) -> agent_client::ImageKind {
    match kind {
        ImageKind::RegistryImage => agent_client::ImageKind::RegistryImage,
        ImageKind::ContainerImage => agent_client::ImageKind::ContainerImage,
        ImageKind::RawDiskImage => agent_client::ImageKind::RawDiskImage,
    }
}

fn operation(op: ConfigOperation) -> agent_client::ConfigOperation {
    match op {
        ConfigOperation::Set => agent_client::ConfigOperation::Set,
        ConfigOperation::Delete => agent_client::ConfigOperation::Delete,
    }
}

pub fn update_request(spec: &DesiredStateSpec) -> UpdateRequest {
    UpdateRequest {
        version: spec.os_version.clone(),
        image_kind: image_kind(spec.image_type),
        image_url: spec.image_url.clone(),
        container_image: spec.container_image.clone(),
        checksum: spec.checksum.clone(),
        flag_safe: spec.flag_safe,
        mtls: spec.mtls,
        certs: CertRefs {
            ca_cert: spec.ca_cert.clone(),
            client_cert: spec.client_cert.clone(),
            client_key: spec.client_key.clone(),
        },
    }
}

pub fn configure_request(bundle: &ConfigBundle) -> ConfigureRequest {
    ConfigureRequest {
        configs: bundle
            .configs
            .iter()
            .map(|unit| agent_client::ConfigUnit {
                model: unit.model.clone(),
                config_path: unit.config_path.clone(),
                contents: unit
                    .contents
                    .iter()
                    .map(|entry| agent_client::ConfigEntry {
                        key: entry.key.clone(),
                        value: entry.value.clone(),
                        operation: operation(entry.operation),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{ConfigEntry, ConfigUnit};

    #[test]
    fn test_configure_request_keeps_unit_order() {
        let bundle = ConfigBundle {
            version: "v1".to_string(),
            configs: vec![
                ConfigUnit {
                    model: "kernel.sysctl".to_string(),
                    config_path: None,
                    contents: vec![ConfigEntry {
                        key: "vm.swappiness".to_string(),
                        value: Some("10".to_string()),
                        operation: ConfigOperation::Set,
                    }],
                },
                ConfigUnit {
                    model: "kernel.sysctl.persist".to_string(),
                    config_path: Some("/etc/sysctl.d/90-fleetos.conf".to_string()),
                    contents: vec![ConfigEntry {
                        key: "kernel.panic".to_string(),
                        value: None,
                        operation: ConfigOperation::Delete,
                    }],
                },
            ],
        };

        let request = configure_request(&bundle);
        let models: Vec<&str> = request.configs.iter().map(|u| u.model.as_str()).collect();
        assert_eq!(models, vec!["kernel.sysctl", "kernel.sysctl.persist"]);
        assert_eq!(
            request.configs[1].config_path.as_deref(),
            Some("/etc/sysctl.d/90-fleetos.conf")
        );
        assert_eq!(request.configs[1].contents[0].operation, agent_client::ConfigOperation::Delete);
    }
}
