//! Certificate resolution for image downloads
//!
//! Requests name certificates by file name only; files are looked up under
//! the agent's certificate directory. A referenced file that does not exist
//! is an error, never skipped.

use crate::error::ExecutorError;
use agent_client::CertRefs;
use std::path::{Component, Path, PathBuf};

/// PEM material loaded for one download
#[derive(Debug, Default)]
pub struct TlsMaterial {
    pub ca_cert: Option<Vec<u8>>,
    /// Client certificate followed by its key
    pub identity: Option<Vec<u8>>,
}

/// Resolves `name` under `cert_dir`, rejecting paths that escape it
pub fn resolve_cert(cert_dir: &Path, name: &str) -> Result<PathBuf, ExecutorError> {
    let relative = Path::new(name);
    if name.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(ExecutorError::Certificate(format!("invalid certificate name '{}'", name)));
    }
    let path = cert_dir.join(relative);
    if !path.is_file() {
        return Err(ExecutorError::Certificate(format!("{} does not exist", path.display())));
    }
    Ok(path)
}

async fn read_cert(cert_dir: &Path, name: &str) -> Result<Vec<u8>, ExecutorError> {
    let path = resolve_cert(cert_dir, name)?;
    tokio::fs::read(&path)
        .await
        .map_err(|e| ExecutorError::Certificate(format!("cannot read {}: {}", path.display(), e)))
}

fn required<'a>(name: &'a Option<String>, what: &str) -> Result<&'a str, ExecutorError> {
    name.as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ExecutorError::Certificate(format!("mTLS requires {}", what)))
}

/// Loads the CA and, with `mtls`, the client identity
pub async fn load_tls_material(cert_dir: &Path, certs: &CertRefs, mtls: bool) -> Result<TlsMaterial, ExecutorError> {
    if !mtls {
        let ca_cert = match certs.ca_cert.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => Some(read_cert(cert_dir, name).await?),
            None => None,
        };
        return Ok(TlsMaterial { ca_cert, identity: None });
    }

    let ca_cert = read_cert(cert_dir, required(&certs.ca_cert, "a CA certificate")?).await?;
    let mut identity = read_cert(cert_dir, required(&certs.client_cert, "a client certificate")?).await?;
    let key = read_cert(cert_dir, required(&certs.client_key, "a client key")?).await?;
    if !identity.ends_with(b"\n") {
        identity.push(b'\n');
    }
    identity.extend_from_slice(&key);

    Ok(TlsMaterial {
        ca_cert: Some(ca_cert),
        identity: Some(identity),
    })
}
