//! Raw disk image downloaded over HTTP(S)

use super::{ensure_free_space, remove_if_exists, verify_digest, ImageSource, UPDATE_IMAGE_NAME};
use crate::certs::load_tls_material;
use crate::error::ExecutorError;
use crate::runner::BoxedRunner;
use agent_client::UpdateRequest;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Streams `imageUrl` to the staging directory while hashing it.
///
/// Plain HTTP is refused unless `flagSafe` is set. A file whose sha256 does
/// not match `checksum` is deleted before the error is returned.
#[derive(Debug, Clone)]
pub struct DiskImageSource {
    runner: BoxedRunner,
    image_dir: PathBuf,
    cert_dir: PathBuf,
}

impl DiskImageSource {
    pub fn new(runner: BoxedRunner, image_dir: PathBuf, cert_dir: PathBuf) -> Self {
        Self {
            runner,
            image_dir,
            cert_dir,
        }
    }

    async fn http_client(&self, request: &UpdateRequest, https: bool) -> Result<reqwest::Client, ExecutorError> {
        let mut builder = reqwest::Client::builder();
        if https {
            let material = load_tls_material(&self.cert_dir, &request.certs, request.mtls).await?;
            if let Some(ca) = material.ca_cert {
                builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&ca)?);
            }
            if let Some(identity) = material.identity {
                builder = builder.identity(reqwest::Identity::from_pem(&identity)?);
            }
        }
        Ok(builder.build()?)
    }

    async fn download(&self, response: reqwest::Response, dest: &Path) -> Result<String, ExecutorError> {
        let mut response = response;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Checks the transfer scheme against the request's safety flag
fn check_scheme(url: &str, flag_safe: bool) -> Result<bool, ExecutorError> {
    if url.starts_with("https://") {
        Ok(true)
    } else if url.starts_with("http://") {
        if flag_safe {
            warn!("Downloading {} over plain HTTP", url);
            Ok(false)
        } else {
            Err(ExecutorError::InvalidRequest(format!(
                "refusing plain HTTP download of {} without flagSafe",
                url
            )))
        }
    } else {
        Err(ExecutorError::InvalidRequest(format!("unsupported image URL {}", url)))
    }
}

#[async_trait]
impl ImageSource for DiskImageSource {
    async fn prepare(&self, request: &UpdateRequest) -> Result<PathBuf, ExecutorError> {
        let url = request
            .image_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ExecutorError::InvalidRequest("imageUrl is required".to_string()))?;
        let https = check_scheme(url, request.flag_safe)?;
        let client = self.http_client(request, https).await?;

        info!("Downloading image {}", url);
        let response = client.get(url).send().await?.error_for_status()?;
        if let Some(len) = response.content_length() {
            ensure_free_space(&self.runner, &self.image_dir, len).await?;
        }

        let dest = self.image_dir.join(UPDATE_IMAGE_NAME);
        let outcome = match self.download(response, &dest).await {
            Ok(actual) => verify_digest(&request.checksum, &actual),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            remove_if_exists(&dest).await;
            return Err(e);
        }
        Ok(dest)
    }
}
