//! Single-flight request execution
//!
//! The executor owns the execution lock, the image strategies and the
//! config appliers. A request that finds the lock taken is rejected with
//! `ExecutorError::Busy` instead of waiting.

use crate::appliers::ApplierRegistry;
use crate::config::AgentConfig;
use crate::error::ExecutorError;
use crate::image::ImageRegistry;
use crate::partition::PartitionSwitcher;
use crate::runner::BoxedRunner;
use agent_client::{AgentRequest, AgentResponse, ConfigureRequest, UpdateRequest};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct Executor {
    lock: Mutex<()>,
    images: ImageRegistry,
    switcher: PartitionSwitcher,
    appliers: ApplierRegistry,
}

impl Executor {
    /// Builds an executor with the standard image strategies
    pub fn new(config: &AgentConfig, runner: BoxedRunner) -> Self {
        let images = ImageRegistry::standard(config, runner.clone());
        Self::with_images(config, runner, images)
    }

    /// Builds an executor with a custom image registry
    pub fn with_images(config: &AgentConfig, runner: BoxedRunner, images: ImageRegistry) -> Self {
        let switcher = PartitionSwitcher::new(
            runner,
            config.partition_a.clone(),
            config.partition_b.clone(),
            config.grub_env_path.clone(),
        );
        let appliers = ApplierRegistry::new(config, switcher.clone());
        Self {
            lock: Mutex::new(()),
            images,
            switcher,
            appliers,
        }
    }

    /// Runs one request under the execution lock
    pub async fn execute(&self, request: &AgentRequest) -> Result<(), ExecutorError> {
        let _guard = self.lock.try_lock().map_err(|_held| ExecutorError::Busy)?;
        match request {
            AgentRequest::Update(update) => self.update(update).await,
            AgentRequest::Rollback => self.rollback().await,
            AgentRequest::Configure(configure) => self.configure(configure).await,
        }
    }

    /// Runs one request and converts the outcome into a response frame
    pub async fn handle(&self, request: &AgentRequest) -> AgentResponse {
        let method = request.method();
        match self.execute(request).await {
            Ok(()) => {
                info!("{} completed", method);
                AgentResponse::Ok
            }
            Err(ExecutorError::Busy) => {
                warn!("Rejecting {}: another operation is in progress", method);
                AgentResponse::Error {
                    kind: ExecutorError::Busy.kind(),
                    message: ExecutorError::Busy.to_string(),
                }
            }
            Err(e) => {
                error!("{} failed: {}", method, e);
                AgentResponse::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), ExecutorError> {
        if request.version.is_empty() {
            return Err(ExecutorError::InvalidRequest("version is required".to_string()));
        }
        info!("Updating to {} from {:?}", request.version, request.image_kind);
        let source = self.images.get(request.image_kind)?;
        let image = source.prepare(request).await?;

        let target = self.switcher.inactive().await?;
        let switched = self.switch(&image, target).await;
        if let Err(e) = tokio::fs::remove_file(&image).await {
            warn!("Failed to remove staged image {}: {}", image.display(), e);
        }
        switched?;

        self.switcher.reboot().await
    }

    async fn switch(&self, image: &Path, target: crate::partition::Partition) -> Result<(), ExecutorError> {
        self.switcher.write_image(image, target).await?;
        self.switcher.set_default_entry(target).await
    }

    async fn rollback(&self) -> Result<(), ExecutorError> {
        let target = self.switcher.inactive().await?;
        info!("Rolling back to partition {}", target);
        self.switcher.set_default_entry(target).await?;
        self.switcher.reboot().await
    }

    async fn configure(&self, request: &ConfigureRequest) -> Result<(), ExecutorError> {
        self.appliers.apply_all(&request.configs).await
    }
}
