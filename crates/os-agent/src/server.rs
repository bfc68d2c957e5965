//! Agent socket server
//!
//! Listens on a Unix socket inside a directory only the owner and group can
//! enter. Each connection carries one request frame and gets one response
//! frame back.

use crate::executor::Executor;
use agent_client::framing::{read_message, write_message};
use agent_client::{AgentErrorKind, AgentRequest, AgentResponse};
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Mode of the directory holding the socket
pub const SOCKET_DIR_MODE: u32 = 0o750;
/// Mode of the socket itself
pub const SOCKET_MODE: u32 = 0o660;

#[derive(Debug)]
pub struct AgentServer {
    listener: UnixListener,
    socket_path: PathBuf,
    executor: Arc<Executor>,
}

impl AgentServer {
    /// Binds the socket, replacing a stale one left by a previous run
    pub fn bind(socket_path: &Path, executor: Arc<Executor>) -> std::io::Result<Self> {
        if let Some(dir) = socket_path.parent() {
            std::fs::create_dir_all(dir)?;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(SOCKET_DIR_MODE))?;
        }
        match std::fs::remove_file(socket_path) {
            Ok(()) => debug!("Removed stale socket {}", socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(socket_path)?;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
        info!("Listening on {}", socket_path.display());
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            executor,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accepts connections until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let executor = self.executor.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, executor).await;
                            });
                        }
                        Err(e) => warn!("Accept failed: {}", e),
                    }
                }
                () = &mut shutdown => {
                    info!("Shutting down agent server");
                    break;
                }
            }
        }
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!("Failed to remove {}: {}", self.socket_path.display(), e);
        }
        Ok(())
    }
}

async fn handle_connection(mut stream: UnixStream, executor: Arc<Executor>) {
    let response = match read_message::<_, AgentRequest>(&mut stream).await {
        Ok(request) => {
            info!("Received {} request", request.method());
            executor.handle(&request).await
        }
        Err(e) => {
            warn!("Rejecting malformed request: {}", e);
            AgentResponse::Error {
                kind: AgentErrorKind::InvalidRequest,
                message: e.to_string(),
            }
        }
    };
    if let Err(e) = write_message(&mut stream, &response).await {
        // the caller may have timed out, or the machine is rebooting
        error!("Failed to send response: {}", e);
    }
}
