//! Resource-manager seam: inventory listing and lifecycle operations keyed by hash.

use async_trait::async_trait;

use crate::types::{ContainerRecord, ImageRecord};

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("cannot reach container engine: {0}")]
    Connect(String),
    #[error("listing {what} failed: {message}")]
    List { what: &'static str, message: String },
}

/// Result of a lifecycle operation. `message` is empty on success and carries the
/// human-readable failure otherwise; it becomes the body of the `Result` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub success: bool,
    pub message: String,
}

impl OpOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn list_images(&self) -> Result<Vec<ImageRecord>, ResourceError>;
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, ResourceError>;
    async fn start(&self, hash: &str) -> OpOutcome;
    async fn stop(&self, hash: &str) -> OpOutcome;
    async fn remove(&self, hash: &str) -> OpOutcome;
    async fn remove_image(&self, hash: &str) -> OpOutcome;
}
