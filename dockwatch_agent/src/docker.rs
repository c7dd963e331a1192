//! Docker engine access via bollard.

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerSummary, ImageSummary};
use bollard::query_parameters::{
    ListContainersOptionsBuilder, ListImagesOptionsBuilder, RemoveContainerOptionsBuilder,
    RemoveImageOptionsBuilder, StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use tracing::{debug, warn};

use crate::resources::{OpOutcome, ResourceError, ResourceManager};
use crate::types::{ContainerRecord, ImageRecord};

const UNTAGGED: &str = "<none>:<none>";

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    /// Connect using `DOCKER_HOST` or the platform default socket.
    pub fn connect() -> Result<Self, ResourceError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ResourceError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }
}

fn image_record(img: ImageSummary) -> ImageRecord {
    ImageRecord {
        id: 0,
        name: img
            .repo_tags
            .into_iter()
            .next()
            .unwrap_or_else(|| UNTAGGED.to_string()),
        size_bytes: img.size as f64,
        hash: img.id,
    }
}

fn container_record(c: ContainerSummary) -> ContainerRecord {
    ContainerRecord {
        id: 0,
        name: c.names.unwrap_or_default().concat(),
        image_id: 0,
        image_hash: c.image_id.unwrap_or_default(),
        status: c.state.map(|s| s.to_string()).unwrap_or_default(),
        resources: String::new(),
        hash: c.id.unwrap_or_default(),
    }
}

fn outcome<T>(op: &str, target: &str, res: Result<T, BollardError>) -> OpOutcome {
    match res {
        Ok(_) => {
            debug!(op, target, "docker operation succeeded");
            OpOutcome::ok()
        }
        Err(e) => {
            warn!(op, target, "docker operation failed: {e}");
            OpOutcome::failed(format!("{op} {target} failed: {e}"))
        }
    }
}

#[async_trait]
impl ResourceManager for DockerManager {
    async fn list_images(&self) -> Result<Vec<ImageRecord>, ResourceError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptionsBuilder::new().all(false).build()))
            .await
            .map_err(|e| ResourceError::List {
                what: "images",
                message: e.to_string(),
            })?;
        Ok(images.into_iter().map(image_record).collect())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, ResourceError> {
        // Include stopped containers: a stop is an update, not a removal.
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptionsBuilder::new().all(true).build()))
            .await
            .map_err(|e| ResourceError::List {
                what: "containers",
                message: e.to_string(),
            })?;
        Ok(containers.into_iter().map(container_record).collect())
    }

    async fn start(&self, hash: &str) -> OpOutcome {
        let res = self
            .docker
            .start_container(hash, None::<StartContainerOptions>)
            .await;
        outcome("start container", hash, res)
    }

    async fn stop(&self, hash: &str) -> OpOutcome {
        let res = self
            .docker
            .stop_container(hash, None::<StopContainerOptions>)
            .await;
        outcome("stop container", hash, res)
    }

    async fn remove(&self, hash: &str) -> OpOutcome {
        let res = self
            .docker
            .remove_container(
                hash,
                Some(RemoveContainerOptionsBuilder::new().force(true).build()),
            )
            .await;
        outcome("remove container", hash, res)
    }

    async fn remove_image(&self, hash: &str) -> OpOutcome {
        let res = self
            .docker
            .remove_image(
                hash,
                Some(RemoveImageOptionsBuilder::new().force(true).build()),
                None,
            )
            .await;
        outcome("remove image", hash, res)
    }
}
