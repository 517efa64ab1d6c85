// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::node_config::RuntimeConfig;
use crate::domain::retry::RetryPolicy;
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use crate::domain::workflow::Action;
use crate::infrastructure::failure_files::FailureFiles;
use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extra time allowed for the stop request itself beyond the container's grace period.
const STOP_REQUEST_SLACK: Duration = Duration::from_secs(5);

pub struct DockerRuntime {
    docker: Docker,
    pull_retry: RetryPolicy,
    stop_timeout: Duration,
    failure_files_dir: Option<PathBuf>,
}

impl DockerRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = match &config.docker_socket_path {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    RuntimeError::Engine(format!("Failed to connect to Docker at {}: {}", path, e))
                })?,
            None => Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::Engine(format!("Failed to connect to Docker: {}", e)))?,
        };

        Ok(Self {
            docker,
            pull_retry: config.pull_retry_policy(),
            stop_timeout: Duration::from_secs(config.stop_timeout_seconds),
            failure_files_dir: config.failure_files_dir.as_ref().map(PathBuf::from),
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Engine(format!("Cannot connect to Docker daemon: {}", e)))?;
        Ok(())
    }

    async fn ensure_image(&self, ctx: &CancellationToken, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image present locally");
            return Ok(());
        }

        info!(image, "Pulling image");
        tokio::select! {
            _ = ctx.cancelled() => Err(RuntimeError::Cancelled),
            result = self.pull_retry.retry("pull_image", || self.pull_image(image)) => {
                result.map_err(|exhausted| RuntimeError::ImagePull {
                    image: image.to_string(),
                    message: format!("{} (after {} attempts)", exhausted.error, exhausted.attempts),
                })?;
                info!(image, "Successfully pulled image");
                Ok(())
            }
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), BollardError> {
        let (name, tag) = split_image_reference(image);
        let mut options = CreateImageOptionsBuilder::new().from_image(name);
        if let Some(tag) = tag {
            options = options.tag(tag);
        }
        self.docker
            .create_image(Some(options.build()), None, None)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    async fn run_container(
        &self,
        ctx: &CancellationToken,
        action: &Action,
        name: &str,
        files: &FailureFiles,
    ) -> Result<(), RuntimeError> {
        let config = container_config(action, files.binds());
        let options = CreateContainerOptionsBuilder::new().name(name).build();
        tokio::select! {
            _ = ctx.cancelled() => return Err(RuntimeError::Cancelled),
            created = self.docker.create_container(Some(options), config) => {
                created.map_err(|e| engine_error("create_container", name, e))?;
            }
        }

        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(|e| engine_error("start_container", name, e))?;
        debug!(container = name, action_id = %action.id, "Container started");

        let limit = action.timeout();
        tokio::select! {
            exit = self.wait(name) => {
                let exit_code = exit?;
                if exit_code == 0 {
                    Ok(())
                } else {
                    debug!(container = name, exit_code, "Container exited non-zero");
                    Err(files.to_error(exit_code))
                }
            }
            _ = ctx.cancelled() => {
                info!(container = name, action_id = %action.id, "Action cancelled, stopping container");
                self.stop(name).await;
                Err(RuntimeError::Cancelled)
            }
            _ = tokio::time::sleep(limit.unwrap_or_default()), if limit.is_some() => {
                warn!(container = name, action_id = %action.id, timeout = ?limit, "Action timed out, stopping container");
                self.stop(name).await;
                Err(RuntimeError::Timeout(limit.unwrap_or_default()))
            }
        }
    }

    async fn wait(&self, name: &str) -> Result<i64, RuntimeError> {
        let options = WaitContainerOptionsBuilder::new()
            .condition("not-running")
            .build();
        let mut stream = self.docker.wait_container(name, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(engine_error("wait_container", name, e)),
            None => Err(RuntimeError::Engine(format!(
                "wait_container returned no status for {}",
                name
            ))),
        }
    }

    /// Graceful stop bounded by the configured grace period. Errors are logged.
    async fn stop(&self, name: &str) {
        let grace = self.stop_timeout.as_secs().min(i32::MAX as u64) as i32;
        let options = StopContainerOptionsBuilder::new().t(grace).build();
        let request = self.docker.stop_container(name, Some(options));
        match tokio::time::timeout(self.stop_timeout + STOP_REQUEST_SLACK, request).await {
            Ok(Ok(())) => debug!(container = name, "Container stopped"),
            Ok(Err(e)) => warn!(container = name, error = %e, "Failed to stop container"),
            Err(_) => warn!(container = name, "Timed out stopping container"),
        }
    }

    /// Forced removal. Errors are logged, never returned.
    async fn remove(&self, name: &str) {
        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(true)
            .build();
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => debug!(container = name, "Container removed"),
            Err(e) if is_not_found_error(&e) => {}
            Err(e) => warn!(container = name, error = %e, "Failed to remove container"),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, ctx: CancellationToken, action: &Action) -> Result<(), RuntimeError> {
        self.ensure_image(&ctx, &action.image).await?;

        let files = FailureFiles::create(self.failure_files_dir.as_deref())
            .map_err(|e| RuntimeError::Engine(format!("Failed to create failure files: {}", e)))?;
        let name = format!("ironworks-action-{}", uuid::Uuid::new_v4().simple());

        let result = self.run_container(&ctx, action, &name, &files).await;
        self.remove(&name).await;
        result
    }
}

fn container_config(action: &Action, failure_binds: Vec<String>) -> ContainerCreateBody {
    let mut binds = action.volumes.clone();
    binds.extend(failure_binds);

    let env = action.env_pairs();

    ContainerCreateBody {
        image: Some(action.image.clone()),
        entrypoint: action
            .command
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| vec![c.clone()]),
        cmd: if action.args.is_empty() {
            None
        } else {
            Some(action.args.clone())
        },
        env: if env.is_empty() { None } else { Some(env) },
        host_config: Some(HostConfig {
            binds: Some(binds),
            network_mode: action
                .network_namespace
                .clone()
                .filter(|n| !n.is_empty()),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

/// Split `name[:tag]`; references pinned by digest carry no separate tag.
fn split_image_reference(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    match image.rsplit_once(':') {
        // A colon before the last slash belongs to a registry port
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (image, Some("latest")),
    }
}

fn is_not_found_error(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn engine_error(operation: &str, container: &str, source: BollardError) -> RuntimeError {
    RuntimeError::Engine(format!("{} failed for {}: {}", operation, container, source))
}
