//! Ephemeral BigQuery emulator.

use testcontainers::core::{IntoContainerPort, Mount, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::{debug, info};

use super::{SESSION_LABEL, session_id, wait_for_endpoint};
use crate::config::{BigQueryOptions, ProbeConfig};
use crate::error::{ProbeError, ProbeResult};
use crate::fixtures::FixtureStore;

const REST_PORT: u16 = 9050;
const GRPC_PORT: u16 = 9060;
const DATA_MOUNT: &str = "/mnt/data.yaml";

/// A running BigQuery emulator loaded from a dataset file.
pub struct BigQueryInstance {
    host: String,
    rest_port: u16,
    grpc_port: u16,
    project: String,
    container: ContainerAsync<GenericImage>,
}

impl std::fmt::Debug for BigQueryInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryInstance")
            .field("host", &self.host)
            .field("rest_port", &self.rest_port)
            .field("grpc_port", &self.grpc_port)
            .field("project", &self.project)
            .field("container", &self.container.id())
            .finish()
    }
}

impl BigQueryInstance {
    /// Starts the emulator with the dataset file mounted read-only.
    pub async fn start(
        options: &BigQueryOptions,
        fixtures: &FixtureStore,
        probe: &ProbeConfig,
    ) -> ProbeResult<Self> {
        let source = fixtures.resolve(&options.data_path);
        let source = source
            .canonicalize()
            .map_err(|_| ProbeError::FixtureNotFound { path: source })?;

        let project = probe.bigquery_project.clone();
        let container = GenericImage::new(&probe.bigquery_image, &probe.bigquery_tag)
            .with_exposed_port(REST_PORT.tcp())
            .with_exposed_port(GRPC_PORT.tcp())
            // Readiness is probed on the gRPC port below.
            .with_wait_for(WaitFor::seconds(1))
            .with_mount(Mount::bind_mount(source.to_string_lossy(), DATA_MOUNT))
            .with_cmd(emulator_args(&project))
            .with_label(SESSION_LABEL, session_id())
            .with_startup_timeout(probe.startup_timeout())
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let rest_port = container.get_host_port_ipv4(REST_PORT).await?;
        let grpc_port = container.get_host_port_ipv4(GRPC_PORT).await?;
        info!(host = %host, rest_port, grpc_port, project = %project, "BigQuery emulator started");

        wait_for_endpoint(&host, grpc_port, probe.ready_timeout()).await?;

        Ok(Self {
            host,
            rest_port,
            grpc_port,
            project,
            container,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn rest_port(&self) -> u16 {
        self.rest_port
    }

    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
    }

    /// Project id the emulator serves.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Base URL of the REST API.
    pub fn rest_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.rest_port)
    }

    /// `host:port` of the gRPC API.
    pub fn grpc_endpoint(&self) -> String {
        format!("{}:{}", self.host, self.grpc_port)
    }

    /// Removes the container.
    pub async fn terminate(self) -> ProbeResult<()> {
        let id = self.container.id().to_string();
        self.container.rm().await?;
        debug!(container = %id, "BigQuery emulator removed");
        Ok(())
    }
}

fn emulator_args(project: &str) -> Vec<String> {
    vec![
        format!("--project={}", project),
        format!("--data-from-yaml={}", DATA_MOUNT),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_args() {
        assert_eq!(
            emulator_args("test"),
            vec!["--project=test", "--data-from-yaml=/mnt/data.yaml"]
        );
    }

    #[tokio::test]
    async fn test_missing_dataset_fails_before_docker() {
        let store = FixtureStore::new("/nonexistent");
        let options = BigQueryOptions {
            data_path: "fixtures/data.yaml".to_string(),
        };
        let err = BigQueryInstance::start(&options, &store, &ProbeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::FixtureNotFound { .. }));
    }
}
