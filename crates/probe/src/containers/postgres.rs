//! Ephemeral PostgreSQL database.

use std::path::Path;

use deadpool_postgres::{Config, Pool, Runtime};
use testcontainers::core::{CmdWaitFor, ExecCommand};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use super::{SESSION_LABEL, session_id, wait_for_endpoint};
use crate::config::{PostgresOptions, ProbeConfig};
use crate::error::{ProbeError, ProbeResult};
use crate::fixtures::{FixtureStore, read_file};

const POSTGRES_PORT: u16 = 5432;

/// A running PostgreSQL container and a pool connected to it.
pub struct PostgresInstance {
    host: String,
    port: u16,
    database: String,
    user: String,
    password: String,
    pool: Pool,
    container: ContainerAsync<Postgres>,
}

impl std::fmt::Debug for PostgresInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresInstance")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("container", &self.container.id())
            .finish_non_exhaustive()
    }
}

impl PostgresInstance {
    /// Starts a database, runs the init script if any and connects a pool.
    pub async fn start(
        options: &PostgresOptions,
        fixtures: &FixtureStore,
        probe: &ProbeConfig,
    ) -> ProbeResult<Self> {
        let mut image = Postgres::default()
            .with_db_name(&options.database)
            .with_user(&options.user)
            .with_password(&options.password)
            .with_name(&probe.postgres_image)
            .with_tag(&probe.postgres_tag)
            .with_label(SESSION_LABEL, session_id())
            .with_startup_timeout(probe.startup_timeout());

        let script = match options.init_script.as_deref() {
            Some(relative) => {
                let path = fixtures.fixture_path(relative);
                let target = script_target(&path);
                image = image.with_copy_to(target.clone(), read_file(&path)?);
                Some(target)
            }
            None => None,
        };

        let container = image.start().await?;
        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(POSTGRES_PORT).await?;
        info!(host = %host, port, container = %container.id(), "PostgreSQL container started");

        wait_for_endpoint(&host, port, probe.ready_timeout()).await?;

        if let Some(target) = script {
            run_script(&container, options, &target).await?;
        }

        let pool = create_pool(&host, port, options)?;
        let client = pool.get().await.map_err(|err| ProbeError::Database {
            message: format!("could not connect to {}:{}: {}", host, port, err),
        })?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|err| ProbeError::Database {
                message: err.to_string(),
            })?;
        drop(client);

        Ok(Self {
            host,
            port,
            database: options.database.clone(),
            user: options.user.clone(),
            password: options.password.clone(),
            pool,
            container,
        })
    }

    /// Host the database is reachable on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Mapped host port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Database user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password of [`user`](Self::user).
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns a `postgres://` URL for clients that take one.
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode=disable",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Closes the pool and removes the container.
    pub async fn terminate(self) -> ProbeResult<()> {
        self.pool.close();
        let id = self.container.id().to_string();
        self.container.rm().await?;
        debug!(container = %id, "PostgreSQL container removed");
        Ok(())
    }
}

/// Where an init script lands inside the container.
fn script_target(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "init.sql".to_string());
    format!("/{}", name)
}

/// `psql` invocation that runs `target`, stopping at the first failing statement.
fn script_command(options: &PostgresOptions, target: &str) -> Vec<String> {
    vec![
        "psql".to_string(),
        "-v".to_string(),
        "ON_ERROR_STOP=1".to_string(),
        "-U".to_string(),
        options.user.clone(),
        "-d".to_string(),
        options.database.clone(),
        "-f".to_string(),
        target.to_string(),
    ]
}

async fn run_script(
    container: &ContainerAsync<Postgres>,
    options: &PostgresOptions,
    target: &str,
) -> ProbeResult<()> {
    let command = script_command(options, target);
    let rendered = command.join(" ");

    let mut result = container
        .exec(ExecCommand::new(command).with_cmd_ready_condition(CmdWaitFor::exit()))
        .await?;

    let stdout = String::from_utf8_lossy(&result.stdout_to_vec().await?).into_owned();
    let stderr = String::from_utf8_lossy(&result.stderr_to_vec().await?).into_owned();
    debug!(command = %rendered, stdout = %stdout, stderr = %stderr, "Ran init script");

    let exit_code = result.exit_code().await?;
    if exit_code != Some(0) {
        return Err(ProbeError::ContainerExec {
            command: rendered,
            exit_code,
            stderr,
        });
    }
    Ok(())
}

fn create_pool(host: &str, port: u16, options: &PostgresOptions) -> ProbeResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(host.to_string());
    cfg.port = Some(port);
    cfg.dbname = Some(options.database.clone());
    cfg.user = Some(options.user.clone());
    cfg.password = Some(options.password.clone());

    cfg.builder(NoTls)
        .map_err(|e| ProbeError::Database {
            message: format!("Failed to create pool builder: {}", e),
        })?
        .max_size(options.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| ProbeError::Database {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_script_target_uses_file_name() {
        assert_eq!(script_target(&PathBuf::from("/srv/tests/fixtures/sql/seed.sql")), "/seed.sql");
    }

    #[test]
    fn test_script_command() {
        let options = PostgresOptions::default()
            .with_database("orders")
            .with_credentials("orders_app", "secret");
        assert_eq!(
            script_command(&options, "/init.sql").join(" "),
            "psql -v ON_ERROR_STOP=1 -U orders_app -d orders -f /init.sql"
        );
    }

    #[test]
    fn test_create_pool_does_not_connect() {
        let pool = create_pool("127.0.0.1", 1, &PostgresOptions::default()).unwrap();
        assert_eq!(pool.status().max_size, 4);
    }
}
