//! Toolkit configuration.
//!
//! [`ProbeConfig`] holds the knobs that vary between machines (container
//! images, startup deadlines, log level) and can be overridden through the
//! environment. [`HarnessConfig`] is what a test hands to
//! [`HarnessSession::start`](crate::HarnessSession::start): the fixture root
//! plus the ordered list of subsystems to bring up.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PROBE_LOG_LEVEL` | info | Log level for the toolkit |
//! | `PROBE_POSTGRES_IMAGE` | postgres | PostgreSQL image name |
//! | `PROBE_POSTGRES_TAG` | latest | PostgreSQL image tag |
//! | `PROBE_BIGQUERY_IMAGE` | ghcr.io/goccy/bigquery-emulator | BigQuery emulator image name |
//! | `PROBE_BIGQUERY_TAG` | latest | BigQuery emulator image tag |
//! | `PROBE_BIGQUERY_PROJECT` | test | Project id served by the emulator |
//! | `PROBE_STARTUP_TIMEOUT` | 120 | Container startup timeout (seconds) |
//! | `PROBE_READY_TIMEOUT` | 60 | Port readiness deadline (seconds) |
//!
//! # Example
//!
//! ```rust,ignore
//! use helios_probe::{HarnessConfig, PostgresOptions, fixture_dir};
//!
//! let config = HarnessConfig::new(fixture_dir!())
//!     .with_postgres(PostgresOptions::default().with_init_script("init.sql"))
//!     .with_mocks("http://weather.test");
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Machine-level settings for the toolkit.
#[derive(Debug, Clone, Parser)]
#[command(name = "helios-probe")]
#[command(about = "Integration test toolkit settings")]
pub struct ProbeConfig {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "PROBE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// PostgreSQL image name.
    #[arg(long, env = "PROBE_POSTGRES_IMAGE", default_value = "postgres")]
    pub postgres_image: String,

    /// PostgreSQL image tag.
    #[arg(long, env = "PROBE_POSTGRES_TAG", default_value = "latest")]
    pub postgres_tag: String,

    /// BigQuery emulator image name.
    #[arg(
        long,
        env = "PROBE_BIGQUERY_IMAGE",
        default_value = "ghcr.io/goccy/bigquery-emulator"
    )]
    pub bigquery_image: String,

    /// BigQuery emulator image tag.
    #[arg(long, env = "PROBE_BIGQUERY_TAG", default_value = "latest")]
    pub bigquery_tag: String,

    /// Project id the emulator serves.
    #[arg(long, env = "PROBE_BIGQUERY_PROJECT", default_value = "test")]
    pub bigquery_project: String,

    /// Container startup timeout in seconds.
    #[arg(long, env = "PROBE_STARTUP_TIMEOUT", default_value = "120")]
    pub startup_timeout: u64,

    /// Deadline in seconds for a mapped port to accept connections.
    #[arg(long, env = "PROBE_READY_TIMEOUT", default_value = "60")]
    pub ready_timeout: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            postgres_image: "postgres".to_string(),
            postgres_tag: "latest".to_string(),
            bigquery_image: "ghcr.io/goccy/bigquery-emulator".to_string(),
            bigquery_tag: "latest".to_string(),
            bigquery_project: "test".to_string(),
            startup_timeout: 120,
            ready_timeout: 60,
        }
    }
}

impl ProbeConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Only the environment is consulted. The test binary's own arguments
    /// (filters, `--nocapture`) are never parsed.
    pub fn from_env() -> Self {
        Self::try_parse_from(["helios-probe"]).unwrap_or_default()
    }

    /// Returns the container startup timeout.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }

    /// Returns the port readiness deadline.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.postgres_image.trim().is_empty() {
            errors.push("PostgreSQL image cannot be empty".to_string());
        }

        if self.bigquery_image.trim().is_empty() {
            errors.push("BigQuery emulator image cannot be empty".to_string());
        }

        if self.bigquery_project.trim().is_empty() {
            errors.push("BigQuery project cannot be empty".to_string());
        }

        if self.startup_timeout == 0 {
            errors.push("Startup timeout cannot be 0".to_string());
        }

        if self.ready_timeout == 0 {
            errors.push("Ready timeout cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for the toolkit's own tests.
    pub fn for_testing() -> Self {
        Self {
            log_level: "debug".to_string(),
            startup_timeout: 60,
            ready_timeout: 30,
            ..Default::default()
        }
    }
}

/// Options for the PostgreSQL subsystem.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// SQL script run against the fresh database, relative to `<root>/fixtures/`.
    pub init_script: Option<String>,
    /// Database name.
    pub database: String,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Maximum pooled connections.
    pub max_connections: usize,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            init_script: None,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "password".to_string(),
            max_connections: 4,
        }
    }
}

impl PostgresOptions {
    /// Sets the SQL init script.
    pub fn with_init_script(mut self, script: impl Into<String>) -> Self {
        let script = script.into();
        self.init_script = if script.trim().is_empty() {
            None
        } else {
            Some(script)
        };
        self
    }

    /// Sets the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the database credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }
}

/// Options for the outbound HTTP mock subsystem.
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Base URL of the upstream service being stood in for.
    pub base_url: String,
}

/// Options for the BigQuery emulator subsystem.
#[derive(Debug, Clone)]
pub struct BigQueryOptions {
    /// Dataset definition file, relative to the fixture root.
    pub data_path: String,
}

/// An optional piece of infrastructure a harness session brings up.
///
/// Subsystems are set up and torn down in declaration order.
#[derive(Debug, Clone)]
pub enum Subsystem {
    /// Ephemeral PostgreSQL database.
    Postgres(PostgresOptions),
    /// Outbound HTTP mock server.
    Mocks(MockOptions),
    /// Ephemeral BigQuery emulator.
    BigQuery(BigQueryOptions),
}

impl Subsystem {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Postgres(_) => "postgres",
            Subsystem::Mocks(_) => "mocks",
            Subsystem::BigQuery(_) => "bigquery",
        }
    }
}

/// Everything a harness session needs at construction.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory containing the `fixtures/` tree.
    pub fixture_root: PathBuf,
    /// Subsystems in setup order.
    pub subsystems: Vec<Subsystem>,
    /// Machine-level settings.
    pub probe: ProbeConfig,
}

impl HarnessConfig {
    /// Creates a configuration with no subsystems and settings from the environment.
    pub fn new(fixture_root: impl Into<PathBuf>) -> Self {
        Self {
            fixture_root: fixture_root.into(),
            subsystems: Vec::new(),
            probe: ProbeConfig::from_env(),
        }
    }

    /// Adds a PostgreSQL database.
    pub fn with_postgres(mut self, options: PostgresOptions) -> Self {
        self.subsystems.push(Subsystem::Postgres(options));
        self
    }

    /// Adds an outbound HTTP mock server standing in for `base_url`.
    pub fn with_mocks(mut self, base_url: impl Into<String>) -> Self {
        self.subsystems.push(Subsystem::Mocks(MockOptions {
            base_url: base_url.into(),
        }));
        self
    }

    /// Adds a BigQuery emulator loaded from `data_path`.
    pub fn with_bigquery(mut self, data_path: impl Into<String>) -> Self {
        self.subsystems.push(Subsystem::BigQuery(BigQueryOptions {
            data_path: data_path.into(),
        }));
        self
    }

    /// Replaces the machine-level settings.
    pub fn with_probe_config(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.postgres_image, "postgres");
        assert_eq!(config.bigquery_project, "test");
        assert_eq!(config.startup_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_validate_valid() {
        assert!(ProbeConfig::default().validate().is_ok());
        assert!(ProbeConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = ProbeConfig {
            postgres_image: " ".to_string(),
            startup_timeout: 0,
            ready_timeout: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("PostgreSQL")));
    }

    #[test]
    fn test_blank_init_script_is_none() {
        let options = PostgresOptions::default().with_init_script("  ");
        assert!(options.init_script.is_none());

        let options = PostgresOptions::default().with_init_script("seed.sql");
        assert_eq!(options.init_script.as_deref(), Some("seed.sql"));
    }

    #[test]
    fn test_harness_config_keeps_declaration_order() {
        let config = HarnessConfig::new("/tmp")
            .with_mocks("http://weather.test")
            .with_postgres(PostgresOptions::default())
            .with_bigquery("data.yaml");

        let names: Vec<_> = config.subsystems.iter().map(Subsystem::name).collect();
        assert_eq!(names, vec!["mocks", "postgres", "bigquery"]);
    }
}
