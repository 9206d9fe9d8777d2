//! Per-test harness sessions.
//!
//! A [`HarnessSession`] owns everything one integration test needs: the
//! fixture store and whichever subsystems the [`HarnessConfig`] declares.
//! Subsystems come up in declaration order and go down in the same order.
//! A failed setup fails the test; a failed teardown is only logged.
//!
//! # Example
//!
//! ```rust,ignore
//! use helios_probe::{HarnessConfig, HarnessSession, TestCase, fixture_dir};
//!
//! #[tokio::test]
//! async fn live_probe() {
//!     let mut session = HarnessSession::start(HarnessConfig::new(fixture_dir!())).await;
//!
//!     let case = TestCase::new("live probe", Method::GET, live)
//!         .expect_response("live-probe-ok");
//!     let result = session.run(&case).await;
//!     session.assert(&case, &result);
//!
//!     session.teardown().await;
//! }
//! ```

use http::Method;
use tracing::{debug, info, warn};

use crate::assert::{ResultAsserter, TestCase};
use crate::config::{HarnessConfig, ProbeConfig, Subsystem};
use crate::containers::{BigQueryInstance, PostgresInstance};
use crate::error::{ProbeError, ProbeResult};
use crate::fixtures::FixtureStore;
use crate::mock::MockRegistrar;
use crate::request::{ExecutionResult, Params, RequestBuilder, RequestContext, ResponseRecorder};

/// A subsystem that has been set up.
#[derive(Debug)]
enum Running {
    Postgres(PostgresInstance),
    Mocks(MockRegistrar),
    BigQuery(BigQueryInstance),
}

impl Running {
    fn name(&self) -> &'static str {
        match self {
            Running::Postgres(_) => "postgres",
            Running::Mocks(_) => "mocks",
            Running::BigQuery(_) => "bigquery",
        }
    }

    async fn setup(
        subsystem: &Subsystem,
        fixtures: &FixtureStore,
        probe: &ProbeConfig,
    ) -> ProbeResult<Self> {
        Ok(match subsystem {
            Subsystem::Postgres(options) => {
                Running::Postgres(PostgresInstance::start(options, fixtures, probe).await?)
            }
            Subsystem::Mocks(options) => {
                Running::Mocks(MockRegistrar::start(&options.base_url, fixtures.clone()).await?)
            }
            Subsystem::BigQuery(options) => {
                Running::BigQuery(BigQueryInstance::start(options, fixtures, probe).await?)
            }
        })
    }

    async fn teardown(self) {
        let name = self.name();
        let result = match self {
            Running::Postgres(instance) => instance.terminate().await,
            Running::Mocks(registrar) => {
                registrar.teardown().await;
                Ok(())
            }
            Running::BigQuery(instance) => instance.terminate().await,
        };

        match result {
            Ok(()) => debug!(subsystem = name, "Torn down"),
            Err(err) => warn!(subsystem = name, error = %err, "Teardown failed"),
        }
    }
}

/// The infrastructure owned by one integration test.
#[derive(Debug)]
pub struct HarnessSession {
    fixtures: FixtureStore,
    running: Vec<Running>,
}

impl HarnessSession {
    /// Sets up every declared subsystem, failing the test on the first error.
    pub async fn start(config: HarnessConfig) -> Self {
        Self::try_start(config)
            .await
            .unwrap_or_else(|err| panic!("harness setup failed: {}", err))
    }

    /// Sets up every declared subsystem.
    ///
    /// On failure the subsystems already running are torn down before the
    /// error is returned.
    pub async fn try_start(config: HarnessConfig) -> ProbeResult<Self> {
        crate::init_test_logging();

        config
            .probe
            .validate()
            .map_err(|errors| ProbeError::Config {
                message: errors.join("; "),
            })?;

        let fixtures = FixtureStore::new(&config.fixture_root);
        let mut running = Vec::with_capacity(config.subsystems.len());

        for subsystem in &config.subsystems {
            info!(subsystem = subsystem.name(), "Setting up");
            match Running::setup(subsystem, &fixtures, &config.probe).await {
                Ok(started) => running.push(started),
                Err(err) => {
                    for started in running {
                        started.teardown().await;
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self { fixtures, running })
    }

    /// Tears down every subsystem in declaration order.
    pub async fn teardown(self) {
        for started in self.running {
            started.teardown().await;
        }
    }

    /// Returns the session's fixture store.
    pub fn fixtures(&self) -> &FixtureStore {
        &self.fixtures
    }

    /// Returns the database, if one was declared.
    pub fn database(&self) -> Option<&PostgresInstance> {
        self.running.iter().find_map(|r| match r {
            Running::Postgres(instance) => Some(instance),
            _ => None,
        })
    }

    /// Returns the BigQuery emulator, if one was declared.
    pub fn bigquery(&self) -> Option<&BigQueryInstance> {
        self.running.iter().find_map(|r| match r {
            Running::BigQuery(instance) => Some(instance),
            _ => None,
        })
    }

    /// Returns the mock registrar, if one was declared.
    pub fn mock(&self) -> Option<&MockRegistrar> {
        self.running.iter().find_map(|r| match r {
            Running::Mocks(registrar) => Some(registrar),
            _ => None,
        })
    }

    /// Mutable access to the first mock registrar, if one was declared.
    pub fn mock_mut(&mut self) -> Option<&mut MockRegistrar> {
        self.running.iter_mut().find_map(|r| match r {
            Running::Mocks(registrar) => Some(registrar),
            _ => None,
        })
    }

    /// Registers the case's mocks, failing the test if a reply fixture is missing.
    ///
    /// Without a mock subsystem the declarations are skipped.
    pub async fn load_mocks(&mut self, case: &TestCase) {
        let Some(registrar) = self.mock_mut() else {
            if !case.mocks.is_empty() {
                debug!(case = %case.name, "No mock subsystem, skipping {} mock(s)", case.mocks.len());
            }
            return;
        };

        for declaration in &case.mocks {
            if let Err(err) = registrar.register(declaration).await {
                panic!("[{}] could not register mock {}: {}", case.name, declaration, err);
            }
        }
    }

    /// Builds a request whose body fixture comes from this session's store.
    pub fn request(&self, method: Method, params: &Params) -> (RequestContext, ResponseRecorder) {
        RequestBuilder::new(&self.fixtures).build(method, params)
    }

    /// Registers mocks, builds the request, calls the handler and records the outcome.
    pub async fn run(&mut self, case: &TestCase) -> ExecutionResult {
        self.run_with(case, |_| {}).await
    }

    /// Like [`run`](Self::run), letting `prepare` adjust the context before the handler is called.
    pub async fn run_with<F>(&mut self, case: &TestCase, prepare: F) -> ExecutionResult
    where
        F: FnOnce(&mut RequestContext),
    {
        self.load_mocks(case).await;

        let (mut ctx, recorder) = self.request(case.method.clone(), &case.params);
        prepare(&mut ctx);

        let outcome = case.handler.call(ctx).await;
        recorder.record(outcome).await
    }

    /// Fails the test if `result` does not match `case`.
    pub fn assert(&self, case: &TestCase, result: &ExecutionResult) {
        info!("{}", case.name);
        ResultAsserter::new(&self.fixtures).assert(case, result);
    }

    /// Runs and asserts every case in order.
    pub async fn assert_all(&mut self, cases: &[TestCase]) {
        for case in cases {
            let result = self.run(case).await;
            self.assert(case, &result);
        }
    }
}
