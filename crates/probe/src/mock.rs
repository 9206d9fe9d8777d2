//! Outbound HTTP mocks.
//!
//! A [`MockRegistrar`] stands in for one upstream service. It runs a local
//! wiremock server and hands out reqwest clients whose DNS for the upstream
//! host points at that server, so the code under test keeps using the real
//! base URL. Nothing is patched process-wide: only clients built through
//! [`MockRegistrar::intercept`] or [`MockRegistrar::client`] are redirected.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut mocks = MockRegistrar::start("http://weather.test", fixtures).await?;
//! mocks.register(&MockDeclaration::get("/v1/forecast").with_response("weather-ok")).await?;
//!
//! let client = mocks.client()?;
//! let reply = client.get("http://weather.test/v1/forecast").send().await?;
//! ```

use std::fmt;

use http::Method;
use tracing::debug;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::error::{ProbeError, ProbeResult};
use crate::fixtures::{FixtureCategory, FixtureStore};

/// An expected outbound call and the reply it gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDeclaration {
    /// HTTP method name. Anything other than GET, POST, PUT, PATCH or DELETE is served as GET.
    pub method: String,
    /// Path relative to the registrar's base URL.
    pub url_path: String,
    /// Reply status. `None` means 200.
    pub status: Option<u16>,
    /// Name of a `mocks/<name>.json` fixture used as reply body. Blank means no body.
    pub response: String,
}

impl MockDeclaration {
    /// Declares a call with the given method and path.
    pub fn new(method: impl Into<String>, url_path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url_path: url_path.into(),
            status: None,
            response: String::new(),
        }
    }

    /// Declares a GET call.
    pub fn get(url_path: impl Into<String>) -> Self {
        Self::new("GET", url_path)
    }

    /// Declares a POST call.
    pub fn post(url_path: impl Into<String>) -> Self {
        Self::new("POST", url_path)
    }

    /// Sets the reply status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the reply body fixture.
    pub fn with_response(mut self, fixture: impl Into<String>) -> Self {
        self.response = fixture.into();
        self
    }

    /// Returns the method the mock actually matches.
    pub fn effective_method(&self) -> Method {
        match self.method.trim().to_ascii_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "PATCH" => Method::PATCH,
            "DELETE" => Method::DELETE,
            _ => Method::GET,
        }
    }

    /// Returns the status the mock replies with.
    pub fn effective_status(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Returns the reply fixture name, if one is set and not blank.
    pub fn response_fixture(&self) -> Option<&str> {
        let name = self.response.trim();
        (!name.is_empty()).then_some(name)
    }
}

impl fmt::Display for MockDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.effective_method(),
            self.url_path,
            self.effective_status()
        )
    }
}

/// Registers outbound call expectations for one upstream base URL.
pub struct MockRegistrar {
    server: MockServer,
    host: String,
    base_path: String,
    fixtures: FixtureStore,
    declarations: Vec<MockDeclaration>,
}

impl fmt::Debug for MockRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRegistrar")
            .field("address", self.server.address())
            .field("host", &self.host)
            .field("base_path", &self.base_path)
            .field("declarations", &self.declarations.len())
            .finish()
    }
}

impl MockRegistrar {
    /// Starts a mock server standing in for `base_url`.
    ///
    /// The base URL must name a host and carry no explicit port; its path, if
    /// any, prefixes every declared path.
    pub async fn start(base_url: &str, fixtures: FixtureStore) -> ProbeResult<Self> {
        let url = Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::Mock {
                message: format!("base URL '{}' has no host", base_url),
            })?
            .to_string();
        if url.port().is_some() {
            return Err(ProbeError::Mock {
                message: format!(
                    "base URL '{}' must not carry an explicit port; requests are redirected by host name",
                    base_url
                ),
            });
        }
        let base_path = url.path().trim_end_matches('/').to_string();

        let server = MockServer::start().await;
        debug!(base_url, address = %server.address(), "Started mock server");

        Ok(Self {
            server,
            host,
            base_path,
            fixtures,
            declarations: Vec::new(),
        })
    }

    /// Returns the full mock path for a declared path.
    pub fn full_path(&self, url_path: &str) -> String {
        format!("{}/{}", self.base_path, url_path.trim_start_matches('/'))
    }

    /// Mounts a mock for `declaration`.
    ///
    /// Each declaration answers exactly one request. Declarations sharing a
    /// method and path are served in registration order. A missing reply
    /// fixture is an error.
    pub async fn register(&mut self, declaration: &MockDeclaration) -> ProbeResult<()> {
        let mut reply = ResponseTemplate::new(declaration.effective_status());
        if let Some(name) = declaration.response_fixture() {
            let body = self.fixtures.try_read(FixtureCategory::Mocks, name)?;
            reply = reply.set_body_raw(body, mime::APPLICATION_JSON.as_ref());
        }

        let full_path = self.full_path(&declaration.url_path);
        Mock::given(method(declaration.effective_method().as_str()))
            .and(path(full_path.as_str()))
            .respond_with(reply)
            .up_to_n_times(1)
            .named(declaration.to_string())
            .mount(&self.server)
            .await;

        debug!(mock = %declaration, path = %full_path, "Registered mock");
        self.declarations.push(declaration.clone());
        Ok(())
    }

    /// Redirects `builder`'s DNS for the upstream host to the mock server.
    ///
    /// Use this to bind a client the service under test constructs itself.
    pub fn intercept(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        builder
            .resolve(&self.host, *self.server.address())
            .no_proxy()
    }

    /// Builds a default client bound to the mock server.
    pub fn client(&self) -> ProbeResult<reqwest::Client> {
        self.intercept(reqwest::Client::builder())
            .build()
            .map_err(|err| ProbeError::Mock {
                message: format!("could not build intercepted client: {}", err),
            })
    }

    /// Returns the mock server URL including the base path.
    pub fn mock_base_url(&self) -> String {
        format!("{}{}", self.server.uri(), self.base_path)
    }

    /// Returns the declarations registered so far.
    pub fn declarations(&self) -> &[MockDeclaration] {
        &self.declarations
    }

    /// Returns the declarations no received request has consumed yet.
    ///
    /// Each received request consumes the earliest unconsumed declaration it
    /// matches, mirroring how the mock server serves them.
    pub async fn pending(&self) -> Vec<MockDeclaration> {
        let received = self.server.received_requests().await.unwrap_or_default();
        let mut consumed = vec![false; self.declarations.len()];

        for request in &received {
            let hit = self.declarations.iter().enumerate().find(|(index, declaration)| {
                !consumed[*index]
                    && request.method.as_str() == declaration.effective_method().as_str()
                    && request.url.path() == self.full_path(&declaration.url_path)
            });
            if let Some((index, _)) = hit {
                consumed[index] = true;
            }
        }

        self.declarations
            .iter()
            .zip(consumed)
            .filter(|(_, consumed)| !consumed)
            .map(|(declaration, _)| declaration.clone())
            .collect()
    }

    /// Prints received requests and unmatched declarations to stdout.
    ///
    /// Never fails; pending mocks are informational only.
    pub async fn debug(&self) {
        let received = self.server.received_requests().await.unwrap_or_default();
        println!("Received requests ({}):", received.len());
        for request in &received {
            println!("  {} {}", request.method, request.url);
        }

        let pending = self.pending().await;
        if !pending.is_empty() {
            println!("Pending mocks:");
            for declaration in &pending {
                println!("  {}", declaration);
            }
        }
    }

    /// Clears every mounted mock and recorded request.
    pub async fn reset(&mut self) {
        self.server.reset().await;
        self.declarations.clear();
    }

    /// Clears all interception rules. Called by the harness at teardown.
    pub async fn teardown(mut self) {
        self.reset().await;
        debug!(host = %self.host, "Mock server torn down");
    }
}
