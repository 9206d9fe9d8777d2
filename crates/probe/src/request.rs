//! Synthetic requests and response recording.
//!
//! [`RequestBuilder`] turns a method and a set of [`Params`] into a
//! [`RequestContext`] plus a [`ResponseRecorder`]. It never calls a handler:
//! the caller does, which leaves room to attach collaborators (a fixed clock,
//! a stub repository) to the context first.
//!
//! # Example
//!
//! ```rust,ignore
//! let (mut ctx, recorder) = RequestBuilder::new(&fixtures)
//!     .build(Method::GET, &Params::new().path("id", "42").query("status", "open"));
//! ctx.extensions_mut().insert(FixedClock::at(noon));
//!
//! let outcome = handler.call(ctx).await;
//! let result = recorder.record(outcome).await;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Request, StatusCode, Uri};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::error::{HttpError, ProbeError, ProbeResult};
use crate::fixtures::{FixtureCategory, FixtureStore};

/// Path, query and body parameters of a synthetic request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// Named path parameters, in binding order.
    pub path: Vec<(String, String)>,
    /// Query parameters; a key may repeat and keeps its insertion order.
    pub query: Vec<(String, String)>,
    /// Name of a `requests/<name>.json` fixture used as body. Blank means no body.
    pub body: Option<String>,
}

impl Params {
    /// Creates empty parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a named path parameter.
    pub fn path(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path.push((name.into(), value.into()));
        self
    }

    /// Adds one value for a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds several values for the same query parameter.
    pub fn query_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        for value in values {
            self.query.push((name.clone(), value.into()));
        }
        self
    }

    /// Uses the named request fixture as body.
    pub fn body(mut self, fixture: impl Into<String>) -> Self {
        self.body = Some(fixture.into());
        self
    }

    /// Returns the body fixture name, if one is set and not blank.
    pub fn body_fixture(&self) -> Option<&str> {
        self.body
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Encodes the query parameters as a URL query string.
    pub fn query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.query {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }
}

/// A response captured from a handler.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    /// Status code written by the handler.
    pub status: StatusCode,
    /// Headers written by the handler.
    pub headers: HeaderMap,
    /// Body bytes written by the handler.
    pub body: Bytes,
}

impl Default for RecordedResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl RecordedResponse {
    /// Returns the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// The outcome of invoking a handler once.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The error the handler returned, if any.
    pub error: Option<HttpError>,
    /// What the handler wrote before returning.
    pub response: RecordedResponse,
}

/// Captures the status, headers and body a handler writes.
///
/// Clones share the same underlying response. Until something is written the
/// recorder holds status 200 with an empty body.
#[derive(Debug, Clone, Default)]
pub struct ResponseRecorder {
    inner: Arc<Mutex<RecordedResponse>>,
}

impl ResponseRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a response, replacing anything recorded before.
    pub async fn write(&self, response: impl IntoResponse) -> Result<(), HttpError> {
        let (parts, body) = response.into_response().into_parts();
        let body = to_bytes(body, usize::MAX)
            .await
            .map_err(|err| HttpError::internal(format!("could not read response body: {}", err)))?;

        let mut recorded = self.inner.lock();
        recorded.status = parts.status;
        recorded.headers = parts.headers;
        recorded.body = body;
        Ok(())
    }

    /// Returns a copy of what has been recorded so far.
    pub fn snapshot(&self) -> RecordedResponse {
        self.inner.lock().clone()
    }

    /// Records a handler outcome.
    ///
    /// A successful response is written to the recorder; an error is kept
    /// aside and the recorder is left as the handler left it.
    pub async fn record<R>(&self, outcome: Result<R, HttpError>) -> ExecutionResult
    where
        R: IntoResponse,
    {
        let error = match outcome {
            Ok(response) => self.write(response).await.err(),
            Err(err) => Some(err),
        };

        ExecutionResult {
            error,
            response: self.snapshot(),
        }
    }
}

/// The context a handler under test receives.
#[derive(Debug)]
pub struct RequestContext {
    parts: Parts,
    body: Bytes,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    recorder: ResponseRecorder,
}

impl RequestContext {
    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Returns the request URI, including the encoded query string.
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Returns mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// Returns the raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Returns a bound path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns all bound path parameters in binding order.
    pub fn params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Returns the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_values(name).into_iter().next()
    }

    /// Returns every value of a query parameter, in insertion order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Returns request extensions.
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    /// Returns mutable request extensions, for attaching collaborators before the call.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Runs an axum extractor against the request parts.
    ///
    /// Rejections are converted into an [`HttpError`] carrying the rejection's status.
    pub async fn extract<E>(&mut self) -> Result<E, HttpError>
    where
        E: FromRequestParts<()>,
    {
        match E::from_request_parts(&mut self.parts, &()).await {
            Ok(value) => Ok(value),
            Err(rejection) => {
                let response = rejection.into_response();
                let status = response.status();
                let body = to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap_or_default();
                Err(HttpError::new(status, String::from_utf8_lossy(&body)))
            }
        }
    }

    /// Writes a response into the recorder.
    ///
    /// A handler may write and still return an error afterwards.
    pub async fn respond(&self, response: impl IntoResponse) -> Result<(), HttpError> {
        self.recorder.write(response).await
    }

    /// Returns the recorder this context writes to.
    pub fn recorder(&self) -> &ResponseRecorder {
        &self.recorder
    }

    /// Converts the context into a plain axum request.
    pub fn into_request(self) -> Request<Body> {
        Request::from_parts(self.parts, Body::from(self.body))
    }
}

/// Something that can handle a [`RequestContext`].
///
/// Implemented for every `Fn(RequestContext) -> impl Future<Output = Result<impl IntoResponse, HttpError>>`.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    async fn call(&self, ctx: RequestContext) -> Result<Response, HttpError>;
}

#[async_trait]
impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HttpError>> + Send,
    R: IntoResponse + Send,
{
    async fn call(&self, ctx: RequestContext) -> Result<Response, HttpError> {
        (self)(ctx).await.map(IntoResponse::into_response)
    }
}

/// Builds synthetic requests whose bodies come from request fixtures.
#[derive(Debug, Clone)]
pub struct RequestBuilder<'a> {
    fixtures: &'a FixtureStore,
}

impl<'a> RequestBuilder<'a> {
    /// Creates a builder reading bodies from `fixtures`.
    pub fn new(fixtures: &'a FixtureStore) -> Self {
        Self { fixtures }
    }

    /// Builds a request context and its recorder.
    pub fn try_build(
        &self,
        method: Method,
        params: &Params,
    ) -> ProbeResult<(RequestContext, ResponseRecorder)> {
        let body = match params.body_fixture() {
            Some(name) => Bytes::from(self.fixtures.try_read(FixtureCategory::Requests, name)?),
            None => Bytes::new(),
        };

        let query = params.query_string();
        let uri = if query.is_empty() {
            "/".to_string()
        } else {
            format!("/?{}", query)
        };

        let (parts, ()) = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(())
            .map_err(|err| ProbeError::Request {
                message: err.to_string(),
            })?
            .into_parts();

        let recorder = ResponseRecorder::new();
        let ctx = RequestContext {
            parts,
            body,
            path_params: params.path.clone(),
            query: params.query.clone(),
            recorder: recorder.clone(),
        };

        Ok((ctx, recorder))
    }

    /// Builds a request context and its recorder, failing the test if the body fixture is missing.
    pub fn build(&self, method: Method, params: &Params) -> (RequestContext, ResponseRecorder) {
        self.try_build(method, params)
            .unwrap_or_else(|err| panic!("{}", err))
    }
}
