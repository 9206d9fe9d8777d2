//! Outbound HTTP mock tests using the forecast handler.

mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use helios_probe::{HarnessConfig, HarnessSession, MockDeclaration, Params, TestCase, fixture_dir};

use common::handlers::{WeatherApi, forecast};

const WEATHER: &str = "http://weather.test";

fn forecast_case(name: &str) -> TestCase {
    TestCase::new(name, Method::GET, forecast).with_params(Params::new().query("city", "Lisbon"))
}

async fn session_with_mocks() -> HarnessSession {
    HarnessSession::start(HarnessConfig::new(fixture_dir!()).with_mocks(WEATHER)).await
}

#[tokio::test]
async fn test_mocked_dependency_returns_fixture() {
    let mut session = session_with_mocks().await;
    let api = WeatherApi::new(session.mock().unwrap().client().unwrap(), WEATHER);

    let case = forecast_case("forecast ok")
        .with_mock(MockDeclaration::get("/v1/forecast").with_response("weather-ok"))
        .expect_code(StatusCode::OK)
        .expect_response("weather-ok");

    let result = session
        .run_with(&case, move |ctx| {
            ctx.extensions_mut().insert(api);
        })
        .await;
    session.assert(&case, &result);
    assert!(session.mock().unwrap().pending().await.is_empty());

    session.teardown().await;
}

#[tokio::test]
async fn test_unmocked_dependency_is_unavailable() {
    let mut session = HarnessSession::start(HarnessConfig::new(fixture_dir!())).await;
    let api = WeatherApi::unbound("http://weather.invalid");

    let case = forecast_case("forecast unavailable")
        .expect_error()
        .expect_code(StatusCode::SERVICE_UNAVAILABLE);

    let result = session
        .run_with(&case, move |ctx| {
            ctx.extensions_mut().insert(api);
        })
        .await;
    session.assert(&case, &result);

    session.teardown().await;
}

#[tokio::test]
async fn test_upstream_error_status_is_surfaced() {
    let mut session = session_with_mocks().await;
    let api = WeatherApi::new(session.mock().unwrap().client().unwrap(), WEATHER);

    let case = forecast_case("forecast upstream down")
        .with_mock(MockDeclaration::get("/v1/forecast").with_status(500))
        .expect_error()
        .expect_code(StatusCode::SERVICE_UNAVAILABLE);

    let result = session
        .run_with(&case, move |ctx| {
            ctx.extensions_mut().insert(api);
        })
        .await;
    session.assert(&case, &result);

    session.teardown().await;
}

#[tokio::test]
async fn test_cases_sharing_a_path_get_their_own_replies() {
    let mut session = session_with_mocks().await;
    let client = session.mock().unwrap().client().unwrap();

    let ok = forecast_case("forecast ok")
        .with_mock(MockDeclaration::get("/v1/forecast").with_response("weather-ok"))
        .expect_code(StatusCode::OK)
        .expect_response("weather-ok");
    let down = forecast_case("forecast upstream down")
        .with_mock(MockDeclaration::get("/v1/forecast").with_status(500))
        .expect_error()
        .expect_code(StatusCode::SERVICE_UNAVAILABLE);

    for case in [&ok, &down] {
        let api = WeatherApi::new(client.clone(), WEATHER);
        let result = session
            .run_with(case, move |ctx| {
                ctx.extensions_mut().insert(api);
            })
            .await;
        session.assert(case, &result);
    }
    assert!(session.mock().unwrap().pending().await.is_empty());

    session.teardown().await;
}

#[tokio::test]
async fn test_caller_constructed_client_is_intercepted() {
    let mut session = session_with_mocks().await;
    let mocks = session.mock_mut().unwrap();
    mocks
        .register(&MockDeclaration::get("/v1/forecast").with_response("weather-ok"))
        .await
        .unwrap();

    let builder = reqwest::Client::builder().timeout(Duration::from_secs(5));
    let client = mocks.intercept(builder).build().unwrap();
    let body: serde_json::Value = client
        .get(format!("{}/v1/forecast", WEATHER))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["city"], "Lisbon");

    session.teardown().await;
}

#[tokio::test]
async fn test_mock_base_url_reaches_the_mock_server() {
    let mut session = session_with_mocks().await;
    let mocks = session.mock_mut().unwrap();
    mocks
        .register(&MockDeclaration::new("PURGE", "/v1/forecast").with_status(204))
        .await
        .unwrap();

    // An unrecognised method is served as GET.
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let reply = client
        .get(format!("{}/v1/forecast", mocks.mock_base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), reqwest::StatusCode::NO_CONTENT);

    session.teardown().await;
}

#[tokio::test]
async fn test_pending_mocks_are_reported_not_enforced() {
    let mut session = session_with_mocks().await;
    let case = forecast_case("unused mocks")
        .with_mock(MockDeclaration::get("/v1/alerts"))
        .with_mock(MockDeclaration::post("/v1/subscriptions").with_status(201));
    session.load_mocks(&case).await;

    let mocks = session.mock().unwrap();
    assert_eq!(mocks.pending().await.len(), 2);
    mocks.debug().await;

    session.teardown().await;
}

#[tokio::test]
async fn test_reset_clears_registered_mocks() {
    let mut session = session_with_mocks().await;
    let mocks = session.mock_mut().unwrap();
    mocks
        .register(&MockDeclaration::get("/v1/forecast").with_response("weather-ok"))
        .await
        .unwrap();
    mocks.reset().await;

    let reply = mocks
        .client()
        .unwrap()
        .get(format!("{}/v1/forecast", WEATHER))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), reqwest::StatusCode::NOT_FOUND);

    session.teardown().await;
}
