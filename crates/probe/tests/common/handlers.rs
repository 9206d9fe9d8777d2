//! Handlers under test.
//!
//! Each handler reads its collaborators from request extensions, which is
//! how the tests swap in a fixed clock or an intercepted HTTP client.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use helios_probe::{HttpError, RequestContext};

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// 2024-05-01T12:00:00Z
    pub fn noon() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }
}

/// Outbound weather API the forecast handler calls.
#[derive(Debug, Clone)]
pub struct WeatherApi {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl WeatherApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// A plain client with a short timeout and no interception.
    pub fn unbound(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .unwrap();
        Self::new(client, base_url)
    }
}

/// Readiness probe: 200 with no body.
pub async fn ready(_ctx: RequestContext) -> Result<StatusCode, HttpError> {
    Ok(StatusCode::OK)
}

/// Liveness probe reporting when it was checked.
pub async fn live(ctx: RequestContext) -> Result<Json<Value>, HttpError> {
    let now = ctx
        .extensions()
        .get::<FixedClock>()
        .map(|clock| clock.0)
        .unwrap_or_else(Utc::now);

    Ok(Json(json!({
        "status": "healthy",
        "checked_at": now.to_rfc3339(),
    })))
}

#[derive(Debug, Deserialize)]
struct NewOrder {
    customer: String,
    items: Vec<Value>,
}

/// Creates an order, echoing the path id and every `status` query value.
pub async fn create_order(ctx: RequestContext) -> Result<impl IntoResponse, HttpError> {
    let id = ctx
        .param("id")
        .ok_or_else(|| HttpError::bad_request("id is required"))?
        .to_string();
    let order: NewOrder = ctx.json()?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "status": ctx.query_values("status"),
            "customer": order.customer,
            "item_count": order.items.len(),
        })),
    ))
}

/// Looks up an order. Writes a provisional 200 before deciding the order is missing.
pub async fn get_order(ctx: RequestContext) -> Result<Json<Value>, HttpError> {
    let id = ctx.param("id").unwrap_or_default().to_string();
    ctx.respond(Json(json!({ "id": id, "state": "loading" })))
        .await?;

    if id == "42" {
        Ok(Json(json!({ "id": id, "state": "open" })))
    } else {
        Err(HttpError::not_found(format!("order {} does not exist", id)))
    }
}

/// Fails unconditionally after writing a 200.
pub async fn broken(ctx: RequestContext) -> Result<StatusCode, HttpError> {
    ctx.respond(StatusCode::OK).await?;
    Err(HttpError::internal("storage offline"))
}

/// Fetches a forecast from the weather API and returns it unchanged.
pub async fn forecast(ctx: RequestContext) -> Result<Json<Value>, HttpError> {
    let api = ctx
        .extensions()
        .get::<WeatherApi>()
        .cloned()
        .ok_or_else(|| HttpError::internal("weather api not configured"))?;
    let city = ctx
        .query_param("city")
        .ok_or_else(|| HttpError::bad_request("city is required"))?
        .to_string();

    let reply = api
        .client
        .get(format!("{}/v1/forecast", api.base_url))
        .query(&[("city", city.as_str())])
        .send()
        .await
        .map_err(|err| HttpError::service_unavailable(format!("weather api: {}", err)))?;

    if !reply.status().is_success() {
        return Err(HttpError::service_unavailable(format!(
            "weather api replied {}",
            reply.status()
        )));
    }

    let body: Value = reply
        .json()
        .await
        .map_err(|err| HttpError::internal(format!("weather api: {}", err)))?;
    Ok(Json(body))
}
