//! HTTP surface: ETL trigger endpoints, query endpoints, chat fallback.
//!
//! Triggers are invoked by an external scheduler (cron hitting the
//! endpoint with the shared-secret header); each runs one sequential
//! batch pass and reports its counters and resolved window. Query
//! endpoints go through the facade only.

mod auth;

pub use auth::{SharedSecretAuth, TriggerAuth, SECRET_HEADER};

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat;
use crate::config::Config;
use crate::connectors::{AdSpendSource, MetaConnector, StripeConnector, WooConnector};
use crate::error::Error;
use crate::facade::{QueryFacade, DEFAULT_LIMIT, DEFAULT_SINCE_DAYS};
use crate::reconcile;
use crate::store::Store;
use crate::sync_window::{self, WindowRequest};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub auth: Arc<dyn TriggerAuth>,
    pub facade: QueryFacade,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let auth = Arc::new(SharedSecretAuth::new(config.cron_secret.clone()));
        Self {
            facade: QueryFacade::new(store.clone()),
            store,
            config: Arc::new(config),
            auth,
            http: reqwest::Client::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/etl/woo", post(etl_woo))
        .route("/etl/stripe", post(etl_stripe))
        .route("/etl/meta", post(etl_meta))
        .route("/api/kpis", get(kpis))
        .route("/api/customers/top", get(top_customers))
        .route("/api/chat", post(chat_fallback))
        .with_state(state)
}

/// Query parameters accepted by the trigger endpoints.
#[derive(Debug, Default, Deserialize)]
struct EtlParams {
    after: Option<String>,
    until: Option<String>,
    full: Option<bool>,
}

impl EtlParams {
    /// Parse into a window request; `until` is only honored where the
    /// upstream supports a closed range (orders and ads).
    fn window_request(&self, honor_until: bool) -> Result<WindowRequest, Response> {
        let after = self.after.as_deref().map(parse_instant).transpose()?;
        let until = if honor_until {
            self.until.as_deref().map(parse_instant).transpose()?
        } else {
            None
        };
        Ok(WindowRequest {
            after,
            until,
            full: self.full.unwrap_or(false),
        })
    }
}

/// Accept either a bare ISO date (midnight UTC) or a full RFC 3339
/// timestamp.
fn parse_instant(raw: &str) -> Result<DateTime<Utc>, Response> {
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Ok(at.with_timezone(&Utc)),
        Err(_) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": format!("unparseable timestamp: {raw:?}") })),
        )
            .into_response()),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "ok": false, "error": self.to_string() }),
            ),
            Error::MissingConfig(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "ok": false, "error": self.to_string() }),
            ),
            Error::UpstreamFetch { status, body } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "ok": false,
                    "error": "upstream fetch failed",
                    "status": status,
                    "body": body,
                }),
            ),
            Error::Transport(_) | Error::MalformedRecord(_) => (
                StatusCode::BAD_GATEWAY,
                json!({ "ok": false, "error": self.to_string() }),
            ),
            Error::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "ok": false, "error": self.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Success payload: the report's fields flattened next to `ok`/`source`.
fn ok_response(source: &'static str, report: impl Serialize) -> Response {
    match serde_json::to_value(&report) {
        Ok(mut value) => {
            if let Some(obj) = value.as_object_mut() {
                obj.insert("ok".to_string(), json!(true));
                obj.insert("source".to_string(), json!(source));
            }
            Json(value).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn etl_woo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EtlParams>,
) -> Response {
    if let Err(e) = state.auth.authorize(&headers) {
        return e.into_response();
    }
    let request = match params.window_request(true) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let connector = match WooConnector::from_config(&state.config, state.http.clone()) {
        Ok(connector) => connector,
        Err(e) => return e.into_response(),
    };
    let hwm = match state.store.latest_order_created_at() {
        Ok(hwm) => hwm,
        Err(e) => return e.into_response(),
    };
    let window = sync_window::resolve(&request, hwm, Utc::now());

    match reconcile::sync_orders(
        state.store.as_ref(),
        &connector,
        window,
        state.config.max_pages,
    )
    .await
    {
        Ok(report) => ok_response("woo", report),
        Err(e) => e.into_response(),
    }
}

async fn etl_stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EtlParams>,
) -> Response {
    if let Err(e) = state.auth.authorize(&headers) {
        return e.into_response();
    }
    let request = match params.window_request(false) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let connector = match StripeConnector::from_config(&state.config, state.http.clone()) {
        Ok(connector) => connector,
        Err(e) => return e.into_response(),
    };
    // Charges annotate existing orders, so the orders high-water-mark is
    // the right resume point.
    let hwm = match state.store.latest_order_created_at() {
        Ok(hwm) => hwm,
        Err(e) => return e.into_response(),
    };
    let window = sync_window::resolve(&request, hwm, Utc::now());

    match reconcile::sync_payments(
        state.store.as_ref(),
        &connector,
        window,
        state.config.max_pages,
    )
    .await
    {
        Ok(report) => ok_response("stripe", report),
        Err(e) => e.into_response(),
    }
}

async fn etl_meta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<EtlParams>,
) -> Response {
    if let Err(e) = state.auth.authorize(&headers) {
        return e.into_response();
    }
    let request = match params.window_request(true) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let connector = match MetaConnector::from_config(&state.config, state.http.clone()) {
        Ok(connector) => connector,
        Err(e) => return e.into_response(),
    };
    let hwm = match state.store.latest_ad_spend_date(connector.platform()) {
        Ok(date) => date.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc()),
        Err(e) => return e.into_response(),
    };
    let window = sync_window::resolve(&request, hwm, Utc::now());

    match reconcile::sync_ad_spend(
        state.store.as_ref(),
        &connector,
        window,
        state.config.max_pages,
    )
    .await
    {
        Ok(report) => ok_response("meta", report),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct KpiParams {
    since_days: Option<u32>,
}

async fn kpis(State(state): State<AppState>, Query(params): Query<KpiParams>) -> Response {
    match state
        .facade
        .kpi_summary(params.since_days.unwrap_or(DEFAULT_SINCE_DAYS))
    {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct TopParams {
    limit: Option<usize>,
}

async fn top_customers(State(state): State<AppState>, Query(params): Query<TopParams>) -> Response {
    match state
        .facade
        .top_customers(params.limit.unwrap_or(DEFAULT_LIMIT))
    {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn chat_fallback(State(state): State<AppState>) -> Response {
    match chat::fallback_summary(&state.facade) {
        Ok(content) => Json(json!({ "role": "assistant", "content": content })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_instant_accepts_bare_date() {
        let at = parse_instant("2025-06-14").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 6, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_instant_accepts_rfc3339() {
        let at = parse_instant("2025-06-14T09:30:11Z").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 6, 14, 9, 30, 11).unwrap());
    }

    #[test]
    fn test_parse_instant_rejects_garbage() {
        assert!(parse_instant("June 14th").is_err());
    }

    #[test]
    fn test_until_ignored_where_unsupported() {
        let params = EtlParams {
            after: Some("2025-06-01".to_string()),
            until: Some("2025-06-14".to_string()),
            full: None,
        };
        let honored = params.window_request(true).unwrap();
        assert!(honored.until.is_some());
        let ignored = params.window_request(false).unwrap();
        assert!(ignored.until.is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            Error::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::MissingConfig("STRIPE_SECRET_KEY").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::upstream(503, "busy").into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
