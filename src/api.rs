//! HTTP surface.
//!
//! `POST /v1/user/check_status` with a JSON body
//! `{"idfa": "<uuid>", "rooted_device": false}`. The client IP comes from the
//! configured forwarding headers or the peer address, the country from the
//! configured country header.

use crate::agent::IntegrityAgent;
use crate::config::Config;
use crate::context::{extract_client_ip, parse_rooted_device, RequestContext};
use crate::error::CheckStatusError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared handler state.
pub struct ApiState {
    pub agent: Arc<IntegrityAgent>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
struct CheckStatusRequest {
    #[serde(alias = "identifier")]
    idfa: Option<String>,
    #[serde(default)]
    rooted_device: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    errors: Vec<String>,
}

impl IntoResponse for CheckStatusError {
    fn into_response(self) -> Response {
        let status = match &self {
            CheckStatusError::MissingParameter(_) | CheckStatusError::InvalidRootedDevice => {
                StatusCode::BAD_REQUEST
            }
            CheckStatusError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CheckStatusError::Conflict(_) => StatusCode::CONFLICT,
            CheckStatusError::Internal(e) => {
                error!(error = %e, "Error in check_status");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorResponse { errors: self.messages() })).into_response()
    }
}

/// Build the router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/user/check_status", post(check_status))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: Arc<ApiState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(listen = %addr, "Device integrity API listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn check_status(
    State(state): State<Arc<ApiState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<CheckStatusRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    errors: vec![rejection.body_text()],
                }),
            )
                .into_response();
        }
    };

    let ctx = match build_context(&state.config, &headers, peer.map(|ConnectInfo(addr)| addr), &request) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    let Some(identifier) = request.idfa.as_deref().filter(|id| !id.trim().is_empty()) else {
        return CheckStatusError::MissingParameter("idfa").into_response();
    };

    match state.agent.check_status(identifier, &ctx).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

fn build_context(
    config: &Config,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    request: &CheckStatusRequest,
) -> Result<RequestContext, CheckStatusError> {
    let rooted_device = parse_rooted_device(request.rooted_device.as_ref())?;
    let headers = flatten_headers(headers);

    let ip = extract_client_ip(&headers, &config.ip_extraction).or(peer.map(|addr| addr.ip()));
    let country = headers
        .get(&config.country.header.to_lowercase())
        .filter(|value| !value.trim().is_empty())
        .cloned();

    Ok(RequestContext {
        ip: ip.map(|ip| ip.to_string()),
        country,
        rooted_device,
        ..RequestContext::default()
    })
}

/// Lowercased header name to first value; non-UTF-8 values are dropped.
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            flat.entry(name.as_str().to_lowercase())
                .or_insert_with(|| value.to_string());
        }
    }
    flat
}
