//! HTTP API
//!
//! Login, user info and a publish endpoint for browser front-ends that do not
//! keep a socket open for publishing. Every error leaves as
//! `{"code", "message"}` with the status matching the [`GatewayError`] kind.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::{Identity, strip_bearer};
use crate::gateway::{Gateway, Message};
use crate::utils::GatewayError;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Error body returned by every handler.
#[derive(Debug)]
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
}

impl From<Identity> for UserInfo {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.user_id,
            username: identity.username,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub content: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/login", post(login))
        .route("/api/user", get(user_info))
        .route("/api/topics/{topic}/messages", post(publish_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves, then finish in-flight requests.
pub async fn start_http_server<F>(addr: &str, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://{addr}");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Any non-empty username is accepted; the password is not checked.
async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    let req: LoginRequest = parse_body(&body)?;
    let username = req.username.trim();
    if username.is_empty() {
        return Err(GatewayError::BadRequest("username is required".to_string()).into());
    }

    let token = state.gateway.issue_token(username, username)?;
    info!(username, "User logged in");

    Ok(Json(LoginResponse {
        token: token.to_string(),
        user: UserInfo {
            id: username.to_string(),
            username: username.to_string(),
        },
    }))
}

async fn user_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, ApiError> {
    let identity = authenticate(&state.gateway, &headers)?;
    Ok(Json(identity.into()))
}

async fn publish_message(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Message>, ApiError> {
    // credentials are checked before the body is looked at
    let identity = authenticate(&state.gateway, &headers)?;
    let req: PublishRequest = parse_body(&body)?;
    let message = state
        .gateway
        .publish(Some(&identity), &topic, &req.content)?;
    Ok(Json(message))
}

fn authenticate(gateway: &Gateway, headers: &HeaderMap) -> Result<Identity, GatewayError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .filter(|t| !t.is_empty())
        .ok_or(GatewayError::Unauthenticated)?;
    gateway.validate_token(token)
}

/// Decode a JSON body regardless of `Content-Type`; failures are `BadRequest`.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {e}")))
}
