//! HTTP surface of the broker.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, instrument, Span};

use vickrey_core::store::{run_blocking, DocumentStore};

use crate::broker::{Broker, BrokerError};
use crate::gate;
use crate::identity::IdentityProvider;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            broker: Arc::new(Broker::new(store.clone(), identity.clone())),
            store,
            identity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub store: String,
}

/// Build the broker router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            post(login).options(preflight).fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .route("/drafts/:draft_id/pages/:page_key", get(gate::page))
        .layer(middleware::map_response(allow_any_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /`
#[instrument(skip(state, body), fields(username = tracing::field::Empty))]
pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<Json<LoginResponse>, BrokerError> {
    let request: LoginRequest =
        serde_json::from_slice(&body).map_err(|_| BrokerError::InvalidPayload)?;
    Span::current().record("username", request.username.as_str());

    let token = state
        .broker
        .authenticate(&request.username, &request.password)
        .await?;
    Ok(Json(LoginResponse { token }))
}

/// `OPTIONS /`
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_METHODS, "POST"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (ACCESS_CONTROL_MAX_AGE, "3600"),
        ],
    )
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match run_blocking(&state.store, |store| store.latest_seq()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(Health {
                status: "ok".into(),
                store: "ok".into(),
            }),
        ),
        Err(e) => {
            error!("store health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Health {
                    status: "error".into(),
                    store: "error".into(),
                }),
            )
        }
    }
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}
