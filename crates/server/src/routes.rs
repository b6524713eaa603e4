//! Guest-facing HTTP API used by the showroom web frontend.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rise_agent::runtime::{AgentReply, AgentRuntime};
use rise_core::domain::contact::ContactRequest;
use rise_core::errors::{ApplicationError, InterfaceError};
use rise_db::repositories::ContactRepository;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const INTERNAL_ERROR_DETAIL: &str = "An internal error occurred while processing the request.";
pub const CONTACT_ACCEPTED: &str = "Thank you for contacting us! We will get back to you soon.";

#[derive(Clone)]
pub struct GuestState {
    pub agent: Arc<AgentRuntime>,
    pub contacts: Arc<dyn ContactRepository>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_thread_id")]
    pub thread_id: String,
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_thread_id() -> String {
    "1".to_string()
}

fn default_message() -> String {
    "Hello".to_string()
}

#[derive(Debug, Serialize)]
pub struct ContactAccepted {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn internal() -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, detail: INTERNAL_ERROR_DETAIL.to_string() }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, detail: detail.into() }
    }
}

/// Client mistakes keep their message. Everything else gets the generic detail.
impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        match error {
            InterfaceError::BadRequest { message, .. } => Self::bad_request(message),
            InterfaceError::ServiceUnavailable { .. } => Self::internal(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

pub fn router(state: GuestState) -> Router {
    Router::new()
        .route("/guest/", post(chat))
        .route("/guest", post(chat))
        .route("/guest/contact", post(contact))
        .with_state(state)
}

/// Empty or `*` allows any origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(event_name = "server.cors.invalid_origin", origin = %origin, "ignoring origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub async fn chat(
    State(state): State<GuestState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AgentReply>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "server.guest.chat_received",
        correlation_id = %correlation_id,
        thread_id = %request.thread_id,
        "guest chat message received"
    );

    match state.agent.handle_message(&request.thread_id, &request.message).await {
        Ok(reply) => Ok(Json(reply)),
        Err(failure) => {
            error!(
                event_name = "server.guest.chat_failed",
                correlation_id = %correlation_id,
                thread_id = %request.thread_id,
                error = %failure,
                "guest chat failed"
            );
            Err(ApiError::internal())
        }
    }
}

pub async fn contact(
    State(state): State<GuestState>,
    Json(request): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ContactAccepted>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let reject = |error: ApplicationError| {
        let error = error.into_interface(correlation_id.clone());
        warn!(
            event_name = "server.guest.contact_rejected",
            correlation_id = %error.correlation_id(),
            error = %error,
            "contact request not stored"
        );
        ApiError::from(error)
    };

    let request = request.normalized().map_err(|invalid| reject(invalid.into()))?;
    let record = state.contacts.save(request).await.map_err(|failure| reject(failure.into()))?;

    info!(
        event_name = "server.guest.contact_saved",
        correlation_id = %correlation_id,
        contact_id = record.id,
        topic = record.contact.topic.as_deref().unwrap_or("none"),
        "contact request stored"
    );
    Ok((StatusCode::CREATED, Json(ContactAccepted { message: CONTACT_ACCEPTED })))
}
