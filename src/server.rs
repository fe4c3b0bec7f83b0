use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::gateway::{ChatOutcome, Gateway};
use crate::llm::LanguageModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub message: String,
}

pub fn router<M: LanguageModel + 'static>(gateway: Arc<Gateway<M>>) -> Router {
    Router::new()
        .route("/health", get(health::<M>))
        .route("/chat", post(chat::<M>))
        .with_state(gateway)
}

pub async fn serve<M: LanguageModel + 'static>(
    gateway: Arc<Gateway<M>>,
    addr: SocketAddr,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_with_listener(gateway, listener).await
}

pub async fn serve_with_listener<M: LanguageModel + 'static>(
    gateway: Arc<Gateway<M>>,
    listener: tokio::net::TcpListener,
) -> Result<()> {
    info!(
        addr = ?listener.local_addr().ok(),
        model = gateway.model_id(),
        "agent gateway listening"
    );
    axum::serve(listener, router(gateway))
        .await
        .map_err(|err| GatewayError::Protocol(format!("server error: {err}")))
}

async fn health<M: LanguageModel + 'static>(
    State(gateway): State<Arc<Gateway<M>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        model: gateway.model_id().to_string(),
    })
}

async fn chat<M: LanguageModel + 'static>(
    State(gateway): State<Arc<Gateway<M>>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat_request", %request_id);
    let result: Result<ChatOutcome> = gateway
        .chat(&req.conversation_id, &req.message)
        .instrument(span)
        .await;

    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => {
            let status = status_for(&err);
            error!(%request_id, status = status.as_u16(), error = %err, "chat turn failed");
            (status, Json(json!({"error": err.to_string()}))).into_response()
        }
    }
}

pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Protocol(_) | GatewayError::InvalidArguments { .. } => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::LanguageModel(_)
        | GatewayError::ModelStatus { .. }
        | GatewayError::MalformedResponse(_)
        | GatewayError::Timeout { .. }
        | GatewayError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
