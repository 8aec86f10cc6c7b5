//! HTTP route handlers for the conversation API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::conversation::core::params::{AddMessageParams, StartParams};
use crate::conversation::core::types::{Conversation, ListResponse, Message};

use super::error::ApiError;
use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route("/conversations/{id}", get(get_conversation))
        .route(
            "/conversations/{id}/messages",
            get(list_messages).post(add_message),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "conversation-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListResponse<Conversation>>, ApiError> {
    let conversations = state.conversations.list().await?;
    Ok(Json(conversations.into()))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.conversations.get(&id).await?))
}

async fn start_conversation(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartParams>, JsonRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let Json(params) = body?;
    Ok(Json(state.conversations.start(params).await?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ListResponse<Message>>, ApiError> {
    let messages = state.conversations.list_messages(&id).await?;
    Ok(Json(messages.into()))
}

async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<AddMessageParams>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(params) = body?;
    Ok(Json(state.conversations.add_message(&id, params).await?))
}
