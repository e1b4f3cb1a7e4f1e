//! HTTP control surface for the turn engine.
//!
//! CORS-permissive so a browser-hosted presentation layer can call it
//! from another localhost port.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use wren_core::types::{EngineStatus, TranscriptTurn};

use crate::engine::TurnEngine;

/// Build the axum router with a shared [`TurnEngine`].
pub fn router(engine: TurnEngine) -> Router {
    Router::new()
        .route("/enable", post(enable))
        .route("/disable", post(disable))
        .route("/status", get(status))
        .route("/transcript", get(transcript))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

#[derive(serde::Serialize)]
struct OkResponse {
    ok: bool,
}

async fn enable(State(engine): State<TurnEngine>) -> Json<OkResponse> {
    engine.enable();
    Json(OkResponse { ok: true })
}

async fn disable(State(engine): State<TurnEngine>) -> Json<OkResponse> {
    engine.disable();
    Json(OkResponse { ok: true })
}

async fn status(State(engine): State<TurnEngine>) -> Json<EngineStatus> {
    Json(engine.status())
}

async fn transcript(State(engine): State<TurnEngine>) -> Json<Vec<TranscriptTurn>> {
    Json(engine.transcript().await)
}
