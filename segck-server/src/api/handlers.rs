//! Session gateway endpoints
//!
//! Each handler maps one client request onto the store and answers with the
//! common message envelope. Store calls that read or write annotation files
//! run on the blocking pool. Every mutation is followed by a stats push.

use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use segck_common::protocol::{AudioChunkPayload, Message, MessageType};
use segck_common::{Annotation, Error, Query};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Info text when a walk runs out of segments
pub const NO_MATCHING_SEGMENT: &str = "no matching segment";

fn to_payload<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::from(Error::from(e)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::from(Error::InvalidInput(e.body_text())))
}

/// POST /next/
///
/// Selects a segment for the query, locks it for `user_name` and returns it
/// with its clipped audio.
pub async fn next_segment(
    State(state): State<AppState>,
    payload: Result<Json<Query>, JsonRejection>,
) -> ApiResult<Json<Message>> {
    let query = body(payload)?;

    let store = Arc::clone(&state.store);
    let lookup = query.clone();
    let selected = tokio::task::spawn_blocking(move || store.next_segment(&lookup, true)).await??;

    let Some(annotation) = selected else {
        return Ok(Json(Message::info(NO_MATCHING_SEGMENT)));
    };
    state.broadcast_stats().await;

    let (left_ms, right_ms) = state.clip_context.for_query(query.context);
    let clipper = Arc::clone(&state.clipper);
    let segment = annotation.segment.clone();
    let clipped = tokio::task::spawn_blocking(move || {
        clipper.clip(&segment.url, segment.chunk, left_ms, right_ms)
    })
    .await?;

    let clipped = match clipped {
        Ok(clipped) => clipped,
        Err(e) => {
            // Nobody will review a segment whose audio cannot be played
            if let Err(unlock_err) = state.store.unlock(annotation.id(), &query.user_name) {
                warn!("Failed to release {} after clip failure: {}", annotation.id(), unlock_err);
            }
            state.broadcast_stats().await;
            return Err(e.into());
        }
    };

    info!(
        segment_id = %annotation.id(),
        user = %query.user_name,
        clipper = state.clipper.name(),
        bytes = clipped.bytes.len(),
        "Serving segment"
    );

    let payload = AudioChunkPayload {
        audio: BASE64.encode(&clipped.bytes),
        file_type: clipped.file_type,
        offset: clipped.offset,
        relative_chunk: clipped.relative_chunk,
        annotation,
    };
    Ok(Json(Message::payload(
        MessageType::AudioChunk,
        to_payload(&payload)?,
    )))
}

/// POST /save/
///
/// Stores the annotation, then releases the saving user's lock on it.
pub async fn save_annotation(
    State(state): State<AppState>,
    payload: Result<Json<Annotation>, JsonRejection>,
) -> ApiResult<Json<Message>> {
    let annotation: Annotation = body(payload)?;
    let user = annotation.current_status.source.clone();

    let store = Arc::clone(&state.store);
    let saved = tokio::task::spawn_blocking(move || store.save(annotation)).await??;

    if !user.is_empty() {
        if let Err(e) = state.store.unlock(saved.id(), &user) {
            warn!(segment_id = %saved.id(), user = %user, "Saved without releasing lock: {}", e);
        }
    }
    state.broadcast_stats().await;

    Ok(Json(Message::info(format!("saved {}", saved.id()))))
}

/// GET /release/:id/:user
pub async fn release(
    State(state): State<AppState>,
    Path((id, user)): Path<(String, String)>,
) -> ApiResult<Json<Message>> {
    state.store.unlock(&id, &user)?;
    state.broadcast_stats().await;
    Ok(Json(Message::info(format!("released {}", id))))
}

/// GET /releaseall/:user
pub async fn release_all(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<Message>> {
    let released = state.store.unlock_all(&user);
    state.broadcast_stats().await;
    Ok(Json(Message::info(format!("released {} segment(s)", released))))
}

/// GET /stats/
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Message>> {
    let stats = state.stats().await?;
    Ok(Json(Message::payload(MessageType::Stats, to_payload(&stats)?)))
}

/// Build segment routes
pub fn segment_routes() -> Router<AppState> {
    Router::new()
        .route("/next/", post(next_segment))
        .route("/save/", post(save_annotation))
        .route("/release/:id/:user", get(release))
        .route("/releaseall/:user", get(release_all))
        .route("/stats/", get(stats))
}
