//! segck-server library interface
//!
//! HTTP gateway in front of the annotation store. Exposes the router and
//! application state for the binary and for integration tests.

pub mod api;
pub mod clip;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use clip::AudioClipper;
use segck_common::events::{EventBus, SegckEvent};
use segck_common::{SegmentStore, Stats};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Default clip context, used when a query does not carry its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipContext {
    pub left_ms: i64,
    pub right_ms: i64,
}

impl ClipContext {
    /// A non-negative per-query context applies to both sides
    pub fn for_query(&self, context: Option<i64>) -> (i64, i64) {
        match context {
            Some(ms) if ms >= 0 => (ms, ms),
            _ => (self.left_ms, self.right_ms),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SegmentStore>,
    /// Stats fan-out to connected sessions
    pub event_bus: EventBus,
    pub clipper: Arc<dyn AudioClipper>,
    pub clip_context: ClipContext,
    /// Browser client assets served at `/`
    pub static_dir: Option<PathBuf>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<SegmentStore>,
        event_bus: EventBus,
        clipper: Arc<dyn AudioClipper>,
        clip_context: ClipContext,
    ) -> Self {
        Self {
            store,
            event_bus,
            clipper,
            clip_context,
            static_dir: None,
            startup_time: Utc::now(),
        }
    }

    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Current counts. Reads annotation files, so runs on the blocking pool.
    pub async fn stats(&self) -> ApiResult<Stats> {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.stats()).await?)
    }

    /// Push current counts to every session. Never waits on subscribers.
    pub async fn broadcast_stats(&self) {
        if self.event_bus.subscriber_count() == 0 {
            return;
        }
        match self.stats().await {
            Ok(stats) => {
                debug!(sessions = self.event_bus.subscriber_count(), "Broadcasting stats");
                self.event_bus.emit_lossy(SegckEvent::stats(stats));
            }
            Err(e) => tracing::warn!("Failed to compute stats for broadcast: {}", e),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.static_dir.clone();

    let mut router = Router::new()
        .merge(api::health_routes())
        .merge(api::segment_routes())
        .route("/events", get(api::stats_event_stream));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
