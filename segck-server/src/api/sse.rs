//! Server-Sent Events for stats pushes
//!
//! A new session first receives the current counts, then one `stats` event
//! per mutation anywhere in the server.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use segck_common::events::SegckEvent;
use segck_common::protocol::{Message, MessageType};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Envelope for a bus event, as sent on the wire
fn to_sse_event(event: &SegckEvent) -> Option<Event> {
    let event_type = event.event_type();
    let message = match event {
        SegckEvent::StatsUpdated { stats, .. } => serde_json::to_value(stats)
            .map(|payload| Message::payload(MessageType::Stats, payload)),
    };

    match message.and_then(|m| serde_json::to_string(&m)) {
        Ok(data) => Some(Event::default().event(event_type).data(data)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// GET /events
pub async fn stats_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to stats events");

    // Subscribe before taking the snapshot so no push falls in between
    let mut rx = state.event_bus.subscribe();
    let initial = state.stats().await;

    let stream = async_stream::stream! {
        match initial {
            Ok(stats) => {
                if let Some(event) = to_sse_event(&SegckEvent::stats(stats)) {
                    yield Ok(event);
                }
            }
            Err(e) => warn!("SSE: Failed to compute initial stats: {}", e),
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(sse_event) = to_sse_event(&event) {
                        debug!("SSE: Sending {} event", event.event_type());
                        yield Ok(sse_event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: Client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("SSE: Stats event stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
