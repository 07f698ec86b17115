//! HTTP API handlers for segck-server

pub mod handlers;
pub mod health;
pub mod sse;

pub use handlers::segment_routes;
pub use health::health_routes;
pub use sse::stats_event_stream;
