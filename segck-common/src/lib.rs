//! # Segment Checker Common Library
//!
//! Shared code for the segment checker service including:
//! - Segment and annotation records, query and message types
//! - Configuration loading
//! - Event types for stats fan-out
//! - The annotation store: loading, locking, navigation and stats

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod protocol;
pub mod store;

pub use error::{Error, Result};
pub use model::{Annotation, Chunk, Query, RequestIndex, Segment, Status, StatusFilter};
pub use store::{LockManager, SegmentStore, Stats};
