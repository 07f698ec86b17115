//! Segment selection
//!
//! Resolves a [`Query`] to a position in the fixed traversal order. Two modes:
//!
//! - **Absolute jump** (`request_index` set): `first`, `last` or a 0-based
//!   position. Status filter and locks are not consulted.
//! - **Anchored walk**: starting next to `curr_id`, walk forward for
//!   `step_size >= 0` or backward otherwise, counting segments that pass the
//!   status filter and are not locked. The `|step_size|`-th such segment is
//!   the result. With no anchor the walk starts before position 0 and the
//!   first match wins. A backward walk from there has nothing to visit, so
//!   an empty anchor with a negative step always comes back empty rather
//!   than yielding the first segment.
//!
//! Running off the end of the list is a normal outcome (`Ok(None)`).

use crate::model::{Annotation, Query, Segment, Status, StatusFilter};
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Read-only view over the loaded data
pub struct Navigator<'a> {
    segments: &'a [Segment],
    positions: &'a HashMap<String, usize>,
    annotations: &'a HashMap<String, Annotation>,
}

impl<'a> Navigator<'a> {
    pub fn new(
        segments: &'a [Segment],
        positions: &'a HashMap<String, usize>,
        annotations: &'a HashMap<String, Annotation>,
    ) -> Self {
        Self {
            segments,
            positions,
            annotations,
        }
    }

    /// 0-based position of the segment `query` selects, or `None` when the
    /// walk runs out of segments
    pub fn find<F>(&self, query: &Query, is_locked: F) -> Result<Option<usize>>
    where
        F: Fn(&str) -> bool,
    {
        if let Some(request_index) = query.request_index()? {
            let position = request_index.resolve(self.segments.len())?;
            debug!(%request_index, position, "Absolute jump");
            return Ok(Some(position));
        }

        let filter = query.status_filter()?;
        let anchored = !query.curr_id.is_empty();
        if anchored && query.step_size == 0 {
            return Err(Error::InvalidInput(
                "step size 0 needs a request index".to_string(),
            ));
        }

        let wanted = if anchored {
            query.step_size.unsigned_abs()
        } else {
            1
        };
        let forward = query.step_size >= 0;

        let mut matched = 0u64;
        for position in self.walk(&query.curr_id, forward) {
            let segment = &self.segments[position];
            if is_locked(&segment.id) {
                debug!(segment_id = %segment.id, position, "Skipping locked segment");
                continue;
            }
            if !self.matches(&filter, segment) {
                continue;
            }
            matched += 1;
            if matched == wanted {
                debug!(segment_id = %segment.id, position, "Selected segment");
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Positions visited by a walk, in order, excluding the anchor itself.
    /// An unknown anchor counts as position 0.
    fn walk(&self, curr_id: &str, forward: bool) -> Box<dyn Iterator<Item = usize>> {
        let len = self.segments.len();
        if curr_id.is_empty() {
            return if forward {
                Box::new(0..len)
            } else {
                Box::new(std::iter::empty())
            };
        }

        let anchor = match self.positions.get(curr_id) {
            Some(&position) => position,
            None => {
                debug!(curr_id, "Anchor not found, walking from position 0");
                0
            }
        };
        if forward {
            Box::new(anchor + 1..len)
        } else {
            Box::new((0..anchor).rev())
        }
    }

    fn matches(&self, filter: &StatusFilter, segment: &Segment) -> bool {
        match self.annotations.get(&segment.id) {
            Some(annotation) => filter.matches(annotation),
            None => filter.matches_status(&Status::unchecked(), &[]),
        }
    }
}
