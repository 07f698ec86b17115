//! Summary counts over all segments
//!
//! Always computed from scratch. Keys:
//! - `total`, `checked`, `unchecked`, `checkable`, `locked`, `comment`
//! - `status:<name>`, `checked by:<source>`, `label:<label>`, `locked by:<user>`

use crate::model::{Annotation, Segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Named counters, serialized as a flat JSON object with sorted keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, usize>);

impl Stats {
    /// Counter value, 0 when the key was never observed
    pub fn get(&self, key: &str) -> usize {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn set(&mut self, key: &str, value: usize) {
        self.0.insert(key.to_string(), value);
    }

    fn bump(&mut self, key: String) {
        *self.0.entry(key).or_insert(0) += 1;
    }
}

/// Count over `segments` using the persisted `annotations` and the current
/// lock table (segment id -> holder)
pub fn aggregate(
    segments: &[Segment],
    annotations: &HashMap<String, Annotation>,
    locks: &HashMap<String, String>,
) -> Stats {
    let mut stats = Stats::default();

    let mut checked = 0;
    for annotation in annotations.values() {
        let status = &annotation.current_status;
        if status.is_checked() {
            checked += 1;
        }
        if !status.name.is_empty() {
            stats.bump(format!("status:{}", status.name));
        }
        if !status.source.is_empty() {
            stats.bump(format!("checked by:{}", status.source));
        }
        for label in &annotation.labels {
            stats.bump(format!("label:{}", label));
        }
        if !annotation.comment.trim().is_empty() {
            stats.bump("comment".to_string());
        }
    }

    let checkable = segments
        .iter()
        .filter(|s| !locks.contains_key(&s.id))
        .filter(|s| {
            annotations
                .get(&s.id)
                .map_or(true, |a| !a.current_status.is_checked())
        })
        .count();

    for user in locks.values() {
        stats.bump(format!("locked by:{}", user));
    }

    stats.set("total", segments.len());
    stats.set("checked", checked);
    stats.set("unchecked", checkable);
    stats.set("checkable", checkable);
    stats.set("locked", locks.len());
    stats
}
