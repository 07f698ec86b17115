//! Segment and annotation records
//!
//! Field names follow the on-disk JSON layout (snake_case). One file per
//! record, named `<id>.json`.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status name given to segments nobody has reviewed yet
pub const STATUS_UNCHECKED: &str = "unchecked";

/// Label with its own filter and stats semantics
pub const LABEL_BAD_SAMPLE: &str = "bad sample";

/// Filter keyword: any status other than unchecked
pub const FILTER_CHECKED: &str = "checked";
/// Filter keyword: every segment
pub const FILTER_ANY: &str = "any";

/// Time range within the source audio, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Start time in milliseconds
    pub start: i64,
    /// End time in milliseconds
    pub end: i64,
}

impl Chunk {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }
}

/// Immutable reference to a time range of a source recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(alias = "uuid")]
    pub id: String,
    pub url: String,
    pub segment_type: String,
    pub chunk: Chunk,
}

impl Segment {
    /// Structural checks applied to every source record at load time.
    /// Returns the reason on failure.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.is_empty() {
            return Err("no id".to_string());
        }
        if self.segment_type.is_empty() {
            return Err("no segment type".to_string());
        }
        if self.url.is_empty() {
            return Err("no URL".to_string());
        }
        if self.chunk.start > self.chunk.end {
            return Err(format!(
                "chunk end must be after chunk start, found chunk {:?}",
                self.chunk
            ));
        }
        Ok(())
    }
}

/// Review status set by an annotator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub name: String,
    /// Annotator who set the status
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub timestamp: String,
}

impl Status {
    pub fn unchecked() -> Self {
        Self {
            name: STATUS_UNCHECKED.to_string(),
            ..Default::default()
        }
    }

    /// True for the status a segment has before anyone reviewed it.
    /// Such a status is never pushed onto the history.
    pub fn is_default(&self) -> bool {
        self.name.is_empty() || (self.name == STATUS_UNCHECKED && self.source.is_empty())
    }

    /// True for any status other than unchecked/empty
    pub fn is_checked(&self) -> bool {
        !self.name.is_empty() && self.name != STATUS_UNCHECKED
    }
}

/// Mutable review record attached to a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(flatten)]
    pub segment: Segment,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub current_status: Status,
    #[serde(default)]
    pub status_history: Vec<Status>,
    #[serde(default)]
    pub comment: String,
    /// 1-based position in traversal order. Never written to disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl Annotation {
    /// Default annotation for a segment nobody has reviewed
    pub fn from_segment(segment: Segment) -> Self {
        Self {
            segment,
            labels: Vec::new(),
            current_status: Status::unchecked(),
            status_history: Vec::new(),
            comment: String::new(),
            index: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.segment.id
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn is_bad_sample(&self) -> bool {
        self.has_label(LABEL_BAD_SAMPLE)
    }

    /// Structural checks applied to every annotation record at load time
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.segment.validate()?;
        if !self.status_history.is_empty() && self.current_status.name.is_empty() {
            return Err(format!(
                "status history exists, but no current status for {}",
                self.id()
            ));
        }
        Ok(())
    }

    /// Checks id, URL and type against the source segment.
    /// The chunk may differ: annotators adjust boundaries while reviewing.
    pub fn matches_segment(&self, segment: &Segment) -> std::result::Result<(), String> {
        let own = &self.segment;
        if own.id != segment.id {
            return Err(format!(
                "annotation data has a different ID than source data: {} vs {}",
                own.id, segment.id
            ));
        }
        if own.url != segment.url {
            return Err(format!(
                "annotation data has a different URL than source data: {} vs {}",
                own.url, segment.url
            ));
        }
        if own.segment_type != segment.segment_type {
            return Err(format!(
                "annotation data has a different segment type than source data: {} vs {}",
                own.segment_type, segment.segment_type
            ));
        }
        Ok(())
    }
}

/// Absolute position requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIndex {
    First,
    Last,
    /// 0-based position
    At(usize),
}

impl RequestIndex {
    /// Resolve to a concrete 0-based index into a list of `len` segments
    pub fn resolve(self, len: usize) -> Result<usize> {
        match self {
            _ if len == 0 => Err(Error::InvalidIndex(self.to_string())),
            RequestIndex::First => Ok(0),
            RequestIndex::Last => Ok(len - 1),
            RequestIndex::At(i) if i < len => Ok(i),
            RequestIndex::At(_) => Err(Error::InvalidIndex(self.to_string())),
        }
    }
}

impl FromStr for RequestIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "first" => Ok(RequestIndex::First),
            "last" => Ok(RequestIndex::Last),
            other => other
                .parse::<usize>()
                .map(RequestIndex::At)
                .map_err(|_| Error::InvalidIndex(s.to_string())),
        }
    }
}

impl fmt::Display for RequestIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIndex::First => write!(f, "first"),
            RequestIndex::Last => write!(f, "last"),
            RequestIndex::At(i) => write!(f, "{}", i),
        }
    }
}

/// Client request for the next segment to work on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub request_status: Vec<String>,
    #[serde(default)]
    pub step_size: i64,
    #[serde(default)]
    pub curr_id: String,
    /// "first", "last" or a 0-based position. Accepts a JSON number too.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_index: Option<String>,
    /// Audio context in milliseconds added on both sides of the clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<i64>,
}

impl Query {
    /// Parsed absolute index, if one was requested
    pub fn request_index(&self) -> Result<Option<RequestIndex>> {
        match self.request_index.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }

    pub fn status_filter(&self) -> Result<StatusFilter> {
        StatusFilter::parse(self.request_status.as_slice())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

/// One predicate of a status filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterTerm {
    Any,
    Checked,
    BadSample,
    Name(String),
}

impl FilterTerm {
    pub fn matches(&self, status: &Status, labels: &[String]) -> bool {
        match self {
            FilterTerm::Any => true,
            FilterTerm::Checked => status.is_checked(),
            FilterTerm::BadSample => labels.iter().any(|l| l == LABEL_BAD_SAMPLE),
            FilterTerm::Name(name) => status.name == *name,
        }
    }
}

/// Predicate over an annotation's status and labels.
/// A segment matches when any term matches; no terms means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    terms: Vec<FilterTerm>,
}

impl StatusFilter {
    pub fn parse<S: AsRef<str>>(request_status: &[S]) -> Result<Self> {
        let mut terms = Vec::new();
        for raw in request_status.iter().map(AsRef::as_ref) {
            if raw.is_empty() {
                continue;
            }
            if raw.trim() != raw {
                return Err(Error::InvalidStatusFilter(raw.to_string()));
            }
            let term = match raw {
                FILTER_ANY => FilterTerm::Any,
                FILTER_CHECKED => FilterTerm::Checked,
                LABEL_BAD_SAMPLE => FilterTerm::BadSample,
                name => FilterTerm::Name(name.to_string()),
            };
            terms.push(term);
        }
        Ok(Self { terms })
    }

    pub fn matches(&self, annotation: &Annotation) -> bool {
        self.matches_status(&annotation.current_status, &annotation.labels)
    }

    pub fn matches_status(&self, status: &Status, labels: &[String]) -> bool {
        self.terms.is_empty() || self.terms.iter().any(|t| t.matches(status, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: &str) -> Segment {
        Segment {
            id: id.to_string(),
            url: format!("http://localhost/{}.wav", id),
            segment_type: "silence".to_string(),
            chunk: Chunk::new(1000, 2000),
        }
    }

    fn with_status(name: &str, labels: &[&str]) -> Annotation {
        let mut anno = Annotation::from_segment(segment("a"));
        anno.current_status = Status {
            name: name.to_string(),
            source: "u1".to_string(),
            timestamp: String::new(),
        };
        anno.labels = labels.iter().map(|l| l.to_string()).collect();
        anno
    }

    #[test]
    fn test_segment_validation() {
        assert!(segment("a").validate().is_ok());

        let mut seg = segment("");
        assert_eq!(seg.validate().unwrap_err(), "no id");

        seg = segment("a");
        seg.segment_type.clear();
        assert_eq!(seg.validate().unwrap_err(), "no segment type");

        seg = segment("a");
        seg.chunk = Chunk::new(10, 5);
        assert!(seg.validate().unwrap_err().contains("chunk end"));

        seg.chunk = Chunk::new(5, 5);
        assert!(seg.validate().is_ok());
    }

    #[test]
    fn test_annotation_json_layout() {
        let json = r#"{
            "id": "a",
            "url": "http://localhost/a.wav",
            "segment_type": "silence",
            "chunk": {"start": 1000, "end": 2000},
            "labels": ["bad sample"],
            "current_status": {"name": "ok", "source": "u1", "timestamp": "t"},
            "status_history": [],
            "comment": "hiss"
        }"#;
        let anno: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(anno.id(), "a");
        assert!(anno.is_bad_sample());
        assert_eq!(anno.index, None);

        let out = serde_json::to_value(&anno).unwrap();
        assert_eq!(out["segment_type"], "silence");
        assert!(out.get("index").is_none());
    }

    #[test]
    fn test_legacy_uuid_field_accepted() {
        let json = r#"{"uuid": "b", "url": "u", "segment_type": "t", "chunk": {"start": 0, "end": 1}}"#;
        let seg: Segment = serde_json::from_str(json).unwrap();
        assert_eq!(seg.id, "b");
    }

    #[test]
    fn test_default_status_detection() {
        assert!(Status::default().is_default());
        assert!(Status::unchecked().is_default());
        let explicit = Status {
            name: STATUS_UNCHECKED.to_string(),
            source: "u1".to_string(),
            timestamp: String::new(),
        };
        assert!(!explicit.is_default());
        assert!(!explicit.is_checked());
    }

    #[test]
    fn test_request_index_resolution() {
        assert_eq!("first".parse::<RequestIndex>().unwrap().resolve(3).unwrap(), 0);
        assert_eq!("last".parse::<RequestIndex>().unwrap().resolve(3).unwrap(), 2);
        assert_eq!("1".parse::<RequestIndex>().unwrap().resolve(3).unwrap(), 1);
        assert!(matches!(
            "3".parse::<RequestIndex>().unwrap().resolve(3),
            Err(Error::InvalidIndex(_))
        ));
        assert!(matches!("-1".parse::<RequestIndex>(), Err(Error::InvalidIndex(_))));
        assert!(matches!("middle".parse::<RequestIndex>(), Err(Error::InvalidIndex(_))));
    }

    #[test]
    fn test_query_request_index_accepts_number() {
        let q: Query = serde_json::from_str(r#"{"user_name": "u1", "request_index": 2}"#).unwrap();
        assert_eq!(q.request_index().unwrap(), Some(RequestIndex::At(2)));

        let q: Query = serde_json::from_str(r#"{"user_name": "u1", "request_index": ""}"#).unwrap();
        assert_eq!(q.request_index().unwrap(), None);

        let q: Query = serde_json::from_str(r#"{"user_name": "u1"}"#).unwrap();
        assert_eq!(q.step_size, 0);
        assert_eq!(q.request_index().unwrap(), None);
    }

    #[test]
    fn test_status_filter_semantics() {
        let unchecked = Annotation::from_segment(segment("a"));
        let ok = with_status("ok", &[]);
        let bad = with_status("skip", &["bad sample"]);

        let any = StatusFilter::parse(&["any"]).unwrap();
        assert!(any.matches(&unchecked) && any.matches(&ok) && any.matches(&bad));

        let empty = StatusFilter::parse::<&str>(&[]).unwrap();
        assert!(empty.matches(&unchecked));
        assert!(StatusFilter::parse(&[""]).unwrap().matches(&ok));

        let checked = StatusFilter::parse(&["checked"]).unwrap();
        assert!(!checked.matches(&unchecked));
        assert!(checked.matches(&ok) && checked.matches(&bad));

        let bad_sample = StatusFilter::parse(&["bad sample"]).unwrap();
        assert!(bad_sample.matches(&bad));
        assert!(!bad_sample.matches(&ok));

        let ok_or_skip = StatusFilter::parse(&["ok", "skip"]).unwrap();
        assert!(ok_or_skip.matches(&ok) && ok_or_skip.matches(&bad));
        assert!(!ok_or_skip.matches(&unchecked));
    }

    #[test]
    fn test_status_filter_rejects_padded_entries() {
        assert!(matches!(
            StatusFilter::parse(&[" ok"]),
            Err(Error::InvalidStatusFilter(_))
        ));
        assert!(matches!(
            StatusFilter::parse(&["   "]),
            Err(Error::InvalidStatusFilter(_))
        ));
    }
}
