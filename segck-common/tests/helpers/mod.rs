//! Shared fixtures: on-disk projects in temporary folders

#![allow(dead_code)]

use segck_common::model::{Annotation, Chunk, Segment, Status};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub fn segment(id: &str) -> Segment {
    Segment {
        id: id.to_string(),
        url: format!("http://localhost:7371/audio/{}.wav", id),
        segment_type: "silence".to_string(),
        chunk: Chunk::new(1000, 2500),
    }
}

pub fn status(name: &str, source: &str) -> Status {
    Status {
        name: name.to_string(),
        source: source.to_string(),
        timestamp: "Fri, 16 Oct 2026 10:00:00 GMT".to_string(),
    }
}

pub fn reviewed(id: &str, name: &str, source: &str) -> Annotation {
    let mut annotation = Annotation::from_segment(segment(id));
    annotation.current_status = status(name, source);
    annotation
}

pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Project with one source file per id (named `<id>.json`) and an empty
/// annotation folder
pub fn project(ids: &[&str]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("source")).unwrap();
    fs::create_dir(tmp.path().join("annotation")).unwrap();
    for id in ids {
        write_json(&tmp.path().join("source").join(format!("{}.json", id)), &segment(id));
    }
    tmp
}

pub fn add_annotation(project: &Path, annotation: &Annotation) {
    write_json(
        &project.join("annotation").join(format!("{}.json", annotation.id())),
        annotation,
    );
}
