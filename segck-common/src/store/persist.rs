//! Atomic annotation writes
//!
//! The record is written to `<id>.json.tmp` next to the target and renamed
//! over `<id>.json`, so a reader never sees a half-written file.

use crate::model::Annotation;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Final path of the record for `id`
pub fn annotation_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

/// Write `annotation` to `dir`, replacing any previous record. The transient
/// index is never written.
pub fn write_annotation(dir: &Path, annotation: &Annotation) -> io::Result<PathBuf> {
    let target = annotation_path(dir, annotation.id());
    let tmp = dir.join(format!("{}.json.tmp", annotation.id()));

    let mut record = annotation.clone();
    record.index = None;
    let json = serde_json::to_vec_pretty(&record)?;

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map(|_| target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, Segment};
    use tempfile::TempDir;

    fn annotation(id: &str) -> Annotation {
        let mut anno = Annotation::from_segment(Segment {
            id: id.to_string(),
            url: "http://localhost/a.wav".to_string(),
            segment_type: "silence".to_string(),
            chunk: Chunk::new(0, 500),
        });
        anno.index = Some(7);
        anno
    }

    #[test]
    fn test_write_strips_index_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_annotation(tmp.path(), &annotation("a")).unwrap();

        assert_eq!(path, tmp.path().join("a.json"));
        assert!(!tmp.path().join("a.json.tmp").exists());

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(written.get("index").is_none());
        assert_eq!(written["id"], "a");
    }

    #[test]
    fn test_write_replaces_existing_record() {
        let tmp = TempDir::new().unwrap();
        write_annotation(tmp.path(), &annotation("a")).unwrap();

        let mut updated = annotation("a");
        updated.comment = "second".to_string();
        write_annotation(tmp.path(), &updated).unwrap();

        let back: Annotation =
            serde_json::from_slice(&fs::read(tmp.path().join("a.json")).unwrap()).unwrap();
        assert_eq!(back.comment, "second");
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone");
        assert!(write_annotation(&missing, &annotation("a")).is_err());
    }
}
