//! Startup loading of source segments and existing annotations
//!
//! Any inconsistency aborts the load. The server must not start against
//! data it cannot trust.

use crate::model::{Annotation, Segment};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SOURCE_DIR_NAME: &str = "source";
const ANNOTATION_DIR_NAME: &str = "annotation";

/// Directory layout of a project: `<project>/source` and `<project>/annotation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirs {
    pub project: PathBuf,
    pub source: PathBuf,
    pub annotation: PathBuf,
}

impl ProjectDirs {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        let project = project.into();
        Self {
            source: project.join(SOURCE_DIR_NAME),
            annotation: project.join(ANNOTATION_DIR_NAME),
            project,
        }
    }

    /// Check the project and source dirs exist, and create the annotation dir
    /// if it is missing
    pub fn prepare(&self) -> Result<()> {
        require_dir(&self.project, "project dir")?;
        require_dir(&self.source, "source dir")?;

        if !self.annotation.exists() {
            fs::create_dir_all(&self.annotation).map_err(|e| {
                Error::load(
                    &self.annotation,
                    format!("failed to create annotation folder: {}", e),
                )
            })?;
            info!("Created annotation dir {}", self.annotation.display());
        } else if !self.annotation.is_dir() {
            return Err(Error::load(&self.annotation, "annotation dir is not a directory"));
        }
        Ok(())
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(Error::load(path, format!("{} does not exist", what)));
    }
    if !path.is_dir() {
        return Err(Error::load(path, format!("{} is not a directory", what)));
    }
    Ok(())
}

/// Everything read from disk at startup
#[derive(Debug, Clone, Default)]
pub struct LoadedData {
    /// Segments in traversal order
    pub segments: Vec<Segment>,
    pub annotations: HashMap<String, Annotation>,
}

/// Load and cross-validate a project
pub fn load(dirs: &ProjectDirs) -> Result<LoadedData> {
    dirs.prepare()?;

    let segments = load_segments(&dirs.source)?;
    info!("Loaded {} source files", segments.len());

    let annotations = load_annotations(&dirs.annotation)?;
    info!("Loaded {} annotation files", annotations.len());

    validate(&dirs.source, &segments, &annotations)?;
    info!("Data validated without errors");

    Ok(LoadedData {
        segments,
        annotations,
    })
}

/// `*.json` files directly inside `dir`, sorted by path.
/// The sort fixes the traversal order for the lifetime of the process.
pub fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes =
        fs::read(path).map_err(|e| Error::load(path, format!("couldn't read file: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::load(path, format!("couldn't parse: {}", e)))
}

/// Read all source segments, rejecting invalid records and duplicate ids
pub fn load_segments(source_dir: &Path) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut seen = HashSet::new();

    for path in list_json_files(source_dir)? {
        let segment: Segment = read_record(&path)?;
        segment
            .validate()
            .map_err(|reason| Error::load(&path, format!("invalid segment: {}", reason)))?;
        if !seen.insert(segment.id.clone()) {
            return Err(Error::load(
                &path,
                format!("duplicate ids for source data: {}", segment.id),
            ));
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// Read all annotation records, rejecting invalid records and duplicate ids
pub fn load_annotations(annotation_dir: &Path) -> Result<HashMap<String, Annotation>> {
    let mut annotations = HashMap::new();

    for path in list_json_files(annotation_dir)? {
        let mut annotation: Annotation = read_record(&path)?;
        annotation
            .validate()
            .map_err(|reason| Error::load(&path, format!("invalid annotation: {}", reason)))?;
        annotation.index = None;
        let id = annotation.id().to_string();
        if annotations.insert(id.clone(), annotation).is_some() {
            return Err(Error::load(
                &path,
                format!("duplicate ids for annotation data: {}", id),
            ));
        }
    }
    Ok(annotations)
}

fn validate(
    source_dir: &Path,
    segments: &[Segment],
    annotations: &HashMap<String, Annotation>,
) -> Result<()> {
    if segments.is_empty() {
        return Err(Error::load(source_dir, "found no segments in source data"));
    }

    let by_id: HashMap<&str, &Segment> = segments.iter().map(|s| (s.id.as_str(), s)).collect();
    for (id, annotation) in annotations {
        let segment = by_id.get(id.as_str()).ok_or_else(|| {
            Error::load(
                source_dir,
                format!("annotation data with id {} not found in source data", id),
            )
        })?;
        annotation
            .matches_segment(segment)
            .map_err(|reason| Error::load(source_dir, reason))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_annotation_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("source")).unwrap();

        let dirs = ProjectDirs::new(tmp.path());
        dirs.prepare().unwrap();
        assert!(dirs.annotation.is_dir());
    }

    #[test]
    fn test_prepare_requires_source_dir() {
        let tmp = TempDir::new().unwrap();
        let err = ProjectDirs::new(tmp.path()).prepare().unwrap_err();
        assert!(err.to_string().contains("source dir does not exist"));
    }

    #[test]
    fn test_list_json_files_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.json", "a.json", "notes.txt", "c.json"] {
            fs::write(tmp.path().join(name), "{}").unwrap();
        }
        fs::create_dir(tmp.path().join("nested.json")).unwrap();

        let names: Vec<String> = list_json_files(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
    }
}
