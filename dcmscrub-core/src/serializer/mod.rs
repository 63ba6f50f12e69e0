// dcmscrub-core/src/serializer/mod.rs
//! Reading and writing [`Record`]s on disk.
//!
//! The core components never touch files directly; they go through a
//! [`RecordSerializer`]. Two implementations are provided:
//!
//! * [`JsonRecordSerializer`]: the serde JSON form of a record, lossless for
//!   every field kind. Used for fixtures and tests.
//! * `DicomFileSerializer` (feature `dicom`): DICOM Part 10 files through
//!   `dicom-object`.
//!
//! License: MIT OR Apache-2.0

use anyhow::{Context, Result};
use log::warn;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::ScrubError;
use crate::record::Record;

mod json;
pub use json::JsonRecordSerializer;

#[cfg(feature = "dicom")]
mod dicom;
#[cfg(feature = "dicom")]
pub use self::dicom::DicomFileSerializer;

/// Reads and writes records at filesystem paths.
pub trait RecordSerializer: Send + Sync {
    fn read(&self, path: &Path) -> Result<Record, ScrubError>;

    fn write(&self, record: &Record, path: &Path) -> Result<(), ScrubError>;

    /// File extension of record files, without the dot.
    fn extension(&self) -> &'static str;

    /// Whether `path` looks like a record file for this serializer.
    fn is_record_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.extension()))
    }
}

/// On-disk record formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    #[cfg(feature = "dicom")]
    Dicom,
}

impl RecordFormat {
    pub fn serializer(self) -> Box<dyn RecordSerializer> {
        match self {
            RecordFormat::Json => Box::new(JsonRecordSerializer),
            #[cfg(feature = "dicom")]
            RecordFormat::Dicom => Box::new(DicomFileSerializer),
        }
    }
}

/// Every record file under `root`, in a deterministic depth-first order
/// (entries sorted by file name at each level).
pub fn record_files(root: &Path, serializer: &dyn RecordSerializer) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && serializer.is_record_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        warn!("No record files found under {}.", root.display());
    }
    Ok(files)
}

/// Record files directly inside `dir` (not recursive), sorted by name.
pub fn record_files_in(dir: &Path, serializer: &dyn RecordSerializer) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if entry.file_type().is_file() && serializer.is_record_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, Vr};
    use crate::tags;

    #[test]
    fn test_record_files_walk_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/inner")).unwrap();
        std::fs::create_dir_all(root.join("a")).unwrap();
        let record = Record::new().with(tags::PATIENT_ID, Field::text(Vr::LO, "1"));
        let serializer = JsonRecordSerializer;
        for path in ["b/inner/2.json", "a/9.json", "a/1.json", "0.json"] {
            serializer.write(&record, &root.join(path)).unwrap();
        }
        std::fs::write(root.join("a/notes.txt"), "ignored").unwrap();

        let files: Vec<String> = record_files(root, &serializer)
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(files, vec!["0.json", "a/1.json", "a/9.json", "b/inner/2.json"]);

        let top = record_files_in(root, &serializer).unwrap();
        assert_eq!(top.len(), 1);
    }
}
