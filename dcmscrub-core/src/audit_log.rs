// dcmscrub-core/src/audit_log.rs
//! Append-only logs written per processed subject.
//!
//! [`AuditLog`] records which output subject each input folder became and
//! with which date offset, one `input, output, offset` line per subject. It is
//! read back by the scrub pass to pair original and anonymized folders, so
//! the format is stable.
//!
//! [`IssueLog`] records the failed reference lookups of subjects whose
//! sensitive pairs could not be derived.
//!
//! License: MIT OR Apache-2.0

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::extractor::ExtractionIssue;

/// Prefix of anonymized subject folder names.
pub const SUBJECT_PREFIX: &str = "sub-";

/// Name of the issue log inside an output directory.
pub const ISSUE_LOG_NAME: &str = "all_file_issues.txt";

/// One processed subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// Input folder name.
    pub input_id: String,
    /// Output subject folder name, e.g. `sub-12345678901`.
    pub output_id: String,
    /// Date offset applied by the anonymizer, in days.
    pub date_offset: i32,
}

impl AuditEntry {
    /// An entry whose output folder is derived from the injected PatientID.
    pub fn for_subject(input_id: impl Into<String>, patient_id: &str, date_offset: i32) -> Self {
        Self {
            input_id: input_id.into(),
            output_id: format!("{}{}", SUBJECT_PREFIX, patient_id),
            date_offset,
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}, {}, {}\n", self.input_id, self.output_id, self.date_offset)
    }

    /// Parses one log line. Returns `None` for blank or malformed lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(3, ',').map(str::trim);
        let input_id = parts.next().filter(|s| !s.is_empty())?;
        let output_id = parts.next().filter(|s| !s.is_empty())?;
        let date_offset = parts.next()?.parse().ok()?;
        Some(Self {
            input_id: input_id.to_string(),
            output_id: output_id.to_string(),
            date_offset,
        })
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))
}

/// The per-cohort subject audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `CTP_<cohort>_newids_dateinc_log.csv` inside `dir`.
    pub fn for_cohort(dir: &Path, cohort: &str) -> Self {
        Self::new(dir.join(format!("CTP_{}_newids_dateinc_log.csv", cohort)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        debug!("Audit: {} -> {}", entry.input_id, entry.output_id);
        append_line(&self.path, &entry.to_line())
    }

    /// Every well-formed entry, in file order. A missing log has no entries.
    pub fn read_entries(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read audit log {}", self.path.display()))?;
        let mut entries = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match AuditEntry::parse_line(line) {
                Some(entry) => entries.push(entry),
                None => warn!(
                    "Skipping malformed line {} of {}.",
                    number + 1,
                    self.path.display()
                ),
            }
        }
        Ok(entries)
    }

    /// Whether `input_id` has already been processed.
    pub fn contains_input(&self, input_id: &str) -> Result<bool> {
        Ok(self.read_entries()?.iter().any(|e| e.input_id == input_id))
    }
}

/// Failed reference lookups, one line per subject.
#[derive(Debug, Clone)]
pub struct IssueLog {
    path: PathBuf,
}

impl IssueLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// [`ISSUE_LOG_NAME`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(ISSUE_LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, input_id: &str, output_id: &str, issues: &[ExtractionIssue]) -> Result<()> {
        let rendered: Vec<String> = issues.iter().map(|i| format!("'{}'", i)).collect();
        let line = format!(
            "{} {} [{}] {}\n",
            input_id,
            output_id,
            rendered.join(", "),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        append_line(&self.path, &line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{IssueKind, Side};

    #[test]
    fn test_line_format_is_stable() {
        let entry = AuditEntry::for_subject("P001", "12345678901", -12);
        assert_eq!(entry.to_line(), "P001, sub-12345678901, -12\n");
        assert_eq!(AuditEntry::parse_line(&entry.to_line()), Some(entry));
        assert_eq!(AuditEntry::parse_line("P001, sub-1"), None);
        assert_eq!(AuditEntry::parse_line("P001, sub-1, soon"), None);
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::for_cohort(dir.path(), "cohortA");
        assert!(log.read_entries().unwrap().is_empty());

        log.append(&AuditEntry::for_subject("P001", "111", 5)).unwrap();
        log.append(&AuditEntry::for_subject("P002", "222", -30)).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"garbage line\n\n")
            .unwrap();

        let entries = log.read_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].output_id, "sub-222");
        assert_eq!(entries[1].date_offset, -30);
        assert!(log.contains_input("P001").unwrap());
        assert!(!log.contains_input("P003").unwrap());
        assert!(log
            .path()
            .ends_with("CTP_cohortA_newids_dateinc_log.csv"));
    }

    #[test]
    fn test_issue_log_names_failed_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let log = IssueLog::in_dir(dir.path());
        log.append(
            "P001",
            "sub-111",
            &[ExtractionIssue {
                side: Side::Original,
                kind: IssueKind::MissingField("PatientID".to_string()),
            }],
        )
        .unwrap();
        let text = fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("P001 sub-111 ['original_ref.PatientID'] "));
        assert!(text.ends_with('\n'));
    }
}
