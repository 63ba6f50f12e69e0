// dcmscrub-core/src/pipeline.rs
//! Headless operations over folders of records.
//!
//! These compose the core components into the post-processing passes run
//! after the external anonymizer:
//!
//! * [`scrub_subject`] / [`scrub_cohort`]: derive the sensitive pairs of a
//!   subject and fold them over every record of its anonymized folder.
//! * [`purge_identifiable`]: delete files the classifier flags.
//! * [`patient_identifiers`] / [`rename_leaking_files`]: repair file names
//!   that still contain a patient name.
//! * [`strip_tags`]: drop fixed attributes from every record.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audit_log::{AuditEntry, AuditLog, IssueLog};
use crate::classifier::{delete_if_identifiable, Classifier};
use crate::errors::ScrubError;
use crate::extractor::{extract_sensitive_pairs, ExtractionIssue};
use crate::geometry::sort_by_slice_position;
use crate::record::{Record, Tag};
use crate::serializer::{record_files, RecordSerializer};
use crate::substitution::{SubstitutionEngine, SubstitutionWarning};
use crate::tags;

/// Attributes removed by default by [`strip_tags`].
pub const DEFAULT_STRIP_TAGS: &[Tag] = &[tags::RELATED_SERIES_SEQUENCE, tags::SERIES_TIME];

/// Outcome of scrubbing one folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrubSummary {
    pub files_processed: usize,
    pub files_changed: usize,
    /// Files that could not be read or written; the pass continued.
    pub failed: Vec<FailedFile>,
    pub pairs: usize,
    pub warnings: Vec<SubstitutionWarning>,
    /// Failed reference lookups; non-empty means nothing was substituted.
    pub issues: Vec<ExtractionIssue>,
}

/// A record file a pass had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl FailedFile {
    fn new(path: PathBuf, error: &ScrubError) -> Self {
        FailedFile {
            path,
            reason: error.to_string(),
        }
    }
}

impl ScrubSummary {
    fn merge(&mut self, other: &ScrubSummary) {
        self.files_processed += other.files_processed;
        self.files_changed += other.files_changed;
        self.failed.extend(other.failed.iter().cloned());
        self.pairs += other.pairs;
        self.warnings.extend(other.warnings.iter().cloned());
        self.issues.extend(other.issues.iter().cloned());
    }
}

/// Applies `engine` to every record file under `root`, writing back those
/// that changed.
pub fn scrub_records(
    root: &Path,
    engine: &SubstitutionEngine,
    serializer: &dyn RecordSerializer,
) -> Result<ScrubSummary> {
    let mut summary = ScrubSummary {
        pairs: engine.pairs().len(),
        ..ScrubSummary::default()
    };
    if engine.is_empty() {
        debug!("No pairs for {}; nothing to scrub.", root.display());
        return Ok(summary);
    }

    for path in record_files(root, serializer)? {
        summary.files_processed += 1;
        let mut record = match serializer.read(&path) {
            Ok(record) => record,
            Err(e) => {
                warn!("{}", e);
                summary.failed.push(FailedFile::new(path, &e));
                continue;
            }
        };
        let report = engine.apply(&mut record);
        summary.warnings.extend(report.warnings.iter().cloned());
        if !report.changed() {
            continue;
        }
        match serializer.write(&record, &path) {
            Ok(()) => summary.files_changed += 1,
            Err(e) => {
                warn!("{}", e);
                summary.failed.push(FailedFile::new(path, &e));
            }
        }
    }
    info!(
        "Scrubbed {}: {} of {} files changed.",
        root.display(),
        summary.files_changed,
        summary.files_processed
    );
    Ok(summary)
}

/// Derives the subject's pairs from its original and anonymized folders and
/// scrubs the anonymized one. When the pairs cannot be derived, the summary
/// carries the issues and no file is touched.
pub fn scrub_subject(
    original_root: &Path,
    anonymized_root: &Path,
    serializer: &dyn RecordSerializer,
) -> Result<ScrubSummary> {
    let extraction = extract_sensitive_pairs(original_root, anonymized_root, serializer);
    if !extraction.is_complete() {
        return Ok(ScrubSummary {
            issues: extraction.issues,
            ..ScrubSummary::default()
        });
    }
    let engine = SubstitutionEngine::new(extraction.pairs);
    scrub_records(anonymized_root, &engine, serializer)
}

/// Per-subject results of a cohort pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CohortSummary {
    pub subjects: Vec<(AuditEntry, ScrubSummary)>,
    /// Audit entries whose anonymized folder does not exist.
    pub missing: Vec<AuditEntry>,
}

impl CohortSummary {
    pub fn total(&self) -> ScrubSummary {
        let mut total = ScrubSummary::default();
        for (_, summary) in &self.subjects {
            total.merge(summary);
        }
        total
    }
}

/// Runs [`scrub_subject`] for every subject in `audit`. Subjects whose pairs
/// cannot be derived are written to `issue_log`.
pub fn scrub_cohort(
    original_root: &Path,
    anonymized_root: &Path,
    audit: &AuditLog,
    issue_log: &IssueLog,
    serializer: &dyn RecordSerializer,
) -> Result<CohortSummary> {
    let entries = audit.read_entries()?;
    info!(
        "Scrubbing {} subjects listed in {}.",
        entries.len(),
        audit.path().display()
    );

    let mut cohort = CohortSummary::default();
    for entry in entries {
        let original = original_root.join(&entry.input_id);
        let anonymized = anonymized_root.join(&entry.output_id);
        if !anonymized.is_dir() {
            warn!(
                "No anonymized folder {} for {}; skipping.",
                anonymized.display(),
                entry.input_id
            );
            cohort.missing.push(entry);
            continue;
        }
        let summary = scrub_subject(&original, &anonymized, serializer)
            .with_context(|| format!("Failed to scrub subject {}", entry.input_id))?;
        if !summary.issues.is_empty() {
            issue_log.append(&entry.input_id, &entry.output_id, &summary.issues)?;
        }
        cohort.subjects.push((entry, summary));
    }
    Ok(cohort)
}

/// Outcome of [`purge_identifiable`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub files_scanned: usize,
    /// Deleted files with the rule that fired.
    pub deleted: Vec<(PathBuf, String)>,
    /// Number of deletions per series folder.
    pub per_series: BTreeMap<PathBuf, usize>,
    /// Files that could not be classified.
    pub failed: Vec<PathBuf>,
}

/// Glob pattern for record files exactly `folder_depth` folders below
/// `root`, e.g. `root/*/*/*/*.dcm` for depth 3.
pub fn purge_pattern(root: &Path, folder_depth: usize, extension: &str) -> Result<String> {
    let root = root
        .to_str()
        .ok_or_else(|| anyhow!("Root path {} is not valid UTF-8", root.display()))?;
    let mut pattern = glob::Pattern::escape(root);
    for _ in 0..folder_depth {
        pattern.push_str("/*");
    }
    pattern.push_str("/*.");
    pattern.push_str(extension);
    Ok(pattern)
}

/// Classifies every record file `folder_depth` folders below `root` and
/// deletes those a rule fires on.
pub fn purge_identifiable(
    root: &Path,
    folder_depth: usize,
    classifier: &Classifier,
    serializer: &dyn RecordSerializer,
) -> Result<PurgeReport> {
    let pattern = purge_pattern(root, folder_depth, serializer.extension())?;
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid search pattern {}", pattern))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .collect();
    paths.sort();

    let mut report = PurgeReport::default();
    if paths.is_empty() {
        warn!("No files match {}.", pattern);
        return Ok(report);
    }

    for path in paths {
        report.files_scanned += 1;
        match delete_if_identifiable(&path, serializer, classifier) {
            Ok(verdict) => {
                if let Some(rule) = verdict.fired_rule {
                    let series = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    *report.per_series.entry(series).or_insert(0) += 1;
                    report.deleted.push((path, rule));
                }
            }
            Err(e) => {
                warn!("Could not classify {}: {:#}", path.display(), e);
                report.failed.push(path);
            }
        }
    }
    for (series, count) in &report.per_series {
        info!("Deleted {} files from {}.", count, series.display());
    }
    Ok(report)
}

/// Stripped PatientName values of every readable record under `root`.
pub fn patient_identifiers(root: &Path, serializer: &dyn RecordSerializer) -> Result<BTreeSet<String>> {
    let mut identifiers = BTreeSet::new();
    for path in record_files(root, serializer)? {
        match serializer.read(&path) {
            Ok(record) => {
                if let Some(name) = record.text(tags::PATIENT_NAME) {
                    let name = name.trim();
                    if !name.is_empty() {
                        identifiers.insert(name.to_string());
                    }
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
    Ok(identifiers)
}

/// One renamed file, in slice order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedFile {
    pub ordinal: usize,
    pub from: PathBuf,
    pub to: PathBuf,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The lower-cased file name with every identifier replaced.
pub fn scrubbed_file_name(name: &str, identifiers: &BTreeSet<String>, replacement: &str) -> String {
    identifiers
        .iter()
        .filter(|id| !id.is_empty())
        .fold(name.to_lowercase(), |acc, id| acc.replace(&id.to_lowercase(), replacement))
}

/// If any record file under `dir` has one of `identifiers` in its name
/// (case-insensitive), renames every file there in slice order, replacing
/// the identifiers with `replacement`. Otherwise nothing is renamed.
pub fn rename_leaking_files(
    dir: &Path,
    identifiers: &BTreeSet<String>,
    replacement: &str,
    serializer: &dyn RecordSerializer,
) -> Result<Vec<RenamedFile>> {
    let files = record_files(dir, serializer)?;
    let lowered: Vec<String> = identifiers
        .iter()
        .filter(|id| !id.is_empty())
        .map(|id| id.to_lowercase())
        .collect();
    let leaking = files.iter().any(|path| {
        let name = file_name(path).to_lowercase();
        lowered.iter().any(|id| name.contains(id.as_str()))
    });
    if !leaking {
        debug!("No file name under {} holds a patient identifier.", dir.display());
        return Ok(Vec::new());
    }

    let mut slices: Vec<(PathBuf, Record)> = Vec::with_capacity(files.len());
    for path in files {
        let record = serializer.read(&path)?;
        slices.push((path, record));
    }
    let sorted = sort_by_slice_position(slices, |(_, record)| record)
        .with_context(|| format!("Cannot order the slices under {}", dir.display()))?;

    let plan: Vec<RenamedFile> = sorted
        .into_iter()
        .enumerate()
        .filter_map(|(ordinal, (from, _))| {
            let to = from.with_file_name(scrubbed_file_name(&file_name(&from), identifiers, replacement));
            (to != from).then_some(RenamedFile { ordinal, from, to })
        })
        .collect();

    // Every target is checked before the first rename so a conflict leaves
    // the folder as it was.
    let mut targets = BTreeSet::new();
    for step in &plan {
        if !targets.insert(step.to.clone()) {
            bail!(
                "Cannot rename {}: more than one file would become {}",
                step.from.display(),
                step.to.display()
            );
        }
        if step.to.exists() {
            bail!(
                "Cannot rename {} to {}: target already exists",
                step.from.display(),
                step.to.display()
            );
        }
    }

    let mut renamed = Vec::with_capacity(plan.len());
    for step in plan {
        fs::rename(&step.from, &step.to)
            .with_context(|| format!("Failed to rename {}", step.from.display()))?;
        renamed.push(step);
    }
    info!("Renamed {} files under {}.", renamed.len(), dir.display());
    Ok(renamed)
}

/// Outcome of [`strip_tags`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StripSummary {
    pub files_processed: usize,
    pub files_changed: usize,
}

/// Removes `tags_to_strip` from the top level of every record under `root`,
/// rewriting only the records that held one of them.
pub fn strip_tags(root: &Path, tags_to_strip: &[Tag], serializer: &dyn RecordSerializer) -> Result<StripSummary> {
    let mut summary = StripSummary::default();
    for path in record_files(root, serializer)? {
        summary.files_processed += 1;
        let mut record = serializer.read(&path)?;
        let mut modified = false;
        for tag in tags_to_strip {
            modified |= record.remove(*tag).is_some();
        }
        if modified {
            serializer.write(&record, &path)?;
            summary.files_changed += 1;
            debug!("Stripped tags from {}.", path.display());
        }
    }
    info!(
        "Stripped tags from {} of {} files under {}.",
        summary.files_changed,
        summary.files_processed,
        root.display()
    );
    Ok(summary)
}
