// dcmscrub-core/src/extractor.rs
//! Derives the sensitive pairs for one subject by comparing a reference
//! record from before anonymization with one from after.
//!
//! Extraction never fails. Any reference that cannot be found or read, and
//! any field missing on either side, is reported as an [`ExtractionIssue`];
//! when there is at least one issue the pair list is empty.
//!
//! License: MIT OR Apache-2.0

use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::record::{Field, FieldValue, Record, Tag};
use crate::redaction::log_pair_debug;
use crate::serializer::RecordSerializer;
use crate::substitution::{PairValue, SensitivePair};
use crate::tags;

/// Fields compared between the two references, in pair order.
pub const SENSITIVE_FIELDS: &[(Tag, &str)] = &[
    (tags::PATIENT_ID, "PatientID"),
    (tags::SERIES_DATE, "SeriesDate"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Original,
    Anonymized,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Original => f.write_str("original"),
            Side::Anonymized => f.write_str("anonymized"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum IssueKind {
    /// No record file under the subject folder.
    NoReference,
    /// The reference record exists but could not be read.
    Unreadable(String),
    /// The named field is absent or has no usable value.
    MissingField(String),
}

/// One failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionIssue {
    pub side: Side,
    pub kind: IssueKind,
}

impl fmt::Display for ExtractionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::NoReference => write!(f, "{}_ref: no reference record", self.side),
            IssueKind::Unreadable(reason) => write!(f, "{}_ref: unreadable ({})", self.side, reason),
            IssueKind::MissingField(field) => write!(f, "{}_ref.{}", self.side, field),
        }
    }
}

/// Pairs plus the lookups that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub pairs: Vec<SensitivePair>,
    pub issues: Vec<ExtractionIssue>,
}

impl Extraction {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// The first record file met in a sorted depth-first walk of `root`.
pub fn find_reference_record(root: &Path, serializer: &dyn RecordSerializer) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .find(|entry| entry.file_type().is_file() && serializer.is_record_file(entry.path()))
        .map(|entry| entry.into_path())
}

fn pair_value(field: &Field) -> Option<PairValue> {
    match &field.value {
        FieldValue::Integer(i) => Some(PairValue::Integer(*i)),
        FieldValue::Float(f) => Some(PairValue::Float(*f)),
        other => other
            .to_text()
            .filter(|text| !text.trim().is_empty())
            .map(PairValue::Text),
    }
}

fn lookup(record: &Record, side: Side, fields: &[(Tag, &str)], issues: &mut Vec<ExtractionIssue>) -> Vec<Option<PairValue>> {
    fields
        .iter()
        .map(|(tag, name)| {
            let value = record.get_field(*tag).and_then(pair_value);
            if value.is_none() {
                issues.push(ExtractionIssue {
                    side,
                    kind: IssueKind::MissingField((*name).to_string()),
                });
            }
            value
        })
        .collect()
}

/// Pairs `fields` of two already-read references.
pub fn extract_from_records(original: &Record, anonymized: &Record, fields: &[(Tag, &str)]) -> Extraction {
    let mut issues = Vec::new();
    let before = lookup(original, Side::Original, fields, &mut issues);
    let after = lookup(anonymized, Side::Anonymized, fields, &mut issues);
    if !issues.is_empty() {
        return Extraction {
            pairs: Vec::new(),
            issues,
        };
    }

    let pairs = before
        .into_iter()
        .zip(after)
        .zip(fields)
        .filter_map(|((original, replacement), (_, name))| {
            let (original, replacement) = (original?, replacement?);
            log_pair_debug(name, &original.as_text(), &replacement.as_text());
            Some(SensitivePair {
                original,
                replacement,
            })
        })
        .collect();
    Extraction { pairs, issues }
}

fn load_reference(
    root: &Path,
    side: Side,
    serializer: &dyn RecordSerializer,
) -> Result<Record, ExtractionIssue> {
    let Some(path) = find_reference_record(root, serializer) else {
        return Err(ExtractionIssue {
            side,
            kind: IssueKind::NoReference,
        });
    };
    debug!("Using {} as the {} reference.", path.display(), side);
    serializer.read(&path).map_err(|e| ExtractionIssue {
        side,
        kind: IssueKind::Unreadable(e.to_string()),
    })
}

/// Derives the PatientID and SeriesDate pairs for one subject from its
/// original and anonymized folders.
pub fn extract_sensitive_pairs(
    original_root: &Path,
    anonymized_root: &Path,
    serializer: &dyn RecordSerializer,
) -> Extraction {
    extract_sensitive_pairs_for(original_root, anonymized_root, serializer, SENSITIVE_FIELDS)
}

/// [`extract_sensitive_pairs`] over a caller-chosen field list.
pub fn extract_sensitive_pairs_for(
    original_root: &Path,
    anonymized_root: &Path,
    serializer: &dyn RecordSerializer,
    fields: &[(Tag, &str)],
) -> Extraction {
    let original = load_reference(original_root, Side::Original, serializer);
    let anonymized = load_reference(anonymized_root, Side::Anonymized, serializer);

    let extraction = match (original, anonymized) {
        (Ok(original), Ok(anonymized)) => extract_from_records(&original, &anonymized, fields),
        (original, anonymized) => {
            // A readable side is still checked so every failed lookup is named.
            let mut issues = Vec::new();
            for (side, reference) in [(Side::Original, original), (Side::Anonymized, anonymized)] {
                match reference {
                    Ok(record) => {
                        lookup(&record, side, fields, &mut issues);
                    }
                    Err(issue) => issues.push(issue),
                }
            }
            Extraction {
                pairs: Vec::new(),
                issues,
            }
        }
    };
    for issue in &extraction.issues {
        warn!("Sensitive pair lookup failed: {}", issue);
    }
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Vr;
    use crate::serializer::JsonRecordSerializer;

    fn reference(id: &str, date: &str) -> Record {
        Record::new()
            .with(tags::PATIENT_ID, Field::text(Vr::LO, id))
            .with(tags::SERIES_DATE, Field::text(Vr::DA, date))
    }

    #[test]
    fn test_pairs_follow_field_order() {
        let extraction = extract_from_records(
            &reference("12345", "20240115"),
            &reference("98765432101", "20240201"),
            SENSITIVE_FIELDS,
        );
        assert!(extraction.is_complete());
        assert_eq!(
            extraction.pairs,
            vec![
                SensitivePair::new("12345", "98765432101"),
                SensitivePair::new("20240115", "20240201"),
            ]
        );
    }

    #[test]
    fn test_missing_field_yields_no_pairs_and_names_the_lookup() {
        let mut anonymized = reference("98765432101", "20240201");
        anonymized.remove(tags::SERIES_DATE);
        let extraction = extract_from_records(&reference("12345", "20240115"), &anonymized, SENSITIVE_FIELDS);
        assert!(extraction.pairs.is_empty());
        assert_eq!(
            extraction.issues,
            vec![ExtractionIssue {
                side: Side::Anonymized,
                kind: IssueKind::MissingField("SeriesDate".to_string()),
            }]
        );
        assert_eq!(extraction.issues[0].to_string(), "anonymized_ref.SeriesDate");
    }

    #[test]
    fn test_numeric_fields_keep_their_kind() {
        let original = Record::new().with(tags::PATIENT_ID, Field::integer(Vr::IS, 12345));
        let anonymized = Record::new().with(tags::PATIENT_ID, Field::integer(Vr::IS, 777));
        let extraction = extract_from_records(&original, &anonymized, &SENSITIVE_FIELDS[..1]);
        assert_eq!(extraction.pairs, vec![SensitivePair::new(12345_i64, 777_i64)]);
    }

    #[test]
    fn test_reference_discovery_and_failures_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = JsonRecordSerializer;
        let original = dir.path().join("orig");
        let anonymized = dir.path().join("anon");

        serializer
            .write(&reference("12345", "20240115"), &original.join("series_b/2.json"))
            .unwrap();
        serializer
            .write(&reference("OTHER", "20000101"), &original.join("series_b/9.json"))
            .unwrap();
        assert_eq!(
            find_reference_record(&original, &serializer),
            Some(original.join("series_b/2.json"))
        );

        // Nothing under the anonymized folder yet.
        std::fs::create_dir_all(&anonymized).unwrap();
        let extraction = extract_sensitive_pairs(&original, &anonymized, &serializer);
        assert!(extraction.pairs.is_empty());
        assert_eq!(
            extraction.issues,
            vec![ExtractionIssue {
                side: Side::Anonymized,
                kind: IssueKind::NoReference,
            }]
        );

        // An unreadable reference is reported, not raised.
        std::fs::write(anonymized.join("a.json"), "garbage").unwrap();
        let extraction = extract_sensitive_pairs(&original, &anonymized, &serializer);
        assert!(matches!(
            extraction.issues.as_slice(),
            [ExtractionIssue { side: Side::Anonymized, kind: IssueKind::Unreadable(_) }]
        ));

        serializer
            .write(&reference("98765432101", "20240201"), &anonymized.join("a.json"))
            .unwrap();
        let extraction = extract_sensitive_pairs(&original, &anonymized, &serializer);
        assert!(extraction.is_complete());
        assert_eq!(extraction.pairs.len(), 2);
        assert_eq!(extraction.pairs[0], SensitivePair::new("12345", "98765432101"));
    }

    #[test]
    fn test_unreadable_side_still_reports_the_other_sides_fields() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = JsonRecordSerializer;
        let original = dir.path().join("orig");
        let anonymized = dir.path().join("anon");
        std::fs::create_dir_all(&original).unwrap();
        std::fs::write(original.join("a.json"), "not a record").unwrap();
        serializer
            .write(
                &Record::new().with(tags::PATIENT_ID, Field::text(Vr::LO, "98765432101")),
                &anonymized.join("a.json"),
            )
            .unwrap();

        let extraction = extract_sensitive_pairs(&original, &anonymized, &serializer);
        assert!(extraction.pairs.is_empty());
        assert_eq!(extraction.issues.len(), 2);
        assert!(matches!(
            &extraction.issues[0],
            ExtractionIssue { side: Side::Original, kind: IssueKind::Unreadable(_) }
        ));
        assert_eq!(
            extraction.issues[1],
            ExtractionIssue {
                side: Side::Anonymized,
                kind: IssueKind::MissingField("SeriesDate".to_string()),
            }
        );
    }
}
