// dcmscrub-core/src/lib.rs
//! # dcmscrub Core Library
//!
//! `dcmscrub-core` holds the logic that runs around an external DICOM
//! anonymizer: it prepares the anonymizer's per-batch script, then cleans up
//! what the anonymizer leaves behind. It works on an in-memory [`Record`]
//! model and reaches the filesystem only through a [`RecordSerializer`].
//!
//! ## Modules
//!
//! * `record`: `Record`, `Field`, `FieldValue`, `Tag` and `Vr`.
//! * `tags`: named attributes and keyword lookup.
//! * `substitution`: recursive replacement of sensitive values in a record tree.
//! * `extractor`: derives `(original, replacement)` pairs from two reference records.
//! * `config` / `compiler` / `classifier`: YAML classification rules, their compiled
//!   form, and the first-match-wins delete decision.
//! * `geometry`: orders the slices of a series along their scan axis.
//! * `script`: fresh, mutated copies of the anonymizer script template.
//! * `serializer`: JSON and DICOM Part 10 record files.
//! * `audit_log`: the per-cohort subject log and the issue log.
//! * `pipeline`: folder-level passes (scrub, purge, rename, strip).
//! * `redaction` / `validators` / `errors`: PII-safe logging, value checks, `ScrubError`.
//!
//! ## Usage Example
//!
//! ```rust
//! use dcmscrub_core::{
//!     tags, Classifier, ClassifierFlags, Field, Record, SensitivePair, SubstitutionEngine, Vr,
//! };
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let mut record = Record::new()
//!         .with(tags::PATIENT_ID, Field::text(Vr::LO, "12345"))
//!         .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "ORIGINAL\\PRIMARY\\12345"))
//!         .with(tags::MODALITY, Field::text(Vr::CS, "MR"));
//!
//!     // Replace a leaked identifier everywhere in the record.
//!     let engine = SubstitutionEngine::new(vec![SensitivePair::new("12345", "98765")]);
//!     let report = engine.apply(&mut record);
//!     assert!(report.warnings.is_empty());
//!     assert_eq!(record.text(tags::PATIENT_ID).as_deref(), Some("98765"));
//!
//!     // Decide whether the file behind the record must go.
//!     let classifier = Classifier::for_flags(ClassifierFlags::default())?;
//!     assert!(!classifier.classify(&record).delete);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Component-level failures are [`ScrubError`] values. Conditions the caller
//! is expected to log and move past (missing attributes, failed reference
//! lookups, cardinality hazards) are returned as data, never as errors.
//! Folder-level passes in `pipeline` return `anyhow::Result`.
//!
//! ---
//! License: MIT OR Apache-2.0

pub mod audit_log;
pub mod classifier;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod extractor;
pub mod geometry;
pub mod path;
pub mod pipeline;
pub mod record;
pub mod redaction;
pub mod script;
pub mod serializer;
pub mod substitution;
pub mod tags;
pub mod validators;

pub use record::{Field, FieldValue, Record, Tag, Vr, VALUE_DELIMITER};

pub use errors::ScrubError;

pub use substitution::{
    substitute, substitute_all, substituted, PairValue, SensitivePair, SubstitutionEngine,
    SubstitutionReport, SubstitutionWarning,
};

pub use extractor::{
    extract_from_records, extract_sensitive_pairs, find_reference_record, Extraction,
    ExtractionIssue, IssueKind, Side,
};

pub use config::{
    ClassificationRule, ClassifierConfig, ClassifierFlags, Condition, MatchKind,
    MAX_PATTERN_LENGTH,
};

pub use compiler::{compile_rules, get_or_compile_rules, CompiledRule, CompiledRules};

pub use classifier::{classify, delete_if_identifiable, Classification, Classifier};

pub use geometry::{sort_by_slice_position, sort_slices, SliceGeometry};

pub use script::{prepare_script, ScriptInjection, ScriptOverrides};

pub use serializer::{JsonRecordSerializer, RecordFormat, RecordSerializer};

#[cfg(feature = "dicom")]
pub use serializer::DicomFileSerializer;

pub use audit_log::{AuditEntry, AuditLog, IssueLog};

pub use path::FieldPath;

pub use redaction::redact_sensitive;
