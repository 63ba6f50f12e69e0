// dcmscrub-core/src/substitution.rs
//! Recursive substitution of sensitive values throughout a record tree.
//!
//! Given a [`SensitivePair`] `(original, replacement)`, every textual
//! occurrence of `original` is replaced by `replacement` at every depth of a
//! [`Record`]:
//!
//! * Multi-valued strings are split on [`VALUE_DELIMITER`], each component is
//!   rewritten independently and the components are re-joined, so the field
//!   keeps its multiplicity.
//! * Numeric fields are rewritten through their decimal form, and only when
//!   `original` is made of digits. The result is parsed back into the field's
//!   numeric kind.
//! * Sequence items are recursed into one by one.
//! * Tag references, opaque values and empty values pass through untouched.
//!
//! Several pairs are applied sequentially in the order given: later pairs see
//! the output of earlier ones.
//!
//! Two conditions are reported as [`SubstitutionWarning`]s rather than
//! applied: a replacement containing the delimiter (which would change the
//! field's multiplicity) and a numeric rewrite that no longer parses.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::path::FieldPath;
use crate::record::{FieldValue, Record, VALUE_DELIMITER, VALUE_DELIMITER_STR};
use crate::redaction::{log_substitution_debug, loggable};
use crate::validators::is_all_digits;

/// One side of a [`SensitivePair`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PairValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PairValue {
    /// The textual form used for matching and replacing.
    pub fn as_text(&self) -> String {
        match self {
            PairValue::Integer(i) => i.to_string(),
            PairValue::Float(f) => f.to_string(),
            PairValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for PairValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for PairValue {
    fn from(value: &str) -> Self {
        PairValue::Text(value.to_string())
    }
}

impl From<String> for PairValue {
    fn from(value: String) -> Self {
        PairValue::Text(value)
    }
}

impl From<i64> for PairValue {
    fn from(value: i64) -> Self {
        PairValue::Integer(value)
    }
}

impl From<f64> for PairValue {
    fn from(value: f64) -> Self {
        PairValue::Float(value)
    }
}

/// An `(original, replacement)` mapping to propagate through a record tree.
///
/// Serialized as a two-element array, `["12345", "98765"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(PairValue, PairValue)", into = "(PairValue, PairValue)")]
pub struct SensitivePair {
    pub original: PairValue,
    pub replacement: PairValue,
}

impl SensitivePair {
    pub fn new(original: impl Into<PairValue>, replacement: impl Into<PairValue>) -> Self {
        Self {
            original: original.into(),
            replacement: replacement.into(),
        }
    }
}

impl From<(PairValue, PairValue)> for SensitivePair {
    fn from((original, replacement): (PairValue, PairValue)) -> Self {
        Self {
            original,
            replacement,
        }
    }
}

impl From<SensitivePair> for (PairValue, PairValue) {
    fn from(pair: SensitivePair) -> Self {
        (pair.original, pair.replacement)
    }
}

/// A data-integrity condition detected while substituting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SubstitutionWarning {
    /// The replacement contains the multi-value delimiter; applying it would
    /// change the number of values held by the field. The field was left
    /// unchanged.
    Cardinality { path: FieldPath, replacement: String },
    /// The rewritten decimal form of a numeric field does not parse back into
    /// the field's numeric kind. The field was left unchanged.
    NumericRewriteFailed { path: FieldPath, rewritten: String },
}

impl fmt::Display for SubstitutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstitutionWarning::Cardinality { path, .. } => write!(
                f,
                "replacement contains the value delimiter; field {} left unchanged",
                path
            ),
            SubstitutionWarning::NumericRewriteFailed { path, .. } => write!(
                f,
                "rewritten numeric value does not parse; field {} left unchanged",
                path
            ),
        }
    }
}

/// Outcome of applying one or more pairs to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubstitutionReport {
    /// Number of field rewrites performed (a field rewritten by two pairs
    /// counts twice).
    pub rewrites: usize,
    pub warnings: Vec<SubstitutionWarning>,
}

impl SubstitutionReport {
    pub fn changed(&self) -> bool {
        self.rewrites > 0
    }

    pub fn merge(&mut self, other: SubstitutionReport) {
        self.rewrites += other.rewrites;
        self.warnings.extend(other.warnings);
    }
}

/// Applies an ordered list of sensitive pairs to records.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionEngine {
    pairs: Vec<SensitivePair>,
}

impl SubstitutionEngine {
    pub fn new(pairs: Vec<SensitivePair>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[SensitivePair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Folds every pair over `record`, in order.
    pub fn apply(&self, record: &mut Record) -> SubstitutionReport {
        substitute_all(record, &self.pairs)
    }
}

/// Applies `pairs` sequentially to `record`.
pub fn substitute_all(record: &mut Record, pairs: &[SensitivePair]) -> SubstitutionReport {
    let mut report = SubstitutionReport::default();
    for pair in pairs {
        report.merge(substitute(record, pair));
    }
    report
}

/// Replaces every occurrence of `pair.original` by `pair.replacement` in
/// `record`, at every depth.
pub fn substitute(record: &mut Record, pair: &SensitivePair) -> SubstitutionReport {
    let mut report = SubstitutionReport::default();
    let original = pair.original.as_text();
    if original.is_empty() {
        warn!("Ignoring sensitive pair with an empty original value.");
        return report;
    }
    let replacement = pair.replacement.as_text();
    let rewriter = Rewriter {
        numeric: is_all_digits(&original),
        original: &original,
        replacement: &replacement,
    };
    debug!(
        "Substituting '{}' (numeric fields: {})",
        loggable(&original),
        rewriter.numeric
    );

    let mut path = FieldPath::new();
    rewriter.record(record, &mut path, &mut report);

    for warning in &report.warnings {
        warn!("{}", warning);
    }
    report
}

/// Returns a substituted copy of `record`, leaving the input untouched.
pub fn substituted(record: &Record, pairs: &[SensitivePair]) -> (Record, SubstitutionReport) {
    let mut copy = record.clone();
    let report = substitute_all(&mut copy, pairs);
    (copy, report)
}

struct Rewriter<'a> {
    original: &'a str,
    replacement: &'a str,
    /// Whether numeric fields are eligible for rewriting.
    numeric: bool,
}

impl Rewriter<'_> {
    fn record(&self, record: &mut Record, path: &mut FieldPath, report: &mut SubstitutionReport) {
        for (tag, field) in record.iter_mut() {
            path.push_field(*tag);
            self.value(&mut field.value, path, report);
            path.pop();
        }
    }

    fn value(&self, value: &mut FieldValue, path: &mut FieldPath, report: &mut SubstitutionReport) {
        match value {
            FieldValue::Sequence(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    path.push_item(index);
                    self.record(item, path, report);
                    path.pop();
                }
            }
            FieldValue::Text(text) => {
                let rewritten = if text.contains(VALUE_DELIMITER) {
                    let mut parts: Vec<String> =
                        text.split(VALUE_DELIMITER).map(str::to_string).collect();
                    self.components(&mut parts, path, report)
                        .then(|| parts.join(VALUE_DELIMITER_STR))
                } else {
                    self.text(text, path, report)
                };
                if let Some(rewritten) = rewritten {
                    log_substitution_debug(path_tag(path), text, &rewritten);
                    *text = rewritten;
                    report.rewrites += 1;
                }
            }
            FieldValue::MultiText(parts) => {
                if self.components(parts, path, report) {
                    report.rewrites += 1;
                }
            }
            FieldValue::Integer(number) => {
                if let Some(rewritten) = self.number(*number, path, report) {
                    *number = rewritten;
                    report.rewrites += 1;
                }
            }
            FieldValue::Float(number) => {
                if let Some(rewritten) = self.number(*number, path, report) {
                    *number = rewritten;
                    report.rewrites += 1;
                }
            }
            FieldValue::Integers(numbers) => {
                if self.numbers(numbers, path, report) {
                    report.rewrites += 1;
                }
            }
            FieldValue::Floats(numbers) => {
                if self.numbers(numbers, path, report) {
                    report.rewrites += 1;
                }
            }
            FieldValue::TagRef(_) | FieldValue::Opaque(_) | FieldValue::Empty => {}
        }
    }

    /// Rewrites a single-valued string. A replacement holding the delimiter
    /// would turn it into a multi-valued one, so that case is refused too.
    fn text(&self, text: &str, path: &FieldPath, report: &mut SubstitutionReport) -> Option<String> {
        if !text.contains(self.original) {
            return None;
        }
        if self.replacement.contains(VALUE_DELIMITER) {
            report.warnings.push(self.cardinality_warning(path));
            return None;
        }
        Some(text.replace(self.original, self.replacement))
    }

    /// Rewrites each component in place. Returns whether anything changed.
    fn components(
        &self,
        parts: &mut [String],
        path: &FieldPath,
        report: &mut SubstitutionReport,
    ) -> bool {
        if !parts.iter().any(|part| part.contains(self.original)) {
            return false;
        }
        if self.replacement.contains(VALUE_DELIMITER) {
            report.warnings.push(self.cardinality_warning(path));
            return false;
        }
        for part in parts.iter_mut() {
            if part.contains(self.original) {
                *part = part.replace(self.original, self.replacement);
            }
        }
        true
    }

    fn number<N>(&self, number: N, path: &FieldPath, report: &mut SubstitutionReport) -> Option<N>
    where
        N: fmt::Display + std::str::FromStr,
    {
        if !self.numeric {
            return None;
        }
        let text = number.to_string();
        if !text.contains(self.original) {
            return None;
        }
        let rewritten = text.replace(self.original, self.replacement);
        match rewritten.parse::<N>() {
            Ok(parsed) => {
                log_substitution_debug(path_tag(path), &text, &rewritten);
                Some(parsed)
            }
            Err(_) => {
                report.warnings.push(SubstitutionWarning::NumericRewriteFailed {
                    path: path.clone(),
                    rewritten,
                });
                None
            }
        }
    }

    fn numbers<N>(&self, numbers: &mut [N], path: &FieldPath, report: &mut SubstitutionReport) -> bool
    where
        N: fmt::Display + std::str::FromStr + Copy,
    {
        let mut changed = false;
        for number in numbers.iter_mut() {
            if let Some(rewritten) = self.number(*number, path, report) {
                *number = rewritten;
                changed = true;
            }
        }
        changed
    }

    fn cardinality_warning(&self, path: &FieldPath) -> SubstitutionWarning {
        SubstitutionWarning::Cardinality {
            path: path.clone(),
            replacement: self.replacement.to_string(),
        }
    }
}

fn path_tag(path: &FieldPath) -> crate::record::Tag {
    path.final_field().unwrap_or(crate::record::Tag::new(0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, Tag, Vr};
    use crate::tags;

    fn patient_record() -> Record {
        let nested = Record::new()
            .with(tags::PATIENT_ID, Field::text(Vr::LO, "12345"))
            .with(tags::SERIES_DATE, Field::text(Vr::DA, "20240115"));
        Record::new()
            .with(tags::PATIENT_ID, Field::text(Vr::LO, "12345"))
            .with(tags::PATIENT_NAME, Field::text(Vr::PN, "Doe^John"))
            .with(tags::SERIES_DATE, Field::text(Vr::DA, "20240115"))
            .with(
                tags::IMAGE_TYPE,
                Field::text(Vr::CS, "ORIGINAL\\PRIMARY\\12345"),
            )
            .with(tags::SERIES_NUMBER, Field::integer(Vr::IS, 123456))
            .with(Tag::new(0x0018, 0x0050), Field::float(Vr::DS, 12345.5))
            .with(
                tags::DIMENSION_INDEX_POINTER,
                Field::tag_ref(vec![Tag::new(0x0012, 0x3450)]),
            )
            .with(tags::REFERENCED_STUDY_SEQUENCE, Field::sequence(vec![nested]))
    }

    #[test]
    fn test_non_matching_pair_is_a_no_op() {
        let mut record = patient_record();
        let before = record.clone();
        let report = substitute(&mut record, &SensitivePair::new("99999", "00000"));
        assert_eq!(record, before);
        assert!(!report.changed());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_replaces_at_every_depth() {
        let mut record = patient_record();
        let report = substitute(&mut record, &SensitivePair::new("12345", "ABCDE"));

        assert_eq!(record.text(tags::PATIENT_ID).as_deref(), Some("ABCDE"));
        assert_eq!(
            record.text(tags::IMAGE_TYPE).as_deref(),
            Some("ORIGINAL\\PRIMARY\\ABCDE")
        );
        let Some(FieldValue::Sequence(items)) =
            record.get_field(tags::REFERENCED_STUDY_SEQUENCE).map(|f| &f.value)
        else {
            panic!("sequence missing");
        };
        assert_eq!(items[0].text(tags::PATIENT_ID).as_deref(), Some("ABCDE"));
        assert!(report.changed());
    }

    #[test]
    fn test_multi_valued_cardinality_is_preserved() {
        let mut record = Record::new().with(
            tags::IMAGE_TYPE,
            Field::text(Vr::CS, "DERIVED\\12345\\M\\12345"),
        );
        substitute(&mut record, &SensitivePair::new("12345", "777"));
        let value = &record.get_field(tags::IMAGE_TYPE).unwrap().value;
        assert_eq!(value.multiplicity(), 4);
        assert_eq!(value.to_text().as_deref(), Some("DERIVED\\777\\M\\777"));

        let mut multi = Record::new().with(
            tags::IMAGE_TYPE,
            Field::multi_text(Vr::CS, ["ORIGINAL", "12345"]),
        );
        substitute(&mut multi, &SensitivePair::new("12345", "777"));
        assert_eq!(
            multi.get_field(tags::IMAGE_TYPE).unwrap().value,
            FieldValue::MultiText(vec!["ORIGINAL".into(), "777".into()])
        );
    }

    #[test]
    fn test_delimiter_in_replacement_is_refused_and_reported() {
        let mut record = Record::new()
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "ORIGINAL\\12345"))
            .with(tags::PATIENT_ID, Field::text(Vr::LO, "12345"));
        let before = record.clone();
        let report = substitute(&mut record, &SensitivePair::new("12345", "A\\B"));

        assert_eq!(record, before);
        assert_eq!(report.warnings.len(), 2);
        assert!(matches!(
            &report.warnings[0],
            SubstitutionWarning::Cardinality { path, .. } if path.to_string() == "00080008"
        ));
    }

    #[test]
    fn test_numeric_fields_require_digit_original() {
        let mut record = patient_record();
        substitute(&mut record, &SensitivePair::new("12345", "54321"));
        assert_eq!(
            record.get_field(tags::SERIES_NUMBER).unwrap().value,
            FieldValue::Integer(543216)
        );
        assert_eq!(
            record.get_field(Tag::new(0x0018, 0x0050)).unwrap().value,
            FieldValue::Float(54321.5)
        );

        let mut untouched = patient_record();
        substitute(&mut untouched, &SensitivePair::new("1234x", "54321"));
        assert_eq!(
            untouched.get_field(tags::SERIES_NUMBER).unwrap().value,
            FieldValue::Integer(123456)
        );
    }

    #[test]
    fn test_numeric_rewrite_keeps_numeric_kind() {
        let mut record = Record::new()
            .with(tags::SERIES_NUMBER, Field::integer(Vr::IS, 2024))
            .with(Tag::new(0x0028, 0x0030), Field::new(Vr::FD, FieldValue::Floats(vec![2024.0, 1.5])));
        substitute(&mut record, &SensitivePair::new("2024", "1999"));
        assert!(matches!(
            record.get_field(tags::SERIES_NUMBER).unwrap().value,
            FieldValue::Integer(1999)
        ));
        assert_eq!(
            record.get_field(Tag::new(0x0028, 0x0030)).unwrap().value,
            FieldValue::Floats(vec![1999.0, 1.5])
        );
    }

    #[test]
    fn test_unparseable_numeric_rewrite_is_reported() {
        let mut record = Record::new().with(tags::SERIES_NUMBER, Field::integer(Vr::IS, 12345));
        let report = substitute(&mut record, &SensitivePair::new("12345", "ABC"));
        assert_eq!(
            record.get_field(tags::SERIES_NUMBER).unwrap().value,
            FieldValue::Integer(12345)
        );
        assert!(matches!(
            report.warnings.as_slice(),
            [SubstitutionWarning::NumericRewriteFailed { rewritten, .. }] if rewritten == "ABC"
        ));
    }

    #[test]
    fn test_tag_references_pass_through() {
        let mut record = Record::new().with(
            tags::DIMENSION_INDEX_POINTER,
            Field::tag_ref(vec![Tag::new(0x0020, 0x9056)]),
        );
        let before = record.clone();
        let report = substitute(&mut record, &SensitivePair::new("9056", "1111"));
        assert_eq!(record, before);
        assert!(!report.changed());
    }

    #[test]
    fn test_pairs_apply_sequentially() {
        let pairs = vec![
            SensitivePair::new("AAA", "BBB"),
            SensitivePair::new("BBB", "CCC"),
        ];
        let record = Record::new().with(tags::PATIENT_ID, Field::text(Vr::LO, "AAA"));
        let (out, report) = substituted(&record, &pairs);
        assert_eq!(out.text(tags::PATIENT_ID).as_deref(), Some("CCC"));
        assert_eq!(report.rewrites, 2);
        // the input is untouched
        assert_eq!(record.text(tags::PATIENT_ID).as_deref(), Some("AAA"));

        let reversed: Vec<SensitivePair> = pairs.into_iter().rev().collect();
        let (out, _) = substituted(&record, &reversed);
        assert_eq!(out.text(tags::PATIENT_ID).as_deref(), Some("BBB"));
    }

    #[test]
    fn test_empty_original_is_ignored() {
        let mut record = patient_record();
        let before = record.clone();
        let report = substitute(&mut record, &SensitivePair::new("", "X"));
        assert_eq!(record, before);
        assert!(!report.changed());
    }

    #[test]
    fn test_pair_json_form() {
        let pairs: Vec<SensitivePair> =
            serde_json::from_str(r#"[["12345", "ABCDE"], [20240115, 20240201]]"#).unwrap();
        assert_eq!(pairs[0], SensitivePair::new("12345", "ABCDE"));
        assert_eq!(pairs[1].original, PairValue::Integer(20240115));
        assert_eq!(
            serde_json::to_string(&pairs[0]).unwrap(),
            r#"["12345","ABCDE"]"#
        );
    }
}
