// dcmscrub-core/src/classifier.rs
//! Rule classifier: decides whether a record describes a file that must be
//! deleted because it is identifiable or non-diagnostic.
//!
//! [`classify`] is a pure predicate over a record and a compiled rule set.
//! Rules are tried in priority order and the first rule whose conditions all
//! hold wins. A rule whose attribute is missing from the record is skipped,
//! never treated as a match. Deleting the backing file is a separate step,
//! [`delete_if_identifiable`].

use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::compiler::{get_or_compile_rules, CompiledCondition, CompiledRule, CompiledRules};
use crate::config::{ClassifierConfig, ClassifierFlags};
use crate::record::Record;
use crate::serializer::RecordSerializer;

/// The classifier's verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub delete: bool,
    /// Name of the rule that fired, if any.
    pub fired_rule: Option<String>,
}

impl Classification {
    pub fn keep() -> Self {
        Self {
            delete: false,
            fired_rule: None,
        }
    }

    fn fired(rule: &CompiledRule) -> Self {
        Self {
            delete: true,
            fired_rule: Some(rule.name.clone()),
        }
    }
}

enum ConditionOutcome {
    Match,
    NoMatch,
    /// The attribute is absent or has no textual form.
    Absent,
}

fn evaluate_condition(record: &Record, condition: &CompiledCondition) -> ConditionOutcome {
    let Some(components) = record.components(condition.tag) else {
        return ConditionOutcome::Absent;
    };
    if components.iter().any(|c| condition.regex.is_match(c)) {
        ConditionOutcome::Match
    } else {
        ConditionOutcome::NoMatch
    }
}

fn rule_matches(record: &Record, rule: &CompiledRule) -> bool {
    for condition in &rule.conditions {
        match evaluate_condition(record, condition) {
            ConditionOutcome::Match => {}
            ConditionOutcome::NoMatch => return false,
            ConditionOutcome::Absent => {
                debug!(
                    "Skipping rule '{}': attribute {} is absent.",
                    rule.name, condition.attribute
                );
                return false;
            }
        }
    }
    true
}

/// Evaluates `rules` against `record` in order; the first matching rule
/// decides.
pub fn classify(record: &Record, rules: &CompiledRules) -> Classification {
    rules
        .rules
        .iter()
        .find(|rule| rule_matches(record, rule))
        .map(Classification::fired)
        .unwrap_or_else(Classification::keep)
}

/// A compiled, shareable rule set.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Arc<CompiledRules>,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            rules: get_or_compile_rules(config)?,
        })
    }

    /// The built-in rules with the opt-in rules chosen by `flags`.
    pub fn for_flags(flags: ClassifierFlags) -> Result<Self> {
        Self::new(&ClassifierConfig::for_flags(flags)?)
    }

    pub fn classify(&self, record: &Record) -> Classification {
        classify(record, &self.rules)
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }
}

/// Reads the record at `path`, classifies it and deletes the file when a
/// rule fires.
pub fn delete_if_identifiable(
    path: &Path,
    serializer: &dyn RecordSerializer,
    classifier: &Classifier,
) -> Result<Classification> {
    let record = serializer.read(path)?;
    let verdict = classifier.classify(&record);
    if let Some(rule) = &verdict.fired_rule {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        info!("Deleted {} (rule '{}').", path.display(), rule);
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, Vr};
    use crate::serializer::JsonRecordSerializer;
    use crate::tags;

    fn default_classifier(delete_t1w: bool, delete_t2w: bool) -> Classifier {
        Classifier::for_flags(ClassifierFlags {
            delete_t1w,
            delete_t2w,
        })
        .unwrap()
    }

    fn fired(record: &Record, classifier: &Classifier) -> Option<String> {
        classifier.classify(record).fired_rule
    }

    #[test]
    fn test_localizer_image_type_fires_image_type_rule() {
        let record = Record::new()
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "ORIGINAL\\PRIMARY\\LOCALIZER"))
            .with(tags::MODALITY, Field::text(Vr::CS, "MR"));
        let verdict = default_classifier(false, false).classify(&record);
        assert!(verdict.delete);
        assert_eq!(verdict.fired_rule.as_deref(), Some("non_diagnostic_image_type"));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let record = Record::new()
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "DERIVED\\LOCALIZER"))
            .with(tags::PROTOCOL_NAME, Field::text(Vr::LO, "AAhead_scout"));
        assert_eq!(
            fired(&record, &default_classifier(false, false)).as_deref(),
            Some("non_diagnostic_image_type")
        );
    }

    #[test]
    fn test_structured_report_modality() {
        let record = Record::new().with(tags::MODALITY, Field::text(Vr::CS, "SR"));
        assert_eq!(
            fired(&record, &default_classifier(false, false)).as_deref(),
            Some("structured_report")
        );
    }

    #[test]
    fn test_secondary_requires_ct() {
        let classifier = default_classifier(false, false);
        let ct = Record::new()
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "DERIVED\\SECONDARY"))
            .with(tags::MODALITY, Field::text(Vr::CS, "CT"));
        assert_eq!(fired(&ct, &classifier).as_deref(), Some("secondary_ct_capture"));

        let mr = Record::new()
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "DERIVED\\SECONDARY"))
            .with(tags::MODALITY, Field::text(Vr::CS, "MR"));
        assert!(!classifier.classify(&mr).delete);

        // Modality absent: the rule is skipped rather than matched.
        let no_modality =
            Record::new().with(tags::IMAGE_TYPE, Field::text(Vr::CS, "DERIVED\\SECONDARY"));
        assert!(!classifier.classify(&no_modality).delete);
    }

    #[test]
    fn test_protocol_and_series_description_patterns() {
        let classifier = default_classifier(false, false);
        let scout = Record::new().with(tags::PROTOCOL_NAME, Field::text(Vr::LO, "t1_SCOUT_3pl"));
        assert_eq!(fired(&scout, &classifier).as_deref(), Some("scout_protocol"));

        for description in ["Key_Images", "Dose Report", "MORPHO_t1", "rapid results"] {
            let record = Record::new()
                .with(tags::SERIES_DESCRIPTION, Field::text(Vr::LO, description));
            assert_eq!(
                fired(&record, &classifier).as_deref(),
                Some("non_diagnostic_series_description"),
                "{}",
                description
            );
        }

        let diagnostic = Record::new()
            .with(tags::SERIES_DESCRIPTION, Field::text(Vr::LO, "t2_tse_tra"));
        assert!(!classifier.classify(&diagnostic).delete);
    }

    #[test]
    fn test_t1w_rule_is_opt_in() {
        let record = Record::new()
            .with(tags::SEQUENCE_NAME, Field::text(Vr::SH, "*tfl3d1_16ns"))
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "ORIGINAL\\PRIMARY\\M"));
        assert!(!default_classifier(false, false).classify(&record).delete);
        assert_eq!(
            fired(&record, &default_classifier(true, false)).as_deref(),
            Some("t1w_face_reconstructible")
        );
    }

    #[test]
    fn test_t1w_rule_needs_original_image() {
        let record = Record::new()
            .with(tags::SEQUENCE_NAME, Field::text(Vr::SH, "*tfl3d1_16ns"))
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "DERIVED\\PRIMARY\\MPR"));
        assert!(!default_classifier(true, true).classify(&record).delete);
    }

    #[test]
    fn test_t2w_inversion_recovery_opt_in() {
        let record = Record::new()
            .with(tags::SEQUENCE_NAME, Field::text(Vr::SH, "*tir2d1_11"))
            .with(tags::IMAGE_TYPE, Field::text(Vr::CS, "ORIGINAL\\PRIMARY"));
        assert!(!default_classifier(true, false).classify(&record).delete);
        assert_eq!(
            fired(&record, &default_classifier(false, true)).as_deref(),
            Some("t2w_inversion_recovery")
        );
    }

    #[test]
    fn test_empty_record_is_kept() {
        let verdict = default_classifier(true, true).classify(&Record::new());
        assert_eq!(verdict, Classification::keep());
    }

    #[test]
    fn test_delete_if_identifiable_removes_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = JsonRecordSerializer;
        let classifier = default_classifier(false, false);

        let localizer = dir.path().join("loc.json");
        serializer
            .write(
                &Record::new().with(tags::IMAGE_TYPE, Field::text(Vr::CS, "LOCALIZER")),
                &localizer,
            )
            .unwrap();
        let keep = dir.path().join("keep.json");
        serializer
            .write(
                &Record::new().with(tags::MODALITY, Field::text(Vr::CS, "MR")),
                &keep,
            )
            .unwrap();

        assert!(delete_if_identifiable(&localizer, &serializer, &classifier).unwrap().delete);
        assert!(!delete_if_identifiable(&keep, &serializer, &classifier).unwrap().delete);
        assert!(!localizer.exists());
        assert!(keep.exists());
    }
}
