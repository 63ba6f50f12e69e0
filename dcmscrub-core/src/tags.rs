// dcmscrub-core/src/tags.rs
//! Named attributes used by the classifier, extractor, slice sorter and
//! script mutator.

use crate::record::Tag;

pub const SERIES_DATE: Tag = Tag::new(0x0008, 0x0021);
pub const STUDY_DATE: Tag = Tag::new(0x0008, 0x0020);
pub const STUDY_TIME: Tag = Tag::new(0x0008, 0x0030);
pub const SERIES_TIME: Tag = Tag::new(0x0008, 0x0031);
pub const IMAGE_TYPE: Tag = Tag::new(0x0008, 0x0008);
pub const MODALITY: Tag = Tag::new(0x0008, 0x0060);
pub const SERIES_DESCRIPTION: Tag = Tag::new(0x0008, 0x103E);
pub const REFERENCED_STUDY_SEQUENCE: Tag = Tag::new(0x0008, 0x1110);
pub const REFERENCED_PERFORMED_PROCEDURE_STEP_SEQUENCE: Tag = Tag::new(0x0008, 0x1111);
pub const REFERENCED_IMAGE_SEQUENCE: Tag = Tag::new(0x0008, 0x1140);
pub const RELATED_SERIES_SEQUENCE: Tag = Tag::new(0x0008, 0x1250);
pub const PATIENT_NAME: Tag = Tag::new(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);
pub const SEQUENCE_NAME: Tag = Tag::new(0x0018, 0x0024);
pub const PROTOCOL_NAME: Tag = Tag::new(0x0018, 0x1030);
pub const SERIES_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000E);
pub const SERIES_NUMBER: Tag = Tag::new(0x0020, 0x0011);
pub const IMAGE_POSITION_PATIENT: Tag = Tag::new(0x0020, 0x0032);
pub const IMAGE_ORIENTATION_PATIENT: Tag = Tag::new(0x0020, 0x0037);
pub const DIMENSION_INDEX_POINTER: Tag = Tag::new(0x0020, 0x9165);

/// Keyword to tag table for the attributes rules may refer to by name.
const KEYWORDS: &[(&str, Tag)] = &[
    ("SeriesDate", SERIES_DATE),
    ("StudyDate", STUDY_DATE),
    ("StudyTime", STUDY_TIME),
    ("SeriesTime", SERIES_TIME),
    ("ImageType", IMAGE_TYPE),
    ("Modality", MODALITY),
    ("SeriesDescription", SERIES_DESCRIPTION),
    ("ReferencedStudySequence", REFERENCED_STUDY_SEQUENCE),
    ("ReferencedPerformedProcedureStepSequence", REFERENCED_PERFORMED_PROCEDURE_STEP_SEQUENCE),
    ("ReferencedImageSequence", REFERENCED_IMAGE_SEQUENCE),
    ("RelatedSeriesSequence", RELATED_SERIES_SEQUENCE),
    ("PatientName", PATIENT_NAME),
    ("PatientID", PATIENT_ID),
    ("SequenceName", SEQUENCE_NAME),
    ("ProtocolName", PROTOCOL_NAME),
    ("SeriesInstanceUID", SERIES_INSTANCE_UID),
    ("SeriesNumber", SERIES_NUMBER),
    ("ImagePositionPatient", IMAGE_POSITION_PATIENT),
    ("ImageOrientationPatient", IMAGE_ORIENTATION_PATIENT),
    ("DimensionIndexPointer", DIMENSION_INDEX_POINTER),
];

/// Resolves an attribute keyword (e.g. `"PatientID"`) or a literal tag
/// (e.g. `"(0010,0020)"`) to a [`Tag`].
pub fn resolve(name: &str) -> Option<Tag> {
    KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == name)
        .map(|(_, tag)| *tag)
        .or_else(|| name.parse().ok())
}

/// The keyword for a known tag, for log and audit output.
pub fn keyword(tag: Tag) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .find(|(_, known)| *known == tag)
        .map(|(keyword, _)| *keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keyword_and_literal() {
        assert_eq!(resolve("PatientID"), Some(PATIENT_ID));
        assert_eq!(resolve("(0008,0060)"), Some(MODALITY));
        assert_eq!(resolve("NotAnAttribute"), None);
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(keyword(SEQUENCE_NAME), Some("SequenceName"));
        assert_eq!(keyword(Tag::new(0x7FE0, 0x0010)), None);
    }
}
