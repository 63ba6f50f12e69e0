// dcmscrub-core/src/serializer/json.rs

use std::fs;
use std::path::Path;

use super::RecordSerializer;
use crate::errors::ScrubError;
use crate::record::Record;

/// Records stored as pretty-printed JSON, one record per file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordSerializer;

impl RecordSerializer for JsonRecordSerializer {
    fn read(&self, path: &Path) -> Result<Record, ScrubError> {
        let text = fs::read_to_string(path).map_err(|e| ScrubError::read(path, e))?;
        serde_json::from_str(&text).map_err(|e| ScrubError::read(path, e))
    }

    fn write(&self, record: &Record, path: &Path) -> Result<(), ScrubError> {
        let text = serde_json::to_string_pretty(record).map_err(|e| ScrubError::write(path, e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ScrubError::write(path, e))?;
        }
        fs::write(path, text).map_err(|e| ScrubError::write(path, e))
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, FieldValue, Tag, Vr};
    use crate::tags;

    #[test]
    fn test_nested_record_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/record.json");
        let item = Record::new().with(tags::PATIENT_ID, Field::text(Vr::LO, "12345"));
        let record = Record::new()
            .with(tags::REFERENCED_STUDY_SEQUENCE, Field::sequence(vec![item.clone(), item]))
            .with(Tag::new(0x7FE0, 0x0010), Field::new(Vr::OB, FieldValue::Opaque(vec![0, 1, 2])))
            .with(tags::DIMENSION_INDEX_POINTER, Field::tag_ref(vec![tags::PATIENT_ID]));

        JsonRecordSerializer.write(&record, &path).unwrap();
        assert_eq!(JsonRecordSerializer.read(&path).unwrap(), record);
    }

    #[test]
    fn test_unreadable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonRecordSerializer.read(&path).unwrap_err();
        assert!(matches!(err, ScrubError::RecordRead { .. }));
    }
}
