// dcmscrub-core/src/serializer/dicom.rs
//! DICOM Part 10 files as records.
//!
//! Reading maps every element onto the record model: strings and dates become
//! text, binary numbers become integers or floats, attribute tags become tag
//! references, sequences are mapped item by item, and everything else (bytes,
//! pixel data) is opaque.
//!
//! Writing patches the file already present at the target path. Rewritable
//! fields are put back, sequences are patched item by item, opaque fields are
//! left as they are on disk, and elements no longer present in the record
//! are removed. Scrubbing is therefore done in place.

use dicom_core::header::Header;
use dicom_core::value::{DataSetSequence, PrimitiveValue, Value};
use dicom_core::{DataElement, Tag as DicomTag, VR};
use dicom_object::{open_file, InMemDicomObject};
use log::debug;
use std::path::Path;
use std::str::FromStr;

use super::RecordSerializer;
use crate::errors::ScrubError;
use crate::record::{Field, FieldValue, Record, Tag, Vr, VALUE_DELIMITER_STR};

/// Records stored as DICOM Part 10 files (`.dcm`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomFileSerializer;

impl RecordSerializer for DicomFileSerializer {
    fn read(&self, path: &Path) -> Result<Record, ScrubError> {
        let obj = open_file(path).map_err(|e| ScrubError::read(path, e))?;
        Ok(object_to_record(&obj))
    }

    fn write(&self, record: &Record, path: &Path) -> Result<(), ScrubError> {
        let mut obj = open_file(path).map_err(|e| ScrubError::write(path, e))?;
        let changed = patch_object(&mut obj, record).map_err(|reason| ScrubError::write(path, reason))?;
        if !changed {
            debug!("{} unchanged, not rewriting.", path.display());
            return Ok(());
        }
        obj.write_to_file(path).map_err(|e| ScrubError::write(path, e))
    }

    fn extension(&self) -> &'static str {
        "dcm"
    }
}

fn to_tag(tag: DicomTag) -> Tag {
    Tag::new(tag.group(), tag.element())
}

fn to_dicom_tag(tag: Tag) -> DicomTag {
    DicomTag(tag.group, tag.element)
}

fn to_vr(vr: VR) -> Vr {
    Vr::from_str(&vr.to_string()).unwrap_or(Vr::UN)
}

fn to_dicom_vr(vr: Vr) -> VR {
    VR::from_str(vr.as_str()).unwrap_or(VR::UN)
}

fn object_to_record(obj: &InMemDicomObject) -> Record {
    obj.iter()
        .map(|elem| {
            let vr = to_vr(elem.vr());
            let value = match elem.value() {
                Value::Primitive(p) => primitive_to_value(p),
                Value::Sequence(seq) => {
                    FieldValue::Sequence(seq.items().iter().map(object_to_record).collect())
                }
                Value::PixelSequence(_) => FieldValue::Opaque(Vec::new()),
            };
            (to_tag(elem.tag()), Field::new(vr, value))
        })
        .collect()
}

fn integers<T: Copy + TryInto<i64>>(values: &[T], p: &PrimitiveValue) -> FieldValue {
    let converted: Option<Vec<i64>> = values.iter().map(|v| (*v).try_into().ok()).collect();
    match converted {
        Some(mut values) if values.len() == 1 => FieldValue::Integer(values.remove(0)),
        Some(values) => FieldValue::Integers(values),
        None => FieldValue::Opaque(p.to_bytes().into_owned()),
    }
}

fn floats<T: Copy + Into<f64>>(values: &[T]) -> FieldValue {
    let mut values: Vec<f64> = values.iter().map(|v| (*v).into()).collect();
    if values.len() == 1 {
        FieldValue::Float(values.remove(0))
    } else {
        FieldValue::Floats(values)
    }
}

fn primitive_to_value(p: &PrimitiveValue) -> FieldValue {
    match p {
        PrimitiveValue::Empty => FieldValue::Empty,
        PrimitiveValue::Str(s) => FieldValue::Text(s.clone()),
        PrimitiveValue::Strs(values) if values.len() == 1 => FieldValue::Text(values[0].clone()),
        PrimitiveValue::Strs(values) => FieldValue::MultiText(values.to_vec()),
        PrimitiveValue::Date(_) | PrimitiveValue::Time(_) | PrimitiveValue::DateTime(_) => {
            FieldValue::Text(p.to_str().into_owned())
        }
        PrimitiveValue::Tags(tags) => FieldValue::TagRef(tags.iter().map(|t| to_tag(*t)).collect()),
        PrimitiveValue::I16(values) => integers(values, p),
        PrimitiveValue::U16(values) => integers(values, p),
        PrimitiveValue::I32(values) => integers(values, p),
        PrimitiveValue::U32(values) => integers(values, p),
        PrimitiveValue::I64(values) => integers(values, p),
        PrimitiveValue::U64(values) => integers(values, p),
        PrimitiveValue::F32(values) => floats(values),
        PrimitiveValue::F64(values) => floats(values),
        PrimitiveValue::U8(bytes) => FieldValue::Opaque(bytes.to_vec()),
    }
}

fn narrow<T: TryFrom<i64>>(values: &[i64]) -> Result<Vec<T>, String> {
    values
        .iter()
        .map(|v| T::try_from(*v).map_err(|_| format!("value {} out of range for its representation", v)))
        .collect()
}

/// The primitive to store for a rewritable field, or `None` when the field
/// must be left as it is on disk.
fn value_to_primitive(field: &Field) -> Result<Option<PrimitiveValue>, String> {
    let ints: Vec<i64> = match &field.value {
        FieldValue::Text(s) => return Ok(Some(PrimitiveValue::Str(s.clone()))),
        FieldValue::MultiText(parts) => return Ok(Some(PrimitiveValue::Strs(parts.clone().into()))),
        FieldValue::Float(f) => return Ok(Some(float_primitive(field.vr, &[*f]))),
        FieldValue::Floats(values) => return Ok(Some(float_primitive(field.vr, values))),
        FieldValue::Integer(i) => vec![*i],
        FieldValue::Integers(values) => values.clone(),
        FieldValue::Sequence(_)
        | FieldValue::TagRef(_)
        | FieldValue::Opaque(_)
        | FieldValue::Empty => return Ok(None),
    };

    let primitive = match field.vr {
        Vr::US => PrimitiveValue::U16(narrow::<u16>(&ints)?.into()),
        Vr::SS => PrimitiveValue::I16(narrow::<i16>(&ints)?.into()),
        Vr::UL => PrimitiveValue::U32(narrow::<u32>(&ints)?.into()),
        Vr::SL => PrimitiveValue::I32(narrow::<i32>(&ints)?.into()),
        vr if vr.as_str() == "UV" => PrimitiveValue::U64(narrow::<u64>(&ints)?.into()),
        vr if vr.as_str() == "SV" => PrimitiveValue::I64(ints.into()),
        _ => PrimitiveValue::Str(
            ints.iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(VALUE_DELIMITER_STR),
        ),
    };
    Ok(Some(primitive))
}

fn float_primitive(vr: Vr, values: &[f64]) -> PrimitiveValue {
    match vr {
        Vr::FL => PrimitiveValue::F32(values.iter().map(|v| *v as f32).collect::<Vec<_>>().into()),
        Vr::FD => PrimitiveValue::F64(values.to_vec().into()),
        _ => PrimitiveValue::Str(
            values
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(VALUE_DELIMITER_STR),
        ),
    }
}

/// Brings `obj` in line with `record`. Returns whether anything changed.
fn patch_object(obj: &mut InMemDicomObject, record: &Record) -> Result<bool, String> {
    let mut changed = false;

    let stale: Vec<DicomTag> = obj
        .iter()
        .map(|elem| elem.tag())
        .filter(|tag| !record.has_field(to_tag(*tag)))
        .collect();
    for tag in stale {
        changed |= obj.remove_element(tag);
    }

    for (tag, field) in record {
        let dicom_tag = to_dicom_tag(*tag);
        if let FieldValue::Sequence(items) = &field.value {
            changed |= patch_sequence(obj, dicom_tag, items)?;
            continue;
        }
        // Compare in record form: `Str` and single-item `Strs` read the same.
        let unchanged = matches!(
            obj.element(dicom_tag).map(|e| e.value()),
            Ok(Value::Primitive(existing)) if primitive_to_value(existing) == field.value
        );
        if unchanged {
            continue;
        }
        if let Some(primitive) = value_to_primitive(field)? {
            obj.put(DataElement::new(dicom_tag, to_dicom_vr(field.vr), primitive));
            changed = true;
        }
    }
    Ok(changed)
}

fn patch_sequence(obj: &mut InMemDicomObject, tag: DicomTag, items: &[Record]) -> Result<bool, String> {
    let Ok(elem) = obj.element(tag) else {
        return Ok(false);
    };
    let Value::Sequence(seq) = elem.value() else {
        return Ok(false);
    };
    if seq.items().len() != items.len() {
        return Err(format!("sequence {} changed length", to_tag(tag)));
    }

    let mut patched: Vec<InMemDicomObject> = seq.items().to_vec();
    let mut changed = false;
    for (item, record) in patched.iter_mut().zip(items) {
        changed |= patch_object(item, record)?;
    }
    if changed {
        obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(patched)));
    }
    Ok(changed)
}
