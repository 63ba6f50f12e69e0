// dcmscrub-core/src/geometry.rs
//! Slice geometry: ordering the records of one series along their scan axis.
//!
//! The first record is the reference. Its scan axis is the cross product of
//! the row and column direction cosines in ImageOrientationPatient, and every
//! record is keyed by the projection of `position - reference_position` onto
//! that axis. The sort is stable, so records at equal distance keep their
//! input order.

use log::debug;

use crate::errors::ScrubError;
use crate::record::{Record, Tag};
use crate::tags;

type Vec3 = [f64; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Position and orientation of one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceGeometry {
    pub position: Vec3,
    pub row: Vec3,
    pub column: Vec3,
}

impl SliceGeometry {
    /// Reads the geometry of `record`, the `index`-th record of its series.
    pub fn from_record(record: &Record, index: usize) -> Result<Self, ScrubError> {
        let position = read_floats::<3>(
            record,
            index,
            tags::IMAGE_POSITION_PATIENT,
            "ImagePositionPatient",
        )?;
        let orientation = read_floats::<6>(
            record,
            index,
            tags::IMAGE_ORIENTATION_PATIENT,
            "ImageOrientationPatient",
        )?;
        Ok(Self {
            position,
            row: [orientation[0], orientation[1], orientation[2]],
            column: [orientation[3], orientation[4], orientation[5]],
        })
    }

    /// Normal of the slice plane.
    pub fn scan_axis(&self) -> Vec3 {
        cross(self.row, self.column)
    }
}

fn read_floats<const N: usize>(
    record: &Record,
    index: usize,
    tag: Tag,
    attribute: &'static str,
) -> Result<[f64; N], ScrubError> {
    let components = record
        .components(tag)
        .ok_or(ScrubError::MissingGeometry { index, attribute })?;
    let invalid = || ScrubError::InvalidGeometry {
        index,
        attribute,
        value: components.join("\\"),
    };
    if components.len() != N {
        return Err(invalid());
    }
    let mut out = [0.0; N];
    for (slot, component) in out.iter_mut().zip(&components) {
        let value: f64 = component.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        *slot = value;
    }
    Ok(out)
}

/// Projection of each record onto the scan axis of the first one.
pub fn slice_positions(records: &[&Record]) -> Result<Vec<f64>, ScrubError> {
    let geometries = records
        .iter()
        .enumerate()
        .map(|(index, record)| SliceGeometry::from_record(record, index))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(reference) = geometries.first() else {
        return Ok(Vec::new());
    };
    let axis = reference.scan_axis();
    Ok(geometries
        .iter()
        .map(|g| dot(sub(g.position, reference.position), axis))
        .collect())
}

/// Sorts arbitrary items by the slice position of the record each one
/// carries. Zero or one item is returned as is, without reading geometry.
pub fn sort_by_slice_position<T, F>(items: Vec<T>, record_of: F) -> Result<Vec<T>, ScrubError>
where
    F: Fn(&T) -> &Record,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let records: Vec<&Record> = items.iter().map(&record_of).collect();
    let positions = slice_positions(&records)?;

    let mut keyed: Vec<(f64, T)> = positions.into_iter().zip(items).collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    debug!(
        "Sorted {} slices, span {:.3} mm.",
        keyed.len(),
        keyed.last().map(|l| l.0).unwrap_or(0.0) - keyed.first().map(|f| f.0).unwrap_or(0.0)
    );
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Returns `records` in increasing order along the scan axis.
pub fn sort_slices(records: Vec<Record>) -> Result<Vec<Record>, ScrubError> {
    sort_by_slice_position(records, |r| r)
}
