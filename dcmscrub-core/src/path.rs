// dcmscrub-core/src/path.rs
//! Location of a field inside a nested record, used to report where a
//! substitution warning occurred.
//!
//! Rendered with entries separated by a forward slash, e.g.
//! `00081110/[0]/00100020` for PatientID inside the first item of the
//! Referenced Study Sequence.

use serde::Serialize;
use std::fmt;

use crate::record::Tag;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldPath(Vec<FieldPathEntry>);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FieldPathEntry {
    Field(Tag),
    Item(usize),
}

impl FieldPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push_field(&mut self, tag: Tag) {
        self.0.push(FieldPathEntry::Field(tag));
    }

    pub fn push_item(&mut self, index: usize) {
        self.0.push(FieldPathEntry::Item(index));
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }

    pub fn entries(&self) -> &[FieldPathEntry] {
        &self.0
    }

    /// The tag of the innermost field on the path.
    pub fn final_field(&self) -> Option<Tag> {
        self.0.iter().rev().find_map(|entry| match entry {
            FieldPathEntry::Field(tag) => Some(*tag),
            FieldPathEntry::Item(_) => None,
        })
    }

    /// Number of sequence items traversed.
    pub fn depth(&self) -> usize {
        self.0
            .iter()
            .filter(|entry| matches!(entry, FieldPathEntry::Item(_)))
            .count()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match entry {
                FieldPathEntry::Field(tag) => f.write_str(&tag.to_hex())?,
                FieldPathEntry::Item(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nested_path() {
        let mut path = FieldPath::new();
        path.push_field(Tag::new(0x0008, 0x1110));
        path.push_item(0);
        path.push_field(Tag::new(0x0010, 0x0020));

        assert_eq!(path.to_string(), "00081110/[0]/00100020");
        assert_eq!(path.final_field(), Some(Tag::new(0x0010, 0x0020)));
        assert_eq!(path.depth(), 1);

        path.pop();
        path.pop();
        assert_eq!(path.to_string(), "00081110");
        assert_eq!(path.depth(), 0);
    }
}
