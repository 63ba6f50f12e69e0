// dcmscrub-core/src/record.rs
//! The in-memory record model shared by every component.
//!
//! A [`Record`] is an ordered map from [`Tag`] to [`Field`]. Each field carries
//! its value representation ([`Vr`]) and a [`FieldValue`], a closed tagged union
//! over the kinds of values the scrubber knows how to rewrite. Sequence fields
//! nest child records to arbitrary depth.
//!
//! License: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Separator between the components of a multi-valued string.
pub const VALUE_DELIMITER: char = '\\';
pub(crate) const VALUE_DELIMITER_STR: &str = "\\";

/// A data element tag: a (group, element) pair of 16-bit numbers.
///
/// Serialized as the 8-digit hexadecimal form used by anonymizer scripts,
/// e.g. `"00100020"` for PatientID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Hexadecimal form without punctuation, e.g. `00100020`.
    pub fn to_hex(&self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl FromStr for Tag {
    type Err = String;

    /// Accepts `00100020`, `(0010,0020)` and `0010,0020`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | ',' | ' '))
            .collect();
        if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a valid tag", s));
        }
        let group = u16::from_str_radix(&digits[..4], 16).map_err(|e| e.to_string())?;
        let element = u16::from_str_radix(&digits[4..], 16).map_err(|e| e.to_string())?;
        Ok(Tag::new(group, element))
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_hex()
    }
}

/// A two-letter value representation code such as `PN` or `SQ`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Vr([u8; 2]);

impl Vr {
    pub const AE: Vr = Vr(*b"AE");
    pub const AS: Vr = Vr(*b"AS");
    pub const AT: Vr = Vr(*b"AT");
    pub const CS: Vr = Vr(*b"CS");
    pub const DA: Vr = Vr(*b"DA");
    pub const DS: Vr = Vr(*b"DS");
    pub const DT: Vr = Vr(*b"DT");
    pub const FD: Vr = Vr(*b"FD");
    pub const FL: Vr = Vr(*b"FL");
    pub const IS: Vr = Vr(*b"IS");
    pub const LO: Vr = Vr(*b"LO");
    pub const LT: Vr = Vr(*b"LT");
    pub const OB: Vr = Vr(*b"OB");
    pub const OW: Vr = Vr(*b"OW");
    pub const PN: Vr = Vr(*b"PN");
    pub const SH: Vr = Vr(*b"SH");
    pub const SL: Vr = Vr(*b"SL");
    pub const SQ: Vr = Vr(*b"SQ");
    pub const SS: Vr = Vr(*b"SS");
    pub const ST: Vr = Vr(*b"ST");
    pub const TM: Vr = Vr(*b"TM");
    pub const UI: Vr = Vr(*b"UI");
    pub const UL: Vr = Vr(*b"UL");
    pub const UN: Vr = Vr(*b"UN");
    pub const US: Vr = Vr(*b"US");
    pub const UT: Vr = Vr(*b"UT");

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("UN")
    }
}

impl fmt::Debug for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [a, b] if a.is_ascii_uppercase() && b.is_ascii_uppercase() => Ok(Vr([*a, *b])),
            _ => Err(format!("'{}' is not a value representation", s)),
        }
    }
}

impl TryFrom<String> for Vr {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Vr> for String {
    fn from(vr: Vr) -> Self {
        vr.as_str().to_string()
    }
}

/// The value held by a [`Field`].
///
/// `TagRef`, `Opaque` and `Empty` are never rewritten by the substitution
/// engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// A single string. If it contains [`VALUE_DELIMITER`] it is treated as
    /// multi-valued.
    Text(String),
    /// A multi-valued string, one entry per component.
    MultiText(Vec<String>),
    Integer(i64),
    Float(f64),
    /// Multi-valued binary integers.
    Integers(Vec<i64>),
    /// Multi-valued binary floats.
    Floats(Vec<f64>),
    Sequence(Vec<Record>),
    /// A field whose value names other fields.
    TagRef(Vec<Tag>),
    /// Raw bytes or encapsulated data.
    Opaque(Vec<u8>),
    Empty,
}

impl FieldValue {
    /// String components of a textual or numeric value, in order.
    ///
    /// Returns `None` for sequences and opaque kinds.
    pub fn components(&self) -> Option<Vec<String>> {
        match self {
            FieldValue::Text(s) => Some(s.split(VALUE_DELIMITER).map(str::to_string).collect()),
            FieldValue::MultiText(values) => Some(values.clone()),
            FieldValue::Integer(i) => Some(vec![i.to_string()]),
            FieldValue::Float(f) => Some(vec![f.to_string()]),
            FieldValue::Integers(values) => Some(values.iter().map(i64::to_string).collect()),
            FieldValue::Floats(values) => Some(values.iter().map(f64::to_string).collect()),
            FieldValue::Sequence(_)
            | FieldValue::TagRef(_)
            | FieldValue::Opaque(_)
            | FieldValue::Empty => None,
        }
    }

    /// The value rendered as one string, multi-valued components joined with
    /// [`VALUE_DELIMITER`].
    pub fn to_text(&self) -> Option<String> {
        self.components().map(|parts| parts.join(VALUE_DELIMITER_STR))
    }

    /// Number of values held (the multiplicity).
    pub fn multiplicity(&self) -> usize {
        match self {
            FieldValue::Text(s) => s.split(VALUE_DELIMITER).count(),
            FieldValue::MultiText(values) => values.len(),
            FieldValue::Integer(_) | FieldValue::Float(_) => 1,
            FieldValue::Integers(values) => values.len(),
            FieldValue::Floats(values) => values.len(),
            FieldValue::Sequence(items) => items.len(),
            FieldValue::TagRef(tags) => tags.len(),
            FieldValue::Opaque(_) => 1,
            FieldValue::Empty => 0,
        }
    }
}

/// A single typed value within a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub vr: Vr,
    pub value: FieldValue,
}

impl Field {
    pub fn new(vr: Vr, value: FieldValue) -> Self {
        Self { vr, value }
    }

    pub fn text(vr: Vr, value: impl Into<String>) -> Self {
        Self::new(vr, FieldValue::Text(value.into()))
    }

    pub fn multi_text<S: Into<String>>(vr: Vr, values: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            vr,
            FieldValue::MultiText(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn integer(vr: Vr, value: i64) -> Self {
        Self::new(vr, FieldValue::Integer(value))
    }

    pub fn float(vr: Vr, value: f64) -> Self {
        Self::new(vr, FieldValue::Float(value))
    }

    pub fn sequence(items: Vec<Record>) -> Self {
        Self::new(Vr::SQ, FieldValue::Sequence(items))
    }

    pub fn tag_ref(tags: Vec<Tag>) -> Self {
        Self::new(Vr::AT, FieldValue::TagRef(tags))
    }
}

/// One hierarchical metadata document, e.g. the header of one image file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<Tag, Field>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a field, returning the previous one.
    pub fn insert(&mut self, tag: Tag, field: Field) -> Option<Field> {
        self.fields.insert(tag, field)
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, tag: Tag, field: Field) -> Self {
        self.fields.insert(tag, field);
        self
    }

    pub fn has_field(&self, tag: Tag) -> bool {
        self.fields.contains_key(&tag)
    }

    pub fn get_field(&self, tag: Tag) -> Option<&Field> {
        self.fields.get(&tag)
    }

    pub fn get_field_mut(&mut self, tag: Tag) -> Option<&mut Field> {
        self.fields.get_mut(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Field> {
        self.fields.remove(&tag)
    }

    /// The field's value as a single delimiter-joined string, if it has a
    /// textual or numeric form.
    pub fn text(&self, tag: Tag) -> Option<String> {
        self.get_field(tag).and_then(|f| f.value.to_text())
    }

    /// The field's individual value components.
    pub fn components(&self, tag: Tag) -> Option<Vec<String>> {
        self.get_field(tag).and_then(|f| f.value.components())
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Tag, Field> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, Tag, Field> {
        self.fields.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a Tag, &'a Field);
    type IntoIter = btree_map::Iter<'a, Tag, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl FromIterator<(Tag, Field)> for Record {
    fn from_iter<I: IntoIterator<Item = (Tag, Field)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
