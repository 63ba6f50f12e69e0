// dcmscrub-core/src/script.rs
//! Per-batch mutation of the external anonymizer's script template.
//!
//! The template is never modified. Each call writes a fresh copy named
//! `anonymizer_<8 digits>.script` into the output directory, with:
//!
//! * the `DATEINC` parameter on line index 1 rewritten with the date offset,
//! * `PatientID`, `PatientName` and `SeriesInstanceUID` element lines
//!   overwritten when present, otherwise inserted before `</script>`,
//! * a `UIDROOT` parameter line inserted when the template has none.
//!
//! Line index 1 must hold `DATEINC`; anything else is a malformed template.
//!
//! License: MIT OR Apache-2.0

use log::{debug, info};
use rand::Rng;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::ScrubError;
use crate::record::Tag;
use crate::redaction::loggable;
use crate::tags;
use crate::validators::{is_valid_uid_root, uid_prefix, UID_MAX_LENGTH};

/// Inclusive bounds of the random date offset, in days.
pub const DATE_OFFSET_MIN: i32 = -30;
pub const DATE_OFFSET_MAX: i32 = 30;

/// UID root used when the template does not declare one.
pub const DEFAULT_UID_ROOT: &str = "1.2.826.0.1.3680043.8.498";

const DATE_OFFSET_LINE: usize = 1;
const DATE_OFFSET_MARKER: &str = "DATEINC";
const UID_ROOT_MARKER: &str = "t=\"UIDROOT\"";
const CLOSING_MARKER: &str = "</script>";

const PATIENT_ID_DIGITS: usize = 11;
const PATIENT_NAME_DIGITS: usize = 7;

/// Caller-supplied values; anything left `None` is generated.
#[derive(Debug, Clone, Default)]
pub struct ScriptOverrides {
    pub patient_id: Option<String>,
    pub date_offset: Option<i32>,
}

/// What was injected into a script copy, for correlation with the
/// anonymizer's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptInjection {
    pub patient_id: String,
    pub patient_name: String,
    pub series_uid: String,
    pub date_offset: i32,
    pub path: PathBuf,
}

/// The values written by [`mutate_script`].
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedValues {
    pub patient_id: String,
    pub patient_name: String,
    pub series_uid: String,
    pub date_offset: i32,
}

/// A leading slice of the decimal form of a random 128-bit UUID.
fn random_digits(count: usize) -> String {
    let digits = Uuid::new_v4().as_u128().to_string();
    digits.chars().take(count).collect()
}

/// A UID under `prefix`: the prefix followed by the decimal form of a random
/// UUID, truncated by modulus so the whole UID fits in 64 characters.
pub fn generate_uid(prefix: &str) -> String {
    let value = Uuid::new_v4().as_u128();
    let room = UID_MAX_LENGTH.saturating_sub(prefix.len()) as u32;
    let suffix = match 10u128.checked_pow(room) {
        Some(modulus) => value % modulus,
        None => value,
    };
    format!("{}{}", prefix, suffix)
}

fn element_line(tag: Tag, keyword: &str, value: &str) -> String {
    format!("<e en=\"T\" t=\"{}\" n=\"{}\">{}</e>\n", tag.to_hex(), keyword, value)
}

/// Text between the first `>` and the following `<` of a line.
fn line_value(line: &str) -> Option<&str> {
    let start = line.find('>')? + 1;
    let end = start + line[start..].find('<')?;
    Some(line[start..end].trim())
}

struct ScriptLines<'a> {
    lines: Vec<String>,
    path: &'a Path,
}

impl<'a> ScriptLines<'a> {
    fn parse(text: &str, path: &'a Path) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
            path,
        }
    }

    fn closing_index(&self) -> Result<usize, ScrubError> {
        self.lines
            .iter()
            .position(|l| l.contains(CLOSING_MARKER))
            .ok_or_else(|| ScrubError::MalformedScript {
                path: self.path.to_path_buf(),
                line: self.lines.len(),
                expected: CLOSING_MARKER.to_string(),
            })
    }

    /// Overwrites the line containing `marker`, or inserts `line` before the
    /// closing marker.
    fn upsert(&mut self, marker: &str, line: String) -> Result<(), ScrubError> {
        match self.lines.iter().position(|l| l.contains(marker)) {
            Some(index) => self.lines[index] = line,
            None => {
                let index = self.closing_index()?;
                self.lines.insert(index, line);
            }
        }
        Ok(())
    }

    fn upsert_element(&mut self, tag: Tag, keyword: &str, value: &str) -> Result<(), ScrubError> {
        self.upsert(&format!("n=\"{}\"", keyword), element_line(tag, keyword, value))
    }

    fn into_text(self) -> String {
        self.lines.concat()
    }
}

/// Applies the mutation to the text of a template. `path` is only used in
/// error messages.
pub fn mutate_script(
    template: &str,
    path: &Path,
    overrides: &ScriptOverrides,
) -> Result<(String, InjectedValues), ScrubError> {
    let mut script = ScriptLines::parse(template, path);

    let has_marker = script
        .lines
        .get(DATE_OFFSET_LINE)
        .is_some_and(|l| l.contains(DATE_OFFSET_MARKER));
    if !has_marker {
        return Err(ScrubError::MalformedScript {
            path: path.to_path_buf(),
            line: DATE_OFFSET_LINE,
            expected: DATE_OFFSET_MARKER.to_string(),
        });
    }

    let date_offset = overrides
        .date_offset
        .unwrap_or_else(|| rand::rng().random_range(DATE_OFFSET_MIN..=DATE_OFFSET_MAX));
    script.lines[DATE_OFFSET_LINE] = format!(" <p t=\"{}\">{}</p>\n", DATE_OFFSET_MARKER, date_offset);

    let patient_id = overrides
        .patient_id
        .clone()
        .unwrap_or_else(|| random_digits(PATIENT_ID_DIGITS));
    script.upsert_element(tags::PATIENT_ID, "PatientID", &patient_id)?;

    let patient_name = random_digits(PATIENT_NAME_DIGITS);
    script.upsert_element(tags::PATIENT_NAME, "PatientName", &patient_name)?;

    let declared_root = script
        .lines
        .iter()
        .find(|l| l.contains(UID_ROOT_MARKER))
        .and_then(|l| line_value(l))
        .map(str::to_string);
    let root = match declared_root {
        Some(root) => root,
        None => {
            debug!("No UIDROOT in template; inserting {}.", DEFAULT_UID_ROOT);
            script.upsert(UID_ROOT_MARKER, format!("<p t=\"UIDROOT\">{}</p>\n", DEFAULT_UID_ROOT))?;
            DEFAULT_UID_ROOT.to_string()
        }
    };
    if !is_valid_uid_root(&root) {
        return Err(ScrubError::InvalidUidRoot(root));
    }
    let series_uid = generate_uid(&uid_prefix(&root));
    script.upsert_element(tags::SERIES_INSTANCE_UID, "SeriesInstanceUID", &series_uid)?;

    Ok((
        script.into_text(),
        InjectedValues {
            patient_id,
            patient_name,
            series_uid,
            date_offset,
        },
    ))
}

/// Creates `anonymizer_<8 digits>.script` in `out_dir` with `create_new`, so
/// concurrent callers sharing the folder never get the same file.
fn create_script_file(
    out_dir: &Path,
    mut next_number: impl FnMut() -> u32,
) -> Result<(PathBuf, fs::File), ScrubError> {
    loop {
        let candidate = out_dir.join(format!("anonymizer_{}.script", next_number()));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} is taken; drawing another name.", candidate.display());
            }
            Err(e) => return Err(ScrubError::write(&candidate, e)),
        }
    }
}

fn random_script_number() -> u32 {
    rand::rng().random_range(10_000_000..=99_999_999)
}

/// Writes a mutated copy of `template` into `out_dir` and reports what was
/// injected. The template file is only read.
pub fn prepare_script(
    template: &Path,
    out_dir: &Path,
    overrides: &ScriptOverrides,
) -> Result<ScriptInjection, ScrubError> {
    let text = fs::read_to_string(template).map_err(|e| ScrubError::read(template, e))?;
    let (mutated, values) = mutate_script(&text, template, overrides)?;

    fs::create_dir_all(out_dir)?;
    let (path, mut file) = create_script_file(out_dir, random_script_number)?;
    file.write_all(mutated.as_bytes())
        .map_err(|e| ScrubError::write(&path, e))?;

    info!(
        "Prepared {} (PatientID {}, date offset {}).",
        path.display(),
        loggable(&values.patient_id),
        values.date_offset
    );
    Ok(ScriptInjection {
        patient_id: values.patient_id,
        patient_name: values.patient_name,
        series_uid: values.series_uid,
        date_offset: values.date_offset,
        path,
    })
}

/// [`prepare_script`] into the system temporary directory.
pub fn prepare_script_in_temp(
    template: &Path,
    overrides: &ScriptOverrides,
) -> Result<ScriptInjection, ScrubError> {
    prepare_script(template, &std::env::temp_dir(), overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "<script>\n <p t=\"DATEINC\">-26</p>\n</script>\n";

    #[test]
    fn test_script_file_never_reuses_a_taken_name() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("anonymizer_11111111.script");
        fs::write(&taken, "someone else's script").unwrap();

        let mut numbers = [11_111_111, 22_222_222].into_iter();
        let (path, _) = create_script_file(dir.path(), || numbers.next().unwrap()).unwrap();
        assert_eq!(path, dir.path().join("anonymizer_22222222.script"));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "someone else's script");
    }

    fn mutate(template: &str, overrides: &ScriptOverrides) -> (Vec<String>, InjectedValues) {
        let (text, values) = mutate_script(template, Path::new("template.script"), overrides).unwrap();
        (text.lines().map(str::to_string).collect(), values)
    }

    #[test]
    fn test_minimal_template_gets_fields_inserted_before_closing_marker() {
        let (lines, values) = mutate(MINIMAL, &ScriptOverrides::default());

        assert_eq!(lines[0], "<script>");
        assert!((DATE_OFFSET_MIN..=DATE_OFFSET_MAX).contains(&values.date_offset));
        assert_eq!(lines[1], format!(" <p t=\"DATEINC\">{}</p>", values.date_offset));
        assert_eq!(
            lines[2],
            format!("<e en=\"T\" t=\"00100020\" n=\"PatientID\">{}</e>", values.patient_id)
        );
        assert_eq!(
            lines[3],
            format!("<e en=\"T\" t=\"00100010\" n=\"PatientName\">{}</e>", values.patient_name)
        );
        assert_eq!(lines[4], format!("<p t=\"UIDROOT\">{}</p>", DEFAULT_UID_ROOT));
        assert!(lines[5].contains("n=\"SeriesInstanceUID\""));
        assert_eq!(lines.last().map(String::as_str), Some("</script>"));

        assert_eq!(values.patient_id.len(), PATIENT_ID_DIGITS);
        assert!(values.patient_id.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(values.patient_name.len(), PATIENT_NAME_DIGITS);
        assert!(values.series_uid.starts_with("1.2.826.0.1.3680043.8.498."));
        assert!(values.series_uid.len() <= UID_MAX_LENGTH);
    }

    #[test]
    fn test_existing_lines_are_overwritten_and_overrides_win() {
        let template = "<script>\n\
             <p t=\"DATEINC\">0</p>\n\
             <p t=\"UIDROOT\">1.2.840.99</p>\n\
             <e en=\"T\" t=\"00100020\" n=\"PatientID\">@keep()</e>\n\
             </script>\n";
        let overrides = ScriptOverrides {
            patient_id: Some("SUBJ001".to_string()),
            date_offset: Some(-7),
        };
        let (lines, values) = mutate(template, &overrides);

        assert_eq!(values.date_offset, -7);
        assert_eq!(values.patient_id, "SUBJ001");
        assert_eq!(lines[1], " <p t=\"DATEINC\">-7</p>");
        assert_eq!(lines[2], "<p t=\"UIDROOT\">1.2.840.99</p>");
        assert_eq!(
            lines[3],
            "<e en=\"T\" t=\"00100020\" n=\"PatientID\">SUBJ001</e>"
        );
        assert_eq!(lines.iter().filter(|l| l.contains("n=\"PatientID\"")).count(), 1);
        assert!(values.series_uid.starts_with("1.2.840.99."));
    }

    #[test]
    fn test_missing_date_marker_is_malformed() {
        let err = mutate_script(
            "<script>\n<p t=\"OTHER\">1</p>\n</script>\n",
            Path::new("bad.script"),
            &ScriptOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScrubError::MalformedScript { line: 1, .. }));
    }

    #[test]
    fn test_invalid_uid_root_is_rejected() {
        let template = "<script>\n<p t=\"DATEINC\">0</p>\n<p t=\"UIDROOT\">abc</p>\n</script>\n";
        let err = mutate_script(template, Path::new("t"), &ScriptOverrides::default()).unwrap_err();
        assert!(matches!(err, ScrubError::InvalidUidRoot(root) if root == "abc"));
    }

    #[test]
    fn test_generate_uid_fits_in_64_characters() {
        for prefix in ["1.2.", "1.2.826.0.1.3680043.8.498.", "1.2.3.4.5.6.7.8.9.10.11.12.13.14."] {
            let uid = generate_uid(prefix);
            assert!(uid.starts_with(prefix));
            assert!(uid.len() <= UID_MAX_LENGTH, "{}", uid);
            assert!(uid[prefix.len()..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_template_file_is_never_modified() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.script");
        fs::write(&template, MINIMAL).unwrap();
        let out = dir.path().join("out");

        let first = prepare_script(&template, &out, &ScriptOverrides::default()).unwrap();
        let second = prepare_script(&template, &out, &ScriptOverrides::default()).unwrap();

        assert_eq!(fs::read_to_string(&template).unwrap(), MINIMAL);
        assert_ne!(first.path, second.path);
        let name = first.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("anonymizer_") && name.ends_with(".script"));
        assert_eq!(name.len(), "anonymizer_".len() + 8 + ".script".len());
        let written = fs::read_to_string(&first.path).unwrap();
        assert!(written.contains(&first.series_uid));
    }
}
