// dcmscrub/src/cli.rs
//! Command-line interface of `dcmscrub`: global flags and one subcommand per
//! post-processing pass.
//! License: MIT OR Apache-2.0

use clap::{Args, Parser, Subcommand, ValueEnum};
use dcmscrub_core::validators::is_all_digits;
use dcmscrub_core::RecordFormat;
use std::path::PathBuf;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "dcmscrub",
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "Scrub residual identifiers from anonymized DICOM cohorts",
    long_about = "dcmscrub runs around an external DICOM anonymizer. It prepares the anonymizer's per-batch script, then cleans up what the anonymizer leaves behind: identifiers that survived in nested fields, files that are identifiable by their content, file names that carry patient identifiers, and tags that must always go.",
    arg_required_else_help = true,
)]
pub struct Cli {
    #[arg(long, short = 'q', help = "Suppress all informational and debug messages.")]
    pub quiet: bool,

    #[arg(long, short = 'd', help = "Enable debug logging.")]
    pub debug: bool,

    #[arg(long = "disable-debug", help = "Disable debug logging, overriding RUST_LOG.")]
    pub disable_debug: bool,

    /// On-disk record format.
    #[arg(
        long,
        value_enum,
        global = true,
        default_value_t = FormatArg::default(),
        help = "Format of the record files to read and write."
    )]
    pub format: FormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Write a fresh anonymizer script with a new PatientID, PatientName, series UID and date offset.")]
    PrepareScript(PrepareScriptCommand),

    #[command(about = "Replace leaked identifiers in every anonymized subject listed in an audit log.")]
    Scrub(ScrubCommand),

    #[command(about = "Delete files that are identifiable from their content (reports, screenshots, scouts).")]
    Purge(PurgeCommand),

    #[command(about = "Print the files of one series in slice order.")]
    SortSlices(SortSlicesCommand),

    #[command(about = "Rename files whose names carry a patient identifier.")]
    RenameLeaks(RenameLeaksCommand),

    #[command(about = "Remove a fixed set of tags from every record under a folder.")]
    StripTags(StripTagsCommand),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// DICOM Part 10 files (`.dcm`).
    #[default]
    Dicom,
    /// JSON record files (`.json`).
    Json,
}

impl FormatArg {
    /// The core record format, or an error when the binary was built without
    /// DICOM support.
    pub fn record_format(self) -> anyhow::Result<RecordFormat> {
        match self {
            FormatArg::Json => Ok(RecordFormat::Json),
            #[cfg(feature = "dicom")]
            FormatArg::Dicom => Ok(RecordFormat::Dicom),
            #[cfg(not(feature = "dicom"))]
            FormatArg::Dicom => anyhow::bail!(
                "This build of dcmscrub has no DICOM support; use --format json."
            ),
        }
    }
}

fn parse_patient_id(value: &str) -> Result<String, String> {
    if is_all_digits(value) {
        Ok(value.to_string())
    } else {
        Err(format!("'{}' is not made of digits only", value))
    }
}

#[derive(Args, Debug)]
pub struct PrepareScriptCommand {
    #[arg(value_name = "TEMPLATE", help = "Anonymizer script template. It is only read.")]
    pub template: PathBuf,

    #[arg(
        long,
        short = 'o',
        value_name = "DIR",
        help = "Directory for the new script. Defaults to the system temporary directory."
    )]
    pub out_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "ID",
        value_parser = parse_patient_id,
        help = "Use this PatientID instead of a generated one. Must be digits only."
    )]
    pub patient_id: Option<String>,

    #[arg(
        long,
        value_name = "DAYS",
        allow_negative_numbers = true,
        help = "Use this date offset (days) instead of a random one in [-30, 30]."
    )]
    pub date_offset: Option<i32>,

    #[arg(
        long,
        value_name = "FILE",
        requires = "input_id",
        help = "Append the input/output pairing to this audit log."
    )]
    pub audit_log: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Name of the input folder this script is for.")]
    pub input_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct ScrubCommand {
    #[arg(value_name = "ORIGINAL_ROOT", help = "Folder holding one subfolder per original subject.")]
    pub original_root: PathBuf,

    #[arg(value_name = "ANONYMIZED_ROOT", help = "Folder holding one sub-<id> folder per anonymized subject.")]
    pub anonymized_root: PathBuf,

    #[arg(long, value_name = "FILE", help = "Audit log pairing input folders with output subjects.")]
    pub audit_log: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "Where to log subjects whose identifiers could not be derived. Defaults to all_file_issues.txt in ANONYMIZED_ROOT."
    )]
    pub issue_log: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PurgeCommand {
    #[arg(value_name = "ROOT", help = "Folder to search.")]
    pub root: PathBuf,

    #[arg(
        long,
        value_name = "N",
        default_value_t = 3,
        help = "How many folders deep below ROOT the record files sit."
    )]
    pub folder_depth: usize,

    #[arg(long = "delete-t1w", help = "Also delete T1-weighted volumes a face can be reconstructed from.")]
    pub delete_t1w: bool,

    #[arg(long = "delete-t2w", help = "Also delete T2-weighted inversion-recovery volumes.")]
    pub delete_t2w: bool,

    #[arg(long, value_name = "FILE", help = "Load classification rules from this YAML file instead of the built-in set.")]
    pub rules: Option<PathBuf>,

    #[arg(long, value_delimiter = ',', value_name = "RULES", help = "Comma-separated opt-in rules to enable.")]
    pub enable: Vec<String>,

    #[arg(long, value_delimiter = ',', value_name = "RULES", help = "Comma-separated rules to disable.")]
    pub disable: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SortSlicesCommand {
    #[arg(value_name = "DIR", help = "Folder holding the files of one series.")]
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct RenameLeaksCommand {
    #[arg(value_name = "INPUT_DIR", help = "Original files the patient identifiers are read from.")]
    pub input_dir: PathBuf,

    #[arg(value_name = "OUTPUT_DIR", help = "Anonymized series whose file names are checked.")]
    pub output_dir: PathBuf,

    #[arg(value_name = "REPLACEMENT", help = "Text that replaces an identifier in a file name.")]
    pub replacement: String,
}

#[derive(Args, Debug)]
pub struct StripTagsCommand {
    #[arg(value_name = "ROOT", help = "Folder whose records are rewritten.")]
    pub root: PathBuf,

    #[arg(
        long = "tag",
        value_delimiter = ',',
        value_name = "TAGS",
        help = "Tags to remove, as keywords or (gggg,eeee). Defaults to RelatedSeriesSequence and SeriesTime."
    )]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_id_must_be_digits() {
        assert_eq!(parse_patient_id("12345678901"), Ok("12345678901".to_string()));
        assert!(parse_patient_id("12AB").is_err());
        assert!(parse_patient_id("").is_err());

        let cli = Cli::try_parse_from(["dcmscrub", "prepare-script", "t.script", "--patient-id", "DOE1"]);
        assert!(cli.is_err());
    }
}
