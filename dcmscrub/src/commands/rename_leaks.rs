// dcmscrub/src/commands/rename_leaks.rs
//! `dcmscrub rename-leaks`: repairs file names that still carry a patient
//! identifier.

use anyhow::Result;
use std::path::Path;

use dcmscrub_core::pipeline::{patient_identifiers, rename_leaking_files};

use crate::cli::{FormatArg, RenameLeaksCommand};
use crate::ui::output::{info_msg, print_table, success_msg, summary_table};

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn run_rename_leaks(cmd: &RenameLeaksCommand, format: FormatArg) -> Result<()> {
    let serializer = format.record_format()?.serializer();
    let identifiers = patient_identifiers(&cmd.input_dir, serializer.as_ref())?;
    if identifiers.is_empty() {
        info_msg(format!("No patient names found under {}.", cmd.input_dir.display()));
        return Ok(());
    }

    let renamed = rename_leaking_files(&cmd.output_dir, &identifiers, &cmd.replacement, serializer.as_ref())?;
    if renamed.is_empty() {
        success_msg(format!("No file name under {} leaks an identifier.", cmd.output_dir.display()));
        return Ok(());
    }

    let mut table = summary_table(&["#", "From", "To"]);
    for file in &renamed {
        table.add_row(vec![file.ordinal.to_string(), file_name(&file.from), file_name(&file.to)]);
    }
    print_table(&table);
    success_msg(format!("Renamed {} files.", renamed.len()));
    Ok(())
}
