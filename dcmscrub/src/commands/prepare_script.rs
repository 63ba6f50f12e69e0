// dcmscrub/src/commands/prepare_script.rs
//! `dcmscrub prepare-script`: writes a fresh anonymizer script for one batch.

use anyhow::{Context, Result};
use log::info;

use dcmscrub_core::audit_log::{AuditEntry, AuditLog};
use dcmscrub_core::script::prepare_script_in_temp;
use dcmscrub_core::{prepare_script, ScriptOverrides};

use crate::cli::PrepareScriptCommand;
use crate::ui::output::{print_table, success_msg, summary_table};

pub fn run_prepare_script(cmd: &PrepareScriptCommand) -> Result<()> {
    let overrides = ScriptOverrides {
        patient_id: cmd.patient_id.clone(),
        date_offset: cmd.date_offset,
    };
    let injection = match &cmd.out_dir {
        Some(dir) => prepare_script(&cmd.template, dir, &overrides),
        None => prepare_script_in_temp(&cmd.template, &overrides),
    }
    .with_context(|| format!("Failed to prepare a script from {}", cmd.template.display()))?;

    if let (Some(log_path), Some(input_id)) = (&cmd.audit_log, &cmd.input_id) {
        let log = AuditLog::new(log_path);
        let entry = AuditEntry::for_subject(input_id.as_str(), &injection.patient_id, injection.date_offset);
        log.append(&entry)?;
        info!("Recorded {} -> {} in {}.", entry.input_id, entry.output_id, log.path().display());
    }

    let mut table = summary_table(&["Field", "Value"]);
    table.add_row(vec!["Script".to_string(), injection.path.display().to_string()]);
    table.add_row(vec!["PatientID".to_string(), injection.patient_id.clone()]);
    table.add_row(vec!["PatientName".to_string(), injection.patient_name.clone()]);
    table.add_row(vec!["SeriesInstanceUID".to_string(), injection.series_uid.clone()]);
    table.add_row(vec!["Date offset".to_string(), injection.date_offset.to_string()]);
    print_table(&table);

    success_msg(format!("Wrote {}", injection.path.display()));
    Ok(())
}
