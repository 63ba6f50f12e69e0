// dcmscrub/src/commands/scrub.rs
//! `dcmscrub scrub`: replaces leaked identifiers across a cohort.

use anyhow::Result;

use dcmscrub_core::pipeline::scrub_cohort;
use dcmscrub_core::{AuditLog, IssueLog};

use crate::cli::{FormatArg, ScrubCommand};
use crate::ui::output::{print_table, success_msg, summary_table, warn_msg};

pub fn run_scrub(cmd: &ScrubCommand, format: FormatArg) -> Result<()> {
    let serializer = format.record_format()?.serializer();
    let audit = AuditLog::new(&cmd.audit_log);
    let issue_log = match &cmd.issue_log {
        Some(path) => IssueLog::new(path),
        None => IssueLog::in_dir(&cmd.anonymized_root),
    };

    let cohort = scrub_cohort(
        &cmd.original_root,
        &cmd.anonymized_root,
        &audit,
        &issue_log,
        serializer.as_ref(),
    )?;

    let mut table = summary_table(&["Subject", "Output", "Pairs", "Files", "Changed", "Failed", "Warnings"]);
    for (entry, summary) in &cohort.subjects {
        table.add_row(vec![
            entry.input_id.clone(),
            entry.output_id.clone(),
            summary.pairs.to_string(),
            summary.files_processed.to_string(),
            summary.files_changed.to_string(),
            summary.failed.len().to_string(),
            summary.warnings.len().to_string(),
        ]);
    }
    print_table(&table);

    for (entry, summary) in &cohort.subjects {
        for warning in &summary.warnings {
            warn_msg(format!("{}: {}", entry.output_id, warning));
        }
        for failed in &summary.failed {
            warn_msg(format!("{}: skipped {}: {}", entry.output_id, failed.path.display(), failed.reason));
        }
        if !summary.issues.is_empty() {
            let issues: Vec<String> = summary.issues.iter().map(ToString::to_string).collect();
            warn_msg(format!(
                "{}: identifiers could not be derived ({}); logged to {}",
                entry.input_id,
                issues.join(", "),
                issue_log.path().display()
            ));
        }
    }
    for entry in &cohort.missing {
        warn_msg(format!("{}: no anonymized folder {}", entry.input_id, entry.output_id));
    }

    let total = cohort.total();
    success_msg(format!(
        "Scrubbed {} subjects: {} of {} files changed.",
        cohort.subjects.len(),
        total.files_changed,
        total.files_processed
    ));
    Ok(())
}
