// dcmscrub/src/commands/purge.rs
//! `dcmscrub purge`: deletes files the classifier flags as identifiable.

use anyhow::Result;

use dcmscrub_core::pipeline::purge_identifiable;
use dcmscrub_core::{Classifier, ClassifierConfig, ClassifierFlags};

use crate::cli::{FormatArg, PurgeCommand};
use crate::ui::output::{info_msg, print_table, success_msg, summary_table, warn_msg};

/// The active rule set: the built-in rules or `--rules`, with the opt-in
/// rules selected by the flags and `--enable`, minus `--disable`.
pub fn build_config(cmd: &PurgeCommand) -> Result<ClassifierConfig> {
    let mut config = match &cmd.rules {
        Some(path) => ClassifierConfig::load_from_file(path)?,
        None => ClassifierConfig::load_default_rules()?,
    };
    let flags = ClassifierFlags {
        delete_t1w: cmd.delete_t1w,
        delete_t2w: cmd.delete_t2w,
    };
    let mut enable = flags.enabled_rules();
    enable.extend(cmd.enable.iter().cloned());
    config.set_active_rules(&enable, &cmd.disable);
    Ok(config)
}

pub fn run_purge(cmd: &PurgeCommand, format: FormatArg) -> Result<()> {
    let serializer = format.record_format()?.serializer();
    let config = build_config(cmd)?;
    info_msg(format!("Active rules: {}", config.rule_names().join(", ")));
    let classifier = Classifier::new(&config)?;

    let report = purge_identifiable(&cmd.root, cmd.folder_depth, &classifier, serializer.as_ref())?;
    if report.files_scanned == 0 {
        warn_msg(format!(
            "No files found {} folders below {}.",
            cmd.folder_depth,
            cmd.root.display()
        ));
        return Ok(());
    }

    if !report.deleted.is_empty() {
        let mut table = summary_table(&["File", "Rule"]);
        for (path, rule) in &report.deleted {
            table.add_row(vec![path.display().to_string(), rule.clone()]);
        }
        print_table(&table);

        let mut table = summary_table(&["Series", "Deleted"]);
        for (series, count) in &report.per_series {
            table.add_row(vec![series.display().to_string(), count.to_string()]);
        }
        print_table(&table);
    }
    for path in &report.failed {
        warn_msg(format!("Could not classify {}", path.display()));
    }

    success_msg(format!(
        "Deleted {} of {} files.",
        report.deleted.len(),
        report.files_scanned
    ));
    Ok(())
}
