// dcmscrub/src/commands/sort_slices.rs
//! `dcmscrub sort-slices`: prints the files of one series along its scan axis.

use anyhow::{Context, Result};
use std::path::PathBuf;

use dcmscrub_core::geometry::slice_positions;
use dcmscrub_core::serializer::record_files_in;
use dcmscrub_core::{sort_by_slice_position, Record};

use crate::cli::{FormatArg, SortSlicesCommand};
use crate::ui::output::{print_table, summary_table, warn_msg};

pub fn run_sort_slices(cmd: &SortSlicesCommand, format: FormatArg) -> Result<()> {
    let serializer = format.record_format()?.serializer();
    let files = record_files_in(&cmd.dir, serializer.as_ref())?;
    if files.is_empty() {
        warn_msg(format!("No record files in {}.", cmd.dir.display()));
        return Ok(());
    }

    let mut slices: Vec<(PathBuf, Record)> = Vec::with_capacity(files.len());
    for path in files {
        let record = serializer.read(&path)?;
        slices.push((path, record));
    }
    let sorted = sort_by_slice_position(slices, |(_, record)| record)
        .with_context(|| format!("Cannot order the slices in {}", cmd.dir.display()))?;

    let records: Vec<&Record> = sorted.iter().map(|(_, record)| record).collect();
    // A single slice is sorted without reading geometry, so it may have none.
    let positions = slice_positions(&records).ok();

    let mut table = summary_table(&["#", "File", "Position"]);
    for (index, (path, _)) in sorted.iter().enumerate() {
        let position = positions
            .as_ref()
            .and_then(|p| p.get(index))
            .map(|p| format!("{:.3}", p))
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        table.add_row(vec![index.to_string(), name, position]);
    }
    print_table(&table);
    Ok(())
}
