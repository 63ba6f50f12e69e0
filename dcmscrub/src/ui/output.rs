// dcmscrub/src/ui/output.rs
//! Status messages on stderr and the summary tables printed after each pass.
//!
//! Colour is applied only when the target stream is a terminal, so piped or
//! captured output stays plain text.
//!
//! License: MIT OR Apache-2.0

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, Table};
use is_terminal::IsTerminal;
use owo_colors::{AnsiColors, OwoColorize};
use std::io::{self, Write};

/// The kind of a status line, which picks its prefix and colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warn,
    Error,
}

impl Tone {
    fn prefix(self) -> &'static str {
        match self {
            Tone::Info => "[INFO]",
            Tone::Success => "[OK]",
            Tone::Warn => "[WARN]",
            Tone::Error => "[ERROR]",
        }
    }

    fn color(self) -> AnsiColors {
        match self {
            Tone::Info => AnsiColors::Cyan,
            Tone::Success => AnsiColors::Green,
            Tone::Warn => AnsiColors::Yellow,
            Tone::Error => AnsiColors::BrightRed,
        }
    }
}

/// Writes one `[PREFIX] message` line, coloured when `enable_colors` is set.
pub fn print_message<W: Write>(
    writer: &mut W,
    tone: Tone,
    message: &str,
    enable_colors: bool,
) -> io::Result<()> {
    if enable_colors {
        writeln!(writer, "{} {}", tone.prefix().color(tone.color()).bold(), message)
    } else {
        writeln!(writer, "{} {}", tone.prefix(), message)
    }
}

fn to_stderr(tone: Tone, message: &str) {
    let colors = io::stderr().is_terminal();
    let _ = print_message(&mut io::stderr(), tone, message, colors);
}

pub fn info_msg(message: impl AsRef<str>) {
    to_stderr(Tone::Info, message.as_ref());
}

pub fn success_msg(message: impl AsRef<str>) {
    to_stderr(Tone::Success, message.as_ref());
}

pub fn warn_msg(message: impl AsRef<str>) {
    to_stderr(Tone::Warn, message.as_ref());
}

pub fn error_msg(message: impl AsRef<str>) {
    to_stderr(Tone::Error, message.as_ref());
}

/// A table with a bold header row. Every column after the first is
/// right-aligned, since the summaries put counts there.
pub fn summary_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(
        header
            .iter()
            .map(|text| Cell::new(text).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    for index in 1..header.len() {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}

/// Prints `table` to stdout.
pub fn print_table(table: &Table) {
    println!("{table}");
}
