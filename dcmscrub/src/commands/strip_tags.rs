// dcmscrub/src/commands/strip_tags.rs
//! `dcmscrub strip-tags`: removes fixed attributes from every record.

use anyhow::{anyhow, Result};

use dcmscrub_core::pipeline::{strip_tags, DEFAULT_STRIP_TAGS};
use dcmscrub_core::{tags, Tag};

use crate::cli::{FormatArg, StripTagsCommand};
use crate::ui::output::{print_table, success_msg, summary_table};

/// Resolves a keyword such as `SeriesTime`, or a numeric tag in any of the
/// accepted spellings.
pub fn parse_tag(text: &str) -> Result<Tag> {
    let text = text.trim();
    if let Some(tag) = tags::resolve(text) {
        return Ok(tag);
    }
    text.parse::<Tag>()
        .map_err(|e| anyhow!("Unknown tag '{}': {}", text, e))
}

pub fn run_strip_tags(cmd: &StripTagsCommand, format: FormatArg) -> Result<()> {
    let serializer = format.record_format()?.serializer();
    let to_strip: Vec<Tag> = if cmd.tags.is_empty() {
        DEFAULT_STRIP_TAGS.to_vec()
    } else {
        cmd.tags.iter().map(|t| parse_tag(t)).collect::<Result<_>>()?
    };

    let summary = strip_tags(&cmd.root, &to_strip, serializer.as_ref())?;

    let mut table = summary_table(&["Tag", "Keyword"]);
    for tag in &to_strip {
        table.add_row(vec![
            tag.to_string(),
            tags::keyword(*tag).unwrap_or("").to_string(),
        ]);
    }
    print_table(&table);
    success_msg(format!(
        "Rewrote {} of {} files.",
        summary.files_changed, summary.files_processed
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_by_keyword_or_number() {
        assert_eq!(parse_tag("SeriesTime").unwrap(), tags::SERIES_TIME);
        assert_eq!(parse_tag("(0008,1250)").unwrap(), tags::RELATED_SERIES_SEQUENCE);
        assert_eq!(parse_tag("00080031").unwrap(), tags::SERIES_TIME);
        assert!(parse_tag("NotATag").is_err());
    }
}
