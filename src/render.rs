//! Markdown rendering of a parsed feed.

use crate::config::{RenderConfig, Template};
use crate::feed::{FeedDocument, FeedEntry};
use crate::util::truncate_summary;

const EMPTY_FEED_LINE: &str = "No feed items found.";

/// Renders `document` as Markdown according to `config`.
///
/// At most `config.limit` entries are rendered (0 renders all), taken from
/// the start of the feed in document order. The output always ends in a
/// single newline.
pub fn render_markdown(document: &FeedDocument, config: &RenderConfig) -> String {
    let entries: Vec<&FeedEntry> = match config.limit {
        0 => document.entries.iter().collect(),
        limit => document.entries.iter().take(limit).collect(),
    };

    let mut lines = vec![format!("# {}", document.title), String::new()];

    if entries.is_empty() {
        lines.push(EMPTY_FEED_LINE.to_owned());
        lines.push(String::new());
        return finish_trimmed(&lines);
    }

    match config.template {
        Template::Short => render_short(&entries, lines),
        Template::Full => render_full(&entries, config, lines),
    }
}

/// One list line per entry. Summaries are never shown here.
fn render_short(entries: &[&FeedEntry], mut lines: Vec<String>) -> String {
    for entry in entries {
        let mut line = if entry.link.is_empty() {
            format!("- {}", entry.title)
        } else {
            format!("- [{}]({})", entry.title, entry.link)
        };
        if !entry.published.is_empty() {
            line.push_str(&format!(" ({})", entry.published));
        }
        lines.push(line);
    }

    // Terminating empty line: joined output ends in exactly one newline, untrimmed
    lines.push(String::new());
    lines.join("\n")
}

fn render_full(entries: &[&FeedEntry], config: &RenderConfig, mut lines: Vec<String>) -> String {
    for entry in entries {
        if entry.link.is_empty() {
            lines.push(format!("## {}", entry.title));
        } else {
            lines.push(format!("## [{}]({})", entry.title, entry.link));
        }
        if !entry.published.is_empty() {
            lines.push(format!("- Published: {}", entry.published));
        }

        let summary = truncate_summary(&entry.summary, config.summary_max_length);
        if config.include_summary && !summary.is_empty() {
            lines.push(String::new());
            lines.push(summary.into_owned());
        }
        lines.push(String::new());
    }

    finish_trimmed(&lines)
}

/// Joins lines, drops trailing whitespace and blank lines, ends with one newline.
fn finish_trimmed(lines: &[String]) -> String {
    let mut out = lines.join("\n").trim_end().to_owned();
    out.push('\n');
    out
}
