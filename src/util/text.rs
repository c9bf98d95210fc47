use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Anything that looks like an HTML/XML tag.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is a valid regex"));

/// Appended to truncated summaries.
const ELLIPSIS: char = '…';

/// Reduces feed markup to a single line of display text.
///
/// Decodes HTML character references the way an HTML5 parser does (legacy
/// names without `;`, numeric references in the 0x80-0x9F range read as
/// Windows-1252), removes anything shaped like a tag, collapses whitespace
/// runs to one space and trims the ends. The information separators
/// U+001C to U+001F count as whitespace.
///
/// This is a best-effort plain-text reduction for readable output. It is not
/// an HTML sanitizer and the result must not be trusted as safe markup.
///
/// # Examples
///
/// ```
/// use feed2md::util::normalize_text;
///
/// assert_eq!(normalize_text("<p>Fish &amp;\n  chips</p>"), "Fish & chips");
/// ```
pub fn normalize_text(value: &str) -> String {
    let decoded = htmlize::unescape(value);
    let stripped = TAG_RE.replace_all(&decoded, "");
    stripped
        .split(is_separator)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Shortens `value` to at most `max_len` characters, ending in an ellipsis.
///
/// A `max_len` of 0 means no limit. Strings that already fit are returned
/// borrowed. Otherwise the first `max_len - 1` characters are kept, trailing
/// whitespace is trimmed and `…` is appended.
///
/// Length is counted in Unicode scalar values, not bytes or columns.
///
/// # Examples
///
/// ```
/// use feed2md::util::truncate_summary;
///
/// assert_eq!(truncate_summary("abcdefgh", 5), "abcd…");
/// assert_eq!(truncate_summary("abcdefgh", 0), "abcdefgh");
/// ```
pub fn truncate_summary(value: &str, max_len: usize) -> Cow<'_, str> {
    if max_len == 0 {
        return Cow::Borrowed(value);
    }

    // Byte offset of the char at index max_len - 1, if the string is longer than max_len
    let mut chars = value.char_indices();
    let cut = chars.nth(max_len - 1).map(|(idx, _)| idx);
    match (cut, chars.next()) {
        (Some(cut), Some(_)) => {
            let mut clipped = value[..cut].trim_end().to_owned();
            clipped.push(ELLIPSIS);
            Cow::Owned(clipped)
        }
        _ => Cow::Borrowed(value),
    }
}
