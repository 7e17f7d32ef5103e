//! Optional SQL fragments.
//!
//! A chart query may contain fragments such as `[[ AND date >= :date_start ]]`.
//! A fragment is kept, without its brackets, when the first `:name`
//! placeholder inside it names an active filter with a non-empty value, and
//! dropped entirely otherwise. Only the presence of a filter shapes the query
//! text; the values themselves are bound by the database layer.

use crate::filters::ActiveFilters;

const OPEN: &[u8] = b"[[";
const CLOSE: u8 = b']';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fragment<'a> {
    /// The fragment including its surrounding brackets.
    pub(crate) text: &'a str,
    /// Name of the first placeholder inside the fragment, or `""`.
    pub(crate) param: &'a str,
}

impl<'a> Fragment<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            param: placeholder(text),
        }
    }

    pub(crate) fn is_kept(&self, active: &ActiveFilters) -> bool {
        active.get(self.param).is_some_and(|value| !value.is_empty())
    }

    pub(crate) fn replacement(&self, active: &ActiveFilters) -> &'a str {
        if self.is_kept(active) {
            self.text.trim_matches(|c| c == '[' || c == ']')
        } else {
            ""
        }
    }
}

/// Finds every `[[ ... ]]` fragment, left to right.
///
/// A fragment closes at the first `]`, which must be immediately followed by
/// another `]`. Anything else is left alone, so unbalanced brackets pass
/// through verbatim. Runs in linear time.
pub(crate) fn fragments(template: &str) -> Vec<Fragment<'_>> {
    let bytes = template.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(offset) = find(&bytes[pos..], OPEN) {
        let start = pos + offset;
        let Some(close) = bytes[start + OPEN.len()..].iter().position(|&b| b == CLOSE) else {
            break;
        };
        let close = start + OPEN.len() + close;
        if bytes.get(close + 1) == Some(&CLOSE) {
            found.push(Fragment::new(&template[start..close + 2]));
            pos = close + 2;
        } else {
            // Every `[[` before this lone `]` would stop at it as well.
            pos = close + 1;
        }
    }
    found
}

/// Rewrites `template` by keeping or dropping each optional fragment.
///
/// Replacement is textual: every occurrence of a fragment's text is replaced
/// at once, so byte-identical fragments always share the same outcome.
pub(crate) fn render_query(template: &str, active: &ActiveFilters) -> String {
    let decisions: Vec<(&str, &str)> = fragments(template)
        .into_iter()
        .map(|fragment| (fragment.text, fragment.replacement(active)))
        .collect();
    let mut query = template.to_string();
    for (text, replacement) in decisions {
        query = query.replace(text, replacement);
    }
    query
}

/// Returns the name of the first `:name` placeholder in `text`.
fn placeholder(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while let Some(offset) = bytes[pos..].iter().position(|&b| b == b':') {
        let start = pos + offset + 1;
        let len = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
        if len > 0 {
            return &text[start..start + len];
        }
        pos = start;
    }
    ""
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
