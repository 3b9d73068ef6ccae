//! Thread naming: `<bug label> – <base title>`.

use super::status::Affordance;
use super::{THREAD_NAME_LIMIT, truncate_chars};
use regex::Regex;
use std::sync::LazyLock;

static BUG_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bug #(\d+)").expect("hardcoded bug number regex"));

static BASE_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"–\s*(.+)").expect("hardcoded base title regex"));

/// Name for a freshly created report thread.
pub fn initial_thread_name(title: &str) -> String {
    truncate_chars(title, THREAD_NAME_LIMIT).to_string()
}

/// Canonical name for an existing thread.
///
/// Keeps a `Bug #N` label when present (else `Bug`), takes the text after
/// the dash as the base title (else the whole name) and strips any status
/// glyph left in it.
pub fn canonical_thread_name(current: &str) -> String {
    let label = BUG_NUMBER_REGEX
        .find(current)
        .map(|found| found.as_str())
        .unwrap_or("Bug");

    let mut base = BASE_TITLE_REGEX
        .captures(current)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str())
        .unwrap_or(current)
        .to_string();

    for affordance in Affordance::DEFAULT_REACTIONS {
        base = base.replace(affordance.emoji(), "");
    }

    let name = format!("{label} – {}", base.trim());
    truncate_chars(&name, THREAD_NAME_LIMIT).to_string()
}

/// The rename to apply, or `None` when the name is already canonical.
pub fn rename_for(current: &str) -> Option<String> {
    let canonical = canonical_thread_name(current);
    (canonical != current).then_some(canonical)
}
