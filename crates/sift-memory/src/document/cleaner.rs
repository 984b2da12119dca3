use std::sync::LazyLock;

use regex::{Regex, RegexSet};

/// Lines that open a signature, closing phrase or quoted reply. Everything from the
/// first match onward is dropped.
static SIGNATURE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)^regards,$",
        r"(?i)^best,$",
        r"(?i)^thanks,$",
        r"(?i)^thank you,$",
        r"(?i)^cheers,$",
        r"(?i)^sent from my",
        r"(?i)^on .* wrote:",
        r"(?i)^from:",
        r"(?i)^to:",
        r"(?i)^subject:",
    ])
    .expect("signature regex set is valid")
});

static SEPARATOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*_]{3,}$").expect("separator regex is valid"));

static INLINE_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("inline spaces regex is valid"));

static RULE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_]{3,}").expect("rule run regex is valid"));

/// Normalize raw post text before chunking.
///
/// Cuts at the first signature or reply header, drops separator lines, collapses runs
/// of spaces and tabs, removes runs of three or more `-`/`_`, trims every line and
/// drops blank ones.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let body = text
        .lines()
        .take_while(|line| !SIGNATURE.is_match(line.trim()))
        .filter(|line| !SEPARATOR_LINE.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    let body = INLINE_SPACES.replace_all(&body, " ");
    let body = RULE_RUN.replace_all(&body, "");

    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
