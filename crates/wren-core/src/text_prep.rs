//! Text preparation for capture and playback.
//!
//! Pure functions, no I/O. Utterances coming out of a capture device carry
//! interim/final joining artifacts; replies coming out of a chat service may
//! carry markdown that reads badly when spoken.

use regex::Regex;
use std::sync::LazyLock;

// Compiled regexes — allocated once, reused across calls.
static RE_FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static RE_INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").unwrap());
static RE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#{1,6}\s*").unwrap());
static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static RE_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[\s]*[-*]\s+").unwrap());
static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace runs and trim. Capture devices deliver partial and
/// final fragments that join with uneven spacing.
pub fn normalize_utterance(text: &str) -> String {
    RE_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Whether a trimmed utterance is worth dispatching at all.
/// Anything shorter than `min_chars` is treated as the device firing on
/// breath noise or a spurious empty session.
pub fn is_substantive(text: &str, min_chars: usize) -> bool {
    text.trim().chars().count() >= min_chars
}

/// Strip markdown formatting so a reply reads naturally when spoken.
pub fn clean_reply_for_speech(text: &str) -> String {
    let mut c = text.to_string();

    c = RE_FENCED_CODE.replace_all(&c, " ").into_owned();
    c = RE_INLINE_CODE.replace_all(&c, "").into_owned();
    c = RE_BOLD.replace_all(&c, "$1").into_owned();
    c = RE_ITALIC.replace_all(&c, "$1").into_owned();
    c = RE_HEADING.replace_all(&c, "").into_owned();
    c = RE_LINK.replace_all(&c, "$1").into_owned();
    // Bullets → ". " so list items come out as separate clauses
    c = RE_BULLET.replace_all(&c, ". ").into_owned();
    c = RE_WHITESPACE.replace_all(&c, " ").into_owned();

    c.trim().to_string()
}
