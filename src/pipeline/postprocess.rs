//! Post-processing: deterministic cleanup of model output before typesetting.
//!
//! Models wrap pages in code fences, emit CRLF, and sprinkle byte-order marks
//! and zero-width spaces into Arabic text. These rules undo that without
//! touching content. Each rule is a pure `&str → String` pass.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the fence rules see `\n` only;
//! invisible characters go before whitespace trimming so a trailing BOM does
//! not protect trailing spaces.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a page of model output.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip code fences (whole-page fence, or inner ```` ```lang ```` blocks)
/// 3. Strip invisible Unicode (BOM, zero-width space, word joiner)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Trim leading/trailing blank lines
pub fn clean_page(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip code fences ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n?(.*?)\n?```$").unwrap());

static RE_INNER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\n(.*?)```").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCE.captures(trimmed) {
        if !caps[1].contains("```") {
            return caps[1].to_string();
        }
    }
    RE_INNER_FENCE
        .replace_all(input, "$1")
        .replace("```", "")
}

// ── Rule 3: Strip invisible Unicode ──────────────────────────────────────────

/// Zero-width space, word joiner, BOM, soft hyphen.
///
/// ZWJ/ZWNJ are kept: they change Arabic letter joining.
const INVISIBLE: [char; 4] = ['\u{200B}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}
