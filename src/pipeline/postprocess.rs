//! Post-processing: deterministic cleanup of raw OCR text.
//!
//! Both engines leave artefacts that confuse field segmentation:
//!
//! - tesseract emits form feeds between pages, `\r\n` on Windows builds and
//!   hyphenates words it saw broken across lines
//! - vision models wrap their answer in ` ``` ` fences despite the prompt
//! - scanned PDFs carry zero-width spaces and soft hyphens in their text layer
//!
//! Each rule is a pure `&str → String` pass.
//!
//! ## Rule Order
//!
//! Fences are stripped first so the text they wrap goes through every other
//! rule. Hyphen repair only looks across a single line break, so it runs
//! after trailing whitespace is gone.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to raw OCR output.
///
/// Rules (applied in order):
/// 1. Strip outer code fences (vision models sometimes disobey the prompt)
/// 2. Normalise line endings (CRLF, CR, form feed → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 4. Trim trailing whitespace per line
/// 5. Re-join words hyphenated across a line break
/// 6. Collapse 2+ consecutive blank lines down to 1
/// 7. End with exactly one newline (or be empty)
pub fn clean_ocr_text(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = join_hyphenated_words(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:text|plaintext|markdown)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{000C}', "\n\n")
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Re-join hyphenated words ─────────────────────────────────────────

// Only lowercase continuations: "INV-\n2024" is an identifier, not a word.
static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])-\n([a-z])").unwrap());

fn join_hyphenated_words(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").to_string()
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 7: Final newline ────────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```text\nInvoice 1\n```"), "Invoice 1");
        assert_eq!(strip_code_fences("```\nA\nB\n```"), "A\nB");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(normalise_line_endings("p1\u{000C}p2"), "p1\n\np2");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("To\u{200B}tal\u{FEFF}"), "Total");
    }

    #[test]
    fn test_join_hyphenated_words() {
        assert_eq!(join_hyphenated_words("deli-\nvery"), "delivery");
        assert_eq!(join_hyphenated_words("INV-\n2024"), "INV-\n2024");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("x\n\n"), "x\n");
        assert_eq!(ensure_final_newline("  \n"), "");
    }

    #[test]
    fn test_full_pipeline() {
        let raw = "```\r\nInvoice No: 12   \r\n\r\n\r\n\r\nTo\u{00AD}tal: 5.00\r\n```";
        assert_eq!(clean_ocr_text(raw), "Invoice No: 12\n\nTotal: 5.00\n");
    }
}
