//! System prompts for the vision OCR engine.
//!
//! Kept in one place so prompt regressions show up in unit tests instead of
//! in mis-segmented invoice fields.

/// System prompt asking a vision model for a verbatim transcription.
///
/// Field segmentation relies on labels and values staying on the lines where
/// they were printed, so the prompt forbids any reformatting.
pub const TRANSCRIBE_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe every piece of text visible in the image exactly as printed.

Rules:
1. Keep the original line breaks: one printed line per output line.
2. Separate visually distinct blocks (address boxes, totals, headers) with one blank line.
3. Keep labels next to their values, e.g. "Invoice No: 12345".
4. Copy numbers, dates, currency symbols and punctuation exactly. Do not round, convert or reformat them.
5. Read tables row by row, left to right, with cells separated by two spaces.
6. Do not translate, summarise, correct or explain anything.
7. Output plain text only. No Markdown, no code fences, no commentary.
8. If the image contains no text, output nothing."#;
