//! Invoice field segmentation: OCR text → named fields.
//!
//! OCR output has no structure beyond line breaks, so fields are recovered
//! from their printed labels ("Invoice No:", "Bill To", "Amount Due", …).
//! The text between one label and the next is the candidate value of the
//! first label; a kind-specific normaliser then pulls the actual identifier,
//! date, amount or address out of that span and rejects spans that do not
//! contain one (so "Tax Invoice" in a page title does not become a tax amount).
//!
//! ## Boundary rules
//!
//! 1. Every label of every field is located in the text.
//! 2. Overlapping label hits are resolved left-to-right: the hit that starts
//!    first wins, ties go to the longer hit ("Total Tax" beats "Total").
//! 3. A value ends where the next surviving label begins. Single-line
//!    fields additionally stop at the end of their first non-empty line;
//!    address fields stop at a blank line or after [`MAX_ADDRESS_LINES`].
//! 4. Strong labels are tried before weak ones ("Invoice Date" before a bare
//!    "Date"); the first valid value per field wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on the number of lines an address field may span.
pub const MAX_ADDRESS_LINES: usize = 4;

/// Characters that separate a label from its value.
const SEPARATORS: &[char] = &[':', '#', '-', '.', '=', '|'];

/// Invoice fields, declared in CSV column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InvoiceField {
    InvoiceNumber,
    InvoiceDate,
    DueDate,
    PoNumber,
    Seller,
    BillTo,
    ShipTo,
    Subtotal,
    Tax,
    Total,
}

/// How a field's raw span is normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identifier,
    Date,
    Amount,
    Address,
}

impl InvoiceField {
    /// Every field in column order.
    pub const ALL: [InvoiceField; 10] = [
        InvoiceField::InvoiceNumber,
        InvoiceField::InvoiceDate,
        InvoiceField::DueDate,
        InvoiceField::PoNumber,
        InvoiceField::Seller,
        InvoiceField::BillTo,
        InvoiceField::ShipTo,
        InvoiceField::Subtotal,
        InvoiceField::Tax,
        InvoiceField::Total,
    ];

    /// Column header used in CSV output.
    pub fn column(&self) -> &'static str {
        match self {
            InvoiceField::InvoiceNumber => "Invoice Number",
            InvoiceField::InvoiceDate => "Invoice Date",
            InvoiceField::DueDate => "Due Date",
            InvoiceField::PoNumber => "PO Number",
            InvoiceField::Seller => "Seller",
            InvoiceField::BillTo => "Bill To",
            InvoiceField::ShipTo => "Ship To",
            InvoiceField::Subtotal => "Subtotal",
            InvoiceField::Tax => "Tax",
            InvoiceField::Total => "Total",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            InvoiceField::InvoiceNumber | InvoiceField::PoNumber => FieldKind::Identifier,
            InvoiceField::InvoiceDate | InvoiceField::DueDate => FieldKind::Date,
            InvoiceField::Seller | InvoiceField::BillTo | InvoiceField::ShipTo => {
                FieldKind::Address
            }
            InvoiceField::Subtotal | InvoiceField::Tax | InvoiceField::Total => FieldKind::Amount,
        }
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Fields recovered from one document, keyed in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFields {
    values: BTreeMap<InvoiceField, String>,
}

impl InvoiceFields {
    pub fn get(&self, field: InvoiceField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: InvoiceField) -> bool {
        self.values.contains_key(&field)
    }

    /// Set a field value; blank values are ignored.
    pub fn insert(&mut self, field: InvoiceField, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(field, value);
        }
    }

    /// Found fields in column order.
    pub fn iter(&self) -> impl Iterator<Item = (InvoiceField, &str)> {
        self.values.iter().map(|(f, v)| (*f, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn found_count(&self) -> usize {
        self.values.len()
    }

    /// Numeric value of an amount field, ignoring currency symbols and
    /// thousands separators.
    pub fn amount(&self, field: InvoiceField) -> Option<f64> {
        self.get(field).and_then(parse_amount)
    }
}

// ── Labels ───────────────────────────────────────────────────────────────────

struct LabelSpec {
    field: InvoiceField,
    weak: bool,
    regex: Regex,
}

fn label(field: InvoiceField, weak: bool, pattern: &str) -> LabelSpec {
    LabelSpec {
        field,
        weak,
        regex: Regex::new(pattern).unwrap(),
    }
}

/// Address labels are common words ("from", "customer"), so they only count
/// at the start of a line or when followed by a colon.
fn address_label(field: InvoiceField, words: &str) -> LabelSpec {
    label(
        field,
        false,
        &format!(r"(?im)(?:^[ \t]*(?:{words})\b|\b(?:{words})[ \t]*:)"),
    )
}

static LABELS: Lazy<Vec<LabelSpec>> = Lazy::new(|| {
    use InvoiceField::*;
    vec![
        label(
            InvoiceNumber,
            false,
            r"(?i)\b(?:invoice|inv\.?|bill)[ \t]*(?:no\b\.?|number\b|num\b\.?|#|id\b)",
        ),
        label(
            InvoiceDate,
            false,
            r"(?i)\b(?:invoice[ \t]+date|date[ \t]+of[ \t]+(?:issue|invoice)|issue[ \t]+date|bill[ \t]+date)\b",
        ),
        label(InvoiceDate, true, r"(?i)\bdated?\b"),
        label(
            DueDate,
            false,
            r"(?i)\b(?:due[ \t]+date|payment[ \t]+due|due[ \t]+by|pay[ \t]+by)\b",
        ),
        label(
            PoNumber,
            false,
            r"(?i)(?:\bpurchase[ \t]+order|\bp\.?[ \t]?o\.?)[ \t]*(?:no\b\.?|number\b|#)",
        ),
        label(PoNumber, true, r"(?i)\border[ \t]*(?:no\b\.?|number\b|#)"),
        address_label(
            Seller,
            r"seller|vendor|supplier|sold[ \t]+by|issued[ \t]+by|from",
        ),
        address_label(
            BillTo,
            r"bill(?:ed)?[ \t]+to|invoice[ \t]+to|sold[ \t]+to|customer|buyer",
        ),
        address_label(ShipTo, r"ship(?:ped)?[ \t]+to|deliver(?:y|ed)?[ \t]+to"),
        label(Subtotal, false, r"(?i)\bsub[ \t-]?total\b"),
        label(
            Tax,
            false,
            r"(?i)\b(?:total[ \t]+)?(?:sales[ \t]+tax|tax|vat|gst)(?:[ \t]+amount)?\b",
        ),
        label(
            Total,
            false,
            r"(?i)\b(?:grand[ \t]+total|total[ \t]+amount(?:[ \t]+due)?|total[ \t]+due|amount[ \t]+due|balance[ \t]+due|invoice[ \t]+total)\b",
        ),
        label(Total, true, r"(?i)\btotal\b"),
    ]
});

#[derive(Debug, Clone, Copy)]
struct LabelHit {
    start: usize,
    end: usize,
    field: InvoiceField,
    weak: bool,
}

/// Locate every label and drop overlapping hits (earliest start, then longest, wins).
fn find_labels(text: &str) -> Vec<LabelHit> {
    let mut hits: Vec<LabelHit> = LABELS
        .iter()
        .flat_map(|label| {
            label.regex.find_iter(text).map(move |m| LabelHit {
                start: m.start(),
                end: m.end(),
                field: label.field,
                weak: label.weak,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
    });

    let mut kept: Vec<LabelHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if kept.last().is_none_or(|k| hit.start >= k.end) {
            kept.push(hit);
        }
    }
    kept
}

// ── Segmentation ─────────────────────────────────────────────────────────────

/// Segment OCR text into invoice fields.
///
/// Pure function: the same text always yields the same fields. Fields that
/// cannot be found are simply absent.
pub fn segment(text: &str) -> InvoiceFields {
    let hits = find_labels(text);
    let mut fields = InvoiceFields::default();

    for weak_pass in [false, true] {
        for (i, hit) in hits.iter().enumerate() {
            if hit.weak != weak_pass || fields.contains(hit.field) {
                continue;
            }
            let end = hits.get(i + 1).map_or(text.len(), |next| next.start);
            if let Some(value) = extract_value(hit.field.kind(), &text[hit.end..end]) {
                fields.insert(hit.field, value);
            }
        }
    }

    apply_fallbacks(text, &mut fields);
    fields
}

/// Pull a normalised value of `kind` out of the span that follows a label.
fn extract_value(kind: FieldKind, span: &str) -> Option<String> {
    let body = span.trim_start_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c));
    let line = body.lines().next().unwrap_or("").trim();
    match kind {
        FieldKind::Address => address_value(body),
        FieldKind::Identifier => identifier_value(line),
        FieldKind::Date => date_value(line),
        FieldKind::Amount => amount_value(line),
    }
}

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9/_-]*").unwrap());

/// First identifier-shaped token of the line.
fn identifier_value(line: &str) -> Option<String> {
    RE_TOKEN
        .find(line)
        .map(|m| m.as_str().trim_end_matches(['-', '/', '_']))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

const MONTHS: &str = r"jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec";

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:\d{{4}}[-/.]\d{{1,2}}[-/.]\d{{1,2}}|\d{{1,2}}[-/.]\d{{1,2}}[-/.]\d{{2,4}}|(?:{MONTHS})[a-z]*\.?[ \t]+\d{{1,2}}(?:st|nd|rd|th)?,?[ \t]+\d{{4}}|\d{{1,2}}(?:st|nd|rd|th)?[ \t]+(?:{MONTHS})[a-z]*\.?,?[ \t]+\d{{4}})\b"
    ))
    .unwrap()
});

fn date_value(line: &str) -> Option<String> {
    RE_DATE.find(line).map(|m| m.as_str().to_string())
}

static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[$€£₹¥][ \t]?|\b(?:USD|EUR|GBP|INR|CAD|AUD|CHF|JPY)[ \t]?)?-?\d+(?:,\d{3})*(?:\.\d{1,2})?",
    )
    .unwrap()
});

/// Money tokens in `line`, skipping percentages ("Tax (10%)").
fn amounts_in(line: &str) -> impl Iterator<Item = &str> {
    RE_AMOUNT
        .find_iter(line)
        .filter(move |m| !line[m.end()..].starts_with('%'))
        .map(|m| m.as_str().trim())
}

fn amount_value(line: &str) -> Option<String> {
    amounts_in(line).next().map(str::to_string)
}

fn address_value(body: &str) -> Option<String> {
    let parts: Vec<&str> = body
        .lines()
        .map(|l| l.trim().trim_end_matches(','))
        .take_while(|l| !l.is_empty())
        .take(MAX_ADDRESS_LINES)
        .collect();
    let joined = parts.join(", ");
    if joined.chars().any(|c| c.is_alphanumeric()) {
        Some(joined)
    } else {
        None
    }
}

/// Parse an amount token into a number.
pub fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

// ── Fallbacks ────────────────────────────────────────────────────────────────

static RE_INVOICE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bINV[-/#]?\d[A-Za-z0-9/_-]*").unwrap());
static RE_HASH_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[ \t]?([A-Za-z]{0,4}-?\d[A-Za-z0-9/_-]*)").unwrap());

fn apply_fallbacks(text: &str, fields: &mut InvoiceFields) {
    if !fields.contains(InvoiceField::InvoiceNumber) {
        let token = RE_INVOICE_TOKEN
            .find(text)
            .map(|m| m.as_str().to_string())
            .or_else(|| RE_HASH_TOKEN.captures(text).map(|c| c[1].to_string()));
        if let Some(token) = token {
            fields.insert(InvoiceField::InvoiceNumber, token);
        }
    }

    if !fields.contains(InvoiceField::Total) {
        let best = text
            .lines()
            .filter(|l| {
                let lower = l.to_lowercase();
                lower.contains("total") && !lower.contains("subtotal") && !lower.contains("sub total")
            })
            .flat_map(amounts_in)
            .filter_map(|a| parse_amount(a).map(|v| (v, a)))
            .max_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, token)) = best {
            fields.insert(InvoiceField::Total, token);
        }
    }
}
