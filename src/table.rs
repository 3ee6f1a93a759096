//! Tabulation of extraction results and CSV encoding.

use crate::fields::InvoiceField;
use crate::output::ExtractionOutput;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableLayout {
    /// One row per text line: `File, Page, Image, Extracted Data`.
    Lines,
    /// One row per document: `File` followed by the invoice field columns.
    #[default]
    Invoice,
    /// One row per embedded image: dimensions and pixel layout.
    Metadata,
}

impl TableLayout {
    pub fn headers(&self) -> Vec<String> {
        let fixed: &[&str] = match self {
            TableLayout::Lines => &["File", "Page", "Image", "Extracted Data"],
            TableLayout::Invoice => &["File"],
            TableLayout::Metadata => &[
                "File",
                "Page Number",
                "Image Number",
                "Image Width",
                "Image Height",
                "Image Mode",
            ],
        };
        let mut headers: Vec<String> = fixed.iter().map(|h| h.to_string()).collect();
        if *self == TableLayout::Invoice {
            headers.extend(InvoiceField::ALL.iter().map(|f| f.column().to_string()));
        }
        headers
    }
}

impl fmt::Display for TableLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableLayout::Lines => "lines",
            TableLayout::Invoice => "invoice",
            TableLayout::Metadata => "metadata",
        })
    }
}

/// A header row plus string cells, ready for CSV encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Tabulate one or many documents in `layout`, documents in the given order.
    pub fn build(layout: TableLayout, outputs: &[ExtractionOutput]) -> Self {
        let mut rows = Vec::new();
        for output in outputs {
            match layout {
                TableLayout::Lines => rows.extend(output.lines.iter().map(|line| {
                    vec![
                        output.file_name.clone(),
                        line.page_num.to_string(),
                        line.image_num.map(|n| n.to_string()).unwrap_or_default(),
                        line.text.clone(),
                    ]
                })),
                TableLayout::Invoice => {
                    let mut row = vec![output.file_name.clone()];
                    row.extend(
                        InvoiceField::ALL
                            .iter()
                            .map(|f| output.invoice.get(*f).unwrap_or_default().to_string()),
                    );
                    rows.push(row);
                }
                TableLayout::Metadata => rows.extend(output.images.iter().map(|img| {
                    vec![
                        output.file_name.clone(),
                        img.page_num.to_string(),
                        img.image_num.to_string(),
                        img.width.to_string(),
                        img.height.to_string(),
                        img.color_mode.clone(),
                    ]
                })),
            }
        }

        Self {
            headers: layout.headers(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encode as CSV: header row first, `\n` after every row.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, &self.headers);
        for row in &self.rows {
            push_record(&mut out, row);
        }
        out
    }
}

fn push_record(out: &mut String, cells: &[String]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_csv(cell));
    }
    out.push('\n');
}

/// Quote a cell when it contains a delimiter, quote or line break.
pub fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
