//! Heuristic tabular extraction.
//!
//! Spreadsheets and delimited text are loaded into a uniform grid of cells,
//! a header row is located by keyword scan, columns are classified into
//! subject/amount/date roles, and data rows become [`FinancialFact`]s.
//! Files the heuristics cannot map yield zero facts rather than errors.

use crate::error::{AnalysisError, Result};
use crate::schema::{file_type_tag, Amount, FinancialFact};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use calamine::{open_workbook_auto, Data, Reader};
use log::debug;
use std::fs;
use std::path::Path;

pub const SUBJECT_KEYWORDS: &[&str] = &["科目", "项目", "摘要", "资产", "负债", "所有者权益"];

pub const AMOUNT_KEYWORDS: &[&str] = &[
    "金额",
    "余额",
    "收入",
    "支出",
    "本期金额",
    "本月金额",
    "本年金额",
    "上期金额",
    "上年同期",
];

pub const DATE_KEYWORDS: &[&str] = &["日期", "时间", "年", "月"];

/// How many leading rows the header scan may inspect.
const HEADER_SCAN_ROWS: usize = 6;

/// A normalized table cell, independent of the source file format.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Missing-value marker: empty cells and whitespace-only strings.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// Column roles discovered in a header row. When several columns match the
/// same category, the last one scanned wins; the original behaves this way
/// and downstream data depends on it, so it is preserved rather than fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub subject: Option<usize>,
    pub amount: Option<usize>,
    pub date: Option<usize>,
}

impl ColumnMap {
    pub fn is_usable(&self) -> bool {
        self.subject.is_some() && self.amount.is_some()
    }
}

fn contains_keyword(cell: &str, keywords: &[&str]) -> bool {
    let lowered = cell.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

pub fn classify_columns(headers: &[String]) -> ColumnMap {
    let mut map = ColumnMap::default();
    for (idx, name) in headers.iter().enumerate() {
        if contains_keyword(name, SUBJECT_KEYWORDS) {
            map.subject = Some(idx);
        }
        if contains_keyword(name, AMOUNT_KEYWORDS) {
            map.amount = Some(idx);
        }
        if contains_keyword(name, DATE_KEYWORDS) {
            map.date = Some(idx);
        }
    }
    map
}

/// Scans the first rows of a raw grid for a plausible header: the first row
/// holding at least one subject-keyword cell and one amount-keyword cell.
/// Pure over the grid so it can be tested without real spreadsheet files.
pub fn find_header_row(rows: &[Vec<CellValue>]) -> Option<usize> {
    for (idx, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let has_subject = row
            .iter()
            .any(|c| contains_keyword(&c.to_text(), SUBJECT_KEYWORDS));
        let has_amount = row
            .iter()
            .any(|c| contains_keyword(&c.to_text(), AMOUNT_KEYWORDS));
        if has_subject && has_amount {
            return Some(idx);
        }
    }
    None
}

pub(crate) fn convert_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

/// Loads the first worksheet of an Excel workbook as a raw grid.
pub fn load_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<CellValue>>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AnalysisError::Extraction(format!("{}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::Extraction(format!("{}: no worksheet", path.display())))?
        .map_err(|e| AnalysisError::Extraction(format!("{}: {}", path.display(), e)))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(convert_cell).collect())
        .collect())
}

/// Loads the first worksheet of an in-memory workbook, for attachments that
/// never touch the store.
pub fn load_spreadsheet_rows_from_bytes(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>> {
    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
        .map_err(|e| AnalysisError::Extraction(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::Extraction("no worksheet".to_string()))?
        .map_err(|e| AnalysisError::Extraction(e.to_string()))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(convert_cell).collect())
        .collect())
}

/// Loads delimited text as a raw grid. Numeric-looking cells become numbers,
/// mirroring the type inference the tabular facts rely on.
pub fn load_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<CellValue>>> {
    let text = decode_text(bytes)
        .ok_or_else(|| AnalysisError::Extraction("undecodable delimited text".to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::Extraction(e.to_string()))?;
        let row = record
            .iter()
            .map(|cell| {
                let trimmed = cell.trim();
                if trimmed.is_empty() {
                    CellValue::Empty
                } else if let Ok(n) = trimmed.parse::<f64>() {
                    CellValue::Number(n)
                } else {
                    CellValue::Text(cell.to_string())
                }
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Turns a raw grid into facts. `detect_header` enables the keyword scan for
/// workbooks whose real header sits below title rows; delimited text keeps
/// row 0 as its header.
pub fn extract_facts(filename: &str, rows: &[Vec<CellValue>], detect_header: bool) -> Vec<FinancialFact> {
    if rows.is_empty() {
        return Vec::new();
    }

    let header_idx = if detect_header {
        find_header_row(rows).unwrap_or(0)
    } else {
        0
    };

    let headers: Vec<String> = rows[header_idx].iter().map(CellValue::to_text).collect();
    let map = classify_columns(&headers);
    debug!("{}: headers {:?} mapped {:?}", filename, headers, map);

    if !map.is_usable() {
        debug!("{}: no subject/amount columns, skipping", filename);
        return Vec::new();
    }
    let subject_col = map.subject.unwrap();
    let amount_col = map.amount.unwrap();

    let mut facts = Vec::new();
    for row in &rows[header_idx + 1..] {
        let amount_cell = row.get(amount_col).unwrap_or(&CellValue::Empty);
        if amount_cell.is_missing() {
            continue;
        }
        let amount = match amount_cell {
            CellValue::Number(n) => Amount::Number(*n),
            CellValue::Text(s) => Amount::Text(s.clone()),
            CellValue::Empty => continue,
        };
        let subject = row
            .get(subject_col)
            .map(CellValue::to_text)
            .unwrap_or_default();
        let date = map
            .date
            .and_then(|i| row.get(i))
            .map(CellValue::to_text)
            .unwrap_or_default();

        facts.push(FinancialFact {
            file: filename.to_string(),
            subject,
            amount,
            date,
        });
    }
    facts
}

/// Extracts facts from a stored tabular file. Non-tabular extensions are an
/// error here; callers on the best-effort path skip them beforehand.
pub fn extract_file_facts(path: &Path, filename: &str) -> Result<Vec<FinancialFact>> {
    let tag = file_type_tag(filename);
    let rows = match tag.as_str() {
        "csv" => load_csv_rows(&fs::read(path)?)?,
        "xlsx" | "xls" => load_spreadsheet_rows(path)?,
        _ => return Err(AnalysisError::UnsupportedFileType(tag)),
    };
    Ok(extract_facts(filename, &rows, tag != "csv"))
}

/// Renders a grid as plain text for prompt embedding, one row per line.
pub fn render_table(rows: &[Vec<CellValue>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(CellValue::to_text)
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes bytes as UTF-8, falling back to GBK. None when neither fits.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_string());
    }
    let (text, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Best-effort textual content of any stored file, for prompt embedding.
/// Tabular files render as a grid, text decodes, everything else (and every
/// failure) degrades to base64 so the request itself never dies here.
pub fn file_raw_content(path: &Path, filename: &str) -> Result<String> {
    let bytes = fs::read(path)?;
    let content = match file_type_tag(filename).as_str() {
        "xlsx" | "xls" => match load_spreadsheet_rows(path) {
            Ok(rows) => render_table(&rows),
            Err(_) => encode_base64(&bytes),
        },
        "csv" => match load_csv_rows(&bytes) {
            Ok(rows) => render_table(&rows),
            Err(_) => encode_base64(&bytes),
        },
        _ => decode_text(&bytes).unwrap_or_else(|| encode_base64(&bytes)),
    };
    Ok(content)
}
