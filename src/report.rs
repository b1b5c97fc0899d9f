//! Report-upload sheet parsing.
//!
//! The report page uploads a workbook or CSV, previews it as named sheets,
//! and later ships those sheets back embedded in a free-form analysis prompt
//! behind a `表格数据：` marker. Both directions live here.

use crate::error::{AnalysisError, Result};
use crate::extract::{convert_cell, load_csv_rows, CellValue};
use crate::schema::{file_type_tag, SheetData};
use calamine::{open_workbook_auto, Reader};
use log::debug;
use serde_json::{Map, Value};
use std::path::Path;

/// Cap on data rows carried per sheet, matching the preview contract.
const SHEET_ROW_LIMIT: usize = 100;

const SHEET_MARKER: &str = "表格数据：";

fn cell_to_json(cell: &CellValue) -> Value {
    match cell {
        CellValue::Empty => Value::Null,
        CellValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        CellValue::Text(s) => Value::String(s.clone()),
    }
}

fn rows_to_sheet(name: &str, rows: &[Vec<CellValue>]) -> Option<SheetData> {
    let header = rows.first()?;
    let columns: Vec<String> = header.iter().map(CellValue::to_text).collect();
    if columns.iter().all(|c| c.is_empty()) {
        return None;
    }

    let data: Vec<Value> = rows[1..]
        .iter()
        .take(SHEET_ROW_LIMIT)
        .map(|row| {
            let mut object = Map::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = row.get(idx).map(cell_to_json).unwrap_or(Value::Null);
                object.insert(column.clone(), value);
            }
            Value::Object(object)
        })
        .collect();
    if data.is_empty() {
        return None;
    }

    Some(SheetData {
        name: name.to_string(),
        columns,
        data,
    })
}

/// Parses an uploaded report file into named sheets. CSV yields one sheet
/// named after the file; a workbook yields one per non-empty worksheet.
/// A file with no usable sheet is rejected.
pub fn parse_report_sheets(path: &Path, filename: &str) -> Result<Vec<SheetData>> {
    let sheets = match file_type_tag(filename).as_str() {
        "csv" => {
            let rows = load_csv_rows(&std::fs::read(path)?)?;
            rows_to_sheet(filename, &rows).into_iter().collect()
        }
        "xlsx" | "xls" => {
            let mut workbook = open_workbook_auto(path)
                .map_err(|e| AnalysisError::Extraction(format!("{}: {}", filename, e)))?;
            let names: Vec<String> = workbook.sheet_names().to_vec();
            let mut sheets = Vec::new();
            for sheet_name in names {
                let range = match workbook.worksheet_range(&sheet_name) {
                    Ok(range) => range,
                    Err(e) => {
                        debug!("{}/{}: unreadable sheet: {}", filename, sheet_name, e);
                        continue;
                    }
                };
                let rows: Vec<Vec<CellValue>> = range
                    .rows()
                    .map(|row| row.iter().map(convert_cell).collect())
                    .collect();
                if let Some(sheet) = rows_to_sheet(&sheet_name, &rows) {
                    sheets.push(sheet);
                }
            }
            sheets
        }
        other => return Err(AnalysisError::UnsupportedFileType(other.to_string())),
    };

    if sheets.is_empty() {
        return Err(AnalysisError::Extraction(format!(
            "{}: no usable sheet found",
            filename
        )));
    }
    Ok(sheets)
}

/// Pulls the sheet structures back out of a report analysis prompt. The
/// sheets sit as a JSON tail behind the `表格数据：` marker; an absent marker
/// or an unparseable tail yields an empty list rather than an error.
pub fn extract_sheets_from_prompt(prompt: &str) -> Vec<SheetData> {
    let Some(idx) = prompt.find(SHEET_MARKER) else {
        return Vec::new();
    };
    let tail = &prompt[idx + SHEET_MARKER.len()..];
    let tail = tail.strip_prefix('\n').unwrap_or(tail);
    match serde_json::from_str(tail) {
        Ok(sheets) => sheets,
        Err(e) => {
            debug!("sheet JSON in prompt did not parse: {}", e);
            Vec::new()
        }
    }
}
