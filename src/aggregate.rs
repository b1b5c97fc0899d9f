//! Per-month aggregation over the file store.
//!
//! Two call shapes feed the API surface: structured fact extraction for the
//! single-month analysis view, and raw content collection for multi-month
//! prompt construction. Both iterate a month's files once, in filename
//! order; a file that fails to read or parse is logged and skipped, never
//! failing the whole request.

use crate::error::{AnalysisError, Result};
use crate::extract::{extract_file_facts, file_raw_content};
use crate::schema::{file_type_tag, FinancialFact};
use crate::storage::MonthStore;
use log::{debug, warn};

/// Raw decoded content of one stored file, tagged for prompt embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthFileContent {
    pub month: String,
    pub filename: String,
    pub file_type: String,
    pub content: String,
}

/// Structured facts for every tabular file stored under `month`.
///
/// Non-tabular files are skipped quietly; tabular files that fail to parse
/// are skipped with a warning.
pub fn analyze_month(store: &MonthStore, month: &str) -> Result<Vec<FinancialFact>> {
    if !store.has_month(month) {
        return Err(AnalysisError::MonthNotFound(month.to_string()));
    }

    let mut facts = Vec::new();
    for filename in store.list(month)? {
        match file_type_tag(&filename).as_str() {
            "csv" | "xlsx" | "xls" => {}
            other => {
                debug!("{}/{}: not tabular ({}), skipping", month, filename, other);
                continue;
            }
        }
        let path = store.file_path(month, &filename)?;
        match extract_file_facts(&path, &filename) {
            Ok(mut file_facts) => {
                debug!("{}/{}: {} facts", month, filename, file_facts.len());
                facts.append(&mut file_facts);
            }
            Err(e) => warn!("{}/{}: extraction skipped: {}", month, filename, e),
        }
    }
    Ok(facts)
}

/// Raw content blocks for every file stored under `month`, in filename
/// order. Content degrades to base64 rather than failing, so a block is
/// produced for every readable file.
pub fn collect_month_contents(store: &MonthStore, month: &str) -> Result<Vec<MonthFileContent>> {
    if !store.has_month(month) {
        return Err(AnalysisError::MonthNotFound(month.to_string()));
    }

    let mut blocks = Vec::new();
    for filename in store.list(month)? {
        let path = store.file_path(month, &filename)?;
        match file_raw_content(&path, &filename) {
            Ok(content) => blocks.push(MonthFileContent {
                month: month.to_string(),
                filename: filename.clone(),
                file_type: file_type_tag(&filename),
                content,
            }),
            Err(e) => warn!("{}/{}: unreadable, skipping: {}", month, filename, e),
        }
    }
    Ok(blocks)
}
