//! # Financial Report Analyzer
//!
//! A library for turning heterogeneous monthly financial documents
//! (spreadsheets, delimited text, images) into structured analytics backed
//! by an external chat-completion endpoint.
//!
//! ## Core Concepts
//!
//! - **Month partition**: files live under `YYYY-MM` keys; lexicographic
//!   order of valid keys is chronological order
//! - **Financial fact**: a `(subject, amount, date)` row recovered from a
//!   table by heuristic header and column detection
//! - **Analysis result**: trend line, cash-flow bars, cash-flow composition
//!   areas and a three-part advisory, repaired into shape from raw model text
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_report_analyzer::*;
//!
//! let config = AnalyzerConfig::new(api_key, "uploads");
//! let analyzer = FinanceAnalyzer::new(config);
//!
//! let request = AnalysisRequest {
//!     files: vec![UploadedFile {
//!         month: "2024-10".to_string(),
//!         filename: "income.xlsx".to_string(),
//!         bytes: std::fs::read("income.xlsx")?,
//!     }],
//!     base_month: Some("2024-10".to_string()),
//!     months: vec![],
//! };
//!
//! let result = analyzer.analyze_files("user-42", &request).await?;
//! println!("{}", result.advice.conclusion);
//! ```

pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod month;
pub mod report;
pub mod schema;
pub mod storage;

pub use aggregate::{analyze_month, collect_month_contents, MonthFileContent};
pub use analyzer::{AnalysisRequest, FinanceAnalyzer, QaAttachment, UploadedFile};
pub use config::AnalyzerConfig;
pub use error::{AnalysisError, Result};
pub use extract::{classify_columns, extract_facts, find_header_row, CellValue, ColumnMap};
pub use llm::{
    build_analysis_prompt, build_question_prompt, parse_analysis, ChatMessage, CompletionClient,
    QaMode,
};
pub use month::{forecast_horizon, forecast_months, is_valid_month, sorted_unique_months};
pub use report::{extract_sheets_from_prompt, parse_report_sheets};
pub use schema::{
    Advice, Amount, AnalysisResult, FileKind, FilePreview, FinancialFact, PointKind, SheetData,
    TrendPoint,
};
pub use storage::{MonthStore, ScratchArea, StoredFileInfo};
