//! Request-level orchestration.
//!
//! One [`FinanceAnalyzer`] serves every request shape the API exposes: the
//! multi-month analysis pipeline, single-month fact extraction, interactive
//! Q&A and the report-page calls. The analysis pipeline runs sequentially
//! (staging, extraction, prompting, the model call, validation); the only
//! blocking step is the outbound completion call, bounded by its timeout.
//! There is no cancellation once that call is in flight.
//!
//! Scratch partitions are keyed by requester identity. Overlapping requests
//! for the same identity race on that partition and are not supported;
//! callers must serialize per identity.

use crate::aggregate::{analyze_month, collect_month_contents, MonthFileContent};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::extract::{
    decode_text, encode_base64, load_csv_rows, load_spreadsheet_rows, load_spreadsheet_rows_from_bytes,
    render_table, CellValue,
};
use crate::llm::{
    build_analysis_prompt, build_question_prompt, parse_analysis, report_system_prompt,
    ChatMessage, CompletionClient, QaMode, ANALYSIS_SAMPLING, ANALYSIS_TIMEOUT, QA_TIMEOUT,
    REPORT_SAMPLING, SYSTEM_PROMPT_ANALYSIS,
};
use crate::month::{sorted_unique_months, validate_month};
use crate::report::parse_report_sheets;
use crate::schema::{file_type_tag, AnalysisResult, FileKind, FilePreview, FinancialFact, SheetData};
use crate::storage::{MonthStore, ScratchArea};
use log::info;

/// Rows shown by the stored-file preview.
const PREVIEW_ROW_LIMIT: usize = 20;

/// One uploaded file of an analysis request, tagged with its month key.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub month: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// The multi-month analysis request shape.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub files: Vec<UploadedFile>,
    pub base_month: Option<String>,
    pub months: Vec<String>,
}

/// A file attached to an interactive question.
#[derive(Debug, Clone)]
pub struct QaAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct FinanceAnalyzer {
    config: AnalyzerConfig,
    client: CompletionClient,
}

impl FinanceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let client = CompletionClient::new(&config);
        Self { config, client }
    }

    /// The persistent month-partitioned upload store.
    pub fn store(&self) -> MonthStore {
        MonthStore::new(&self.config.upload_root)
    }

    /// Runs the full analysis pipeline for one request.
    ///
    /// The scratch partition for `identity` is recreated at the start and
    /// removed on every exit path. The first failure aborts the request; no
    /// partial results are produced and nothing is retried.
    pub async fn analyze_files(
        &self,
        identity: &str,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResult> {
        if request.files.is_empty() {
            return Err(AnalysisError::NoFilesProvided);
        }

        info!("analysis for {}: staging {} files", identity, request.files.len());
        let scratch = ScratchArea::create(&self.config.upload_root, identity)?;

        let mut months = Vec::new();
        for file in &request.files {
            // files with no month key are dropped; a malformed key rejects
            // the whole request
            if file.month.is_empty() {
                continue;
            }
            validate_month(&file.month)?;
            scratch.stage(&file.month, &file.filename, &file.bytes)?;
            months.push(file.month.clone());
        }
        for month in &request.months {
            validate_month(month)?;
            months.push(month.clone());
        }
        if let Some(base) = &request.base_month {
            validate_month(base)?;
        }
        let months = sorted_unique_months(months);
        if months.is_empty() {
            return Err(AnalysisError::NoValidMonths);
        }

        info!("analysis for {}: extracting months {:?}", identity, months);
        let store = scratch.store();
        let mut blocks: Vec<MonthFileContent> = Vec::new();
        for month in &months {
            match collect_month_contents(&store, month) {
                Ok(mut month_blocks) => blocks.append(&mut month_blocks),
                Err(AnalysisError::MonthNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        info!("analysis for {}: prompting over {} file blocks", identity, blocks.len());
        let prompt = build_analysis_prompt(&months, request.base_month.as_deref(), &blocks)?;

        info!("analysis for {}: calling model", identity);
        let raw = self
            .client
            .chat(SYSTEM_PROMPT_ANALYSIS, &prompt, ANALYSIS_SAMPLING, ANALYSIS_TIMEOUT)
            .await?;

        info!("analysis for {}: validating model output", identity);
        parse_analysis(&raw, &months)
    }

    /// Structured facts for one month of the persistent store.
    pub fn analyze_month(&self, month: &str) -> Result<Vec<FinancialFact>> {
        analyze_month(&self.store(), month)
    }

    /// Interactive Q&A: question, optional conversation context, optional
    /// attached file. Returns the model's answer text.
    pub async fn ask(
        &self,
        question: &str,
        mode: QaMode,
        context: Vec<ChatMessage>,
        attachment: Option<&QaAttachment>,
    ) -> Result<String> {
        let file_block = match attachment {
            Some(file) => Some((file_type_tag(&file.filename), attachment_content(file)?)),
            None => None,
        };
        let prompt = build_question_prompt(
            question,
            file_block.as_ref().map(|(t, c)| (t.as_str(), c.as_str())),
        );

        let mut messages = vec![ChatMessage::system(mode.system_prompt())];
        messages.extend(context);
        messages.push(ChatMessage::user(prompt));

        self.client
            .chat_messages(messages, mode.sampling(), QA_TIMEOUT)
            .await
    }

    /// Free-form report analysis: the caller-assembled prompt goes straight
    /// to the model under the analyst persona.
    pub async fn analyze_report_prompt(&self, prompt: &str) -> Result<String> {
        self.client
            .chat(&report_system_prompt(), prompt, REPORT_SAMPLING, QA_TIMEOUT)
            .await
    }

    /// Parses an uploaded report workbook into preview sheets. The file is
    /// staged into a scratch partition that is removed before returning.
    pub fn parse_report_upload(
        &self,
        identity: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Vec<SheetData>> {
        let scratch = ScratchArea::create(&self.config.upload_root, &format!("report_{}", identity))?;
        let path = scratch.path().join(filename);
        std::fs::write(&path, bytes)?;
        parse_report_sheets(&path, filename)
    }

    /// Preview of a stored file: a row grid for tables, a data URL for
    /// images.
    pub fn preview(&self, month: &str, filename: &str) -> Result<FilePreview> {
        validate_month(month)?;
        let store = self.store();
        let path = store.file_path(month, filename)?;

        match FileKind::from_name(filename) {
            FileKind::Spreadsheet => {
                let rows = if file_type_tag(filename) == "csv" {
                    load_csv_rows(&std::fs::read(&path)?)?
                } else {
                    load_spreadsheet_rows(&path)?
                };
                let grid = rows
                    .iter()
                    .take(PREVIEW_ROW_LIMIT)
                    .map(|row| row.iter().map(CellValue::to_text).collect())
                    .collect();
                Ok(FilePreview::Table(grid))
            }
            FileKind::Image => {
                let bytes = std::fs::read(&path)?;
                Ok(FilePreview::Image(format!(
                    "data:image/{};base64,{}",
                    file_type_tag(filename),
                    encode_base64(&bytes)
                )))
            }
            _ => Err(AnalysisError::UnsupportedFileType(file_type_tag(filename))),
        }
    }
}

/// Decoded content of a Q&A attachment. Tables render as a grid, text
/// decodes; anything else is rejected.
fn attachment_content(file: &QaAttachment) -> Result<String> {
    match file_type_tag(&file.filename).as_str() {
        "csv" => Ok(render_table(&load_csv_rows(&file.bytes)?)),
        "xlsx" | "xls" => Ok(render_table(&load_spreadsheet_rows_from_bytes(&file.bytes)?)),
        tag => match FileKind::from_name(&file.filename) {
            FileKind::Text => decode_text(&file.bytes)
                .ok_or_else(|| AnalysisError::Extraction(file.filename.clone())),
            _ => Err(AnalysisError::UnsupportedFileType(tag.to_string())),
        },
    }
}
