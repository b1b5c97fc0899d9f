use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid month format: {0}. Expected YYYY-MM")]
    InvalidMonthFormat(String),

    #[error("No files uploaded")]
    NoFilesProvided,

    #[error("No valid months in request")]
    NoValidMonths,

    #[error("No data stored for month: {0}")]
    MonthNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File extraction failed: {0}")]
    Extraction(String),

    #[error("Completion endpoint transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion endpoint returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Completion response missing expected fields: {0}")]
    MalformedUpstreamResponse(String),

    #[error("Model output could not be recovered as JSON")]
    ResponseParse { raw: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
