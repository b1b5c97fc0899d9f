use std::path::PathBuf;

const DEFAULT_API_BASE: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";

/// Runtime configuration for the analysis pipeline.
///
/// The upload root is injected here rather than read from process-wide state
/// so tests can point each case at an isolated temporary directory.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Base URL of the chat-completion endpoint, without a trailing slash.
    pub api_base: String,
    /// Bearer token for the completion endpoint.
    pub api_key: String,
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Root directory holding the month-partitioned upload store.
    pub upload_root: PathBuf,
}

impl AnalyzerConfig {
    pub fn new(api_key: impl Into<String>, upload_root: impl Into<PathBuf>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            upload_root: upload_root.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
