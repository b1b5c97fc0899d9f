use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::llm::types::*;
use log::debug;
use reqwest::Client;
use std::time::Duration;

/// Timeout for interactive question answering.
pub const QA_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for multi-file financial analysis, which carries a much larger
/// prompt.
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);

/// Stateless wrapper around the chat-completion endpoint.
///
/// One POST per call, bearer-token auth, `stream: false`. Failures are typed
/// into transport, upstream (non-200, carrying status and body) and
/// malformed-response (200 without the expected fields). No retries happen
/// here or anywhere above; a failed call fails the request.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// Sends a system/user message pair with the given sampling parameters
    /// and returns the model's raw text content.
    pub async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: SamplingParams,
        timeout: Duration,
    ) -> Result<String> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        self.chat_messages(messages, params, timeout).await
    }

    /// Sends a full message list, for callers threading conversation context.
    pub async fn chat_messages(
        &self,
        messages: Vec<ChatMessage>,
        params: SamplingParams,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            AnalysisError::MalformedUpstreamResponse(format!("undecodable body: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                AnalysisError::MalformedUpstreamResponse("empty choices list".to_string())
            })?
            .message
            .content
            .ok_or_else(|| {
                AnalysisError::MalformedUpstreamResponse("message without content".to_string())
            })?;

        debug!("completion returned {} chars", content.len());
        Ok(content)
    }
}
