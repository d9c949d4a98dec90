//! OpenAI-compatible chat completions adapter.
//!
//! Sends one `POST {url}/v1/chat/completions` per request with a bearer
//! token. No retries: a failed call surfaces as a single [`BackendError`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CompletionBackend, CompletionRequest};
use crate::config::BackendSettings;
use crate::error::{BackendError, BackendErrorKind};

/// Completion backend speaking the OpenAI chat completions protocol
pub struct OpenAiBackend {
    client: Client,
    settings: BackendSettings,
}

impl OpenAiBackend {
    /// Create a backend from resolved settings
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// Full chat completions endpoint for the configured base URL
    pub fn endpoint(&self) -> String {
        let base = self.settings.url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, BackendError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(BackendError::with_kind(
                BackendErrorKind::Auth,
                "API key is not set",
            ));
        }

        let endpoint = self.endpoint();
        info!(
            model = %self.settings.model,
            prompt_chars = request.user.chars().count(),
            "Requesting translation"
        );

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.settings.api_key)
            .timeout(self.settings.timeout)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, &body));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        debug!(bytes = body.len(), "Received completion response");

        Ok(extract_text(&body))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// First choice's content; `None` for bodies that parse but carry nothing
fn extract_text(body: &str) -> Option<String> {
    let parsed: ChatCompletionResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Completion response is not valid JSON");
            return None;
        }
    };

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::with_kind(BackendErrorKind::Timeout, format!("Request timed out: {err}"))
    } else {
        BackendError::new(format!("Request failed: {err}"))
    }
}

fn map_http_error(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = format!("HTTP {}: {}", status.as_u16(), message);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BackendError::with_kind(BackendErrorKind::Auth, message)
        }
        StatusCode::PAYMENT_REQUIRED => BackendError::with_kind(BackendErrorKind::Quota, message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            BackendError::with_kind(BackendErrorKind::Timeout, message)
        }
        _ => BackendError::new(message),
    }
}
