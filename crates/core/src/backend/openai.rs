//! HTTP backends for OpenAI-style completion APIs.
//!
//! Two wire formats are supported: the OpenAI Responses API and the
//! Chat Completions API spoken by most self-hosted servers (Ollama, vLLM).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::CompletionBackend;
use crate::config::{BackendConfig, BackendKind};
use crate::errors::BackendError;
use crate::prompt::Prompt;

/// One configured HTTP completion endpoint.
pub struct HttpBackend {
    name: String,
    kind: BackendKind,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base = config.api_url.trim_end_matches('/');
        let endpoint = match config.kind {
            BackendKind::OpenAiResponses => format!("{base}/responses"),
            BackendKind::ChatCompletions => format!("{base}/chat/completions"),
        };
        let timeout = Duration::from_secs(config.timeout_secs);

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("llmmerge/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        info!(name = %config.name, endpoint = %endpoint, model = %config.model, "created HTTP backend");
        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            model: config.model.clone(),
            endpoint,
            api_key: config.api_key.clone(),
            timeout,
            http,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        let messages = json!([
            {"role": "system", "content": prompt.system},
            {"role": "user", "content": prompt.user},
        ]);
        match self.kind {
            BackendKind::OpenAiResponses => json!({
                "model": self.model,
                "input": messages,
            }),
            BackendKind::ChatCompletions => json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
            }),
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, prompt), fields(backend = %self.name, model = %self.model))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        debug!(bytes = prompt.len(), "sending completion request");

        let mut req = self.http.post(&self.endpoint).json(&self.request_body(prompt));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!(status = %status, "completion API returned error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| BackendError::Malformed(format!("response is not JSON: {e}")))?;
        let reply = match self.kind {
            BackendKind::OpenAiResponses => parse_responses_text(&body),
            BackendKind::ChatCompletions => parse_chat_text(&body),
        };
        reply.ok_or_else(|| BackendError::Malformed("no text in completion response".into()))
    }
}

/// Text of a Responses API body: `output_text`, or the concatenated text
/// parts of its `message` output items.
pub fn parse_responses_text(body: &Value) -> Option<String> {
    if let Some(s) = body.get("output_text").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    let mut buf = String::new();
    for item in body.get("output").and_then(|v| v.as_array())? {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        for part in item.get("content").and_then(|v| v.as_array()).into_iter().flatten() {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                buf.push_str(t);
            }
        }
    }
    (!buf.is_empty()).then_some(buf)
}

/// Text of a Chat Completions body: `choices[0].message.content`.
pub fn parse_chat_text(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
