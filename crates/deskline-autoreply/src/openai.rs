// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completions generator.
//!
//! Posts to `{base_url}/chat/completions` with bearer auth. Transient
//! statuses (429, 500, 502, 503) are retried once after a 1-second delay.

use std::time::Duration;

use async_trait::async_trait;
use deskline_config::model::ProviderConfig;
use deskline_core::{
    AdapterType, DesklineError, GenerationRequest, HealthStatus, HistoryRole, PluginAdapter,
    TextGenerator,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse};

const RETRY_DELAY: Duration = Duration::from_secs(1);

fn unavailable(message: String, source: Option<reqwest::Error>) -> DesklineError {
    DesklineError::AiUnavailable {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

pub struct OpenAiCompatGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

impl OpenAiCompatGenerator {
    /// Returns `Ok(None)` when no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Result<Option<Self>, DesklineError> {
        match &config.api_key {
            Some(key) if !key.trim().is_empty() => {
                Self::new(&config.base_url, key, &config.model).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, DesklineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| DesklineError::Config(format!("invalid API key header value: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| unavailable(format!("failed to build HTTP client: {e}"), Some(e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            max_retries: 1,
        })
    }

    fn chat_request(&self, request: &GenerationRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.history.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage::new("system", request.system_prompt.clone()));
        }
        messages.extend(request.history.iter().map(|turn| {
            let role = match turn.role {
                HistoryRole::Contact => "user",
                HistoryRole::Agent => "assistant",
            };
            ChatMessage::new(role, turn.text.clone())
        }));
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, DesklineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DesklineError> {
        Ok(())
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DesklineError> {
        let body = self.chat_request(request);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying completion request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| unavailable(format!("HTTP request failed: {e}"), Some(e)))?;
            let status = response.status();
            debug!(status = %status, attempt, "completion response received");

            if status.is_success() {
                let parsed: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| unavailable(format!("failed to parse API response: {e}"), Some(e)))?;
                let text = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(unavailable("provider returned an empty completion".into(), None));
                }
                return Ok(text.trim().to_string());
            }

            if is_transient_error(status.as_u16()) && attempt < self.max_retries {
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(err) => format!("provider error ({status}): {}", err.error.message),
                Err(_) => format!("provider returned {status}: {text}"),
            };
            return Err(unavailable(message, None));
        }

        Err(unavailable(
            "completion request failed after retries".into(),
            None,
        ))
    }
}

fn is_transient_error(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::HistoryTurn;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "Você é um atendente.".into(),
            temperature: 0.7,
            history: vec![
                HistoryTurn {
                    role: HistoryRole::Contact,
                    text: "Oi".into(),
                },
                HistoryTurn {
                    role: HistoryRole::Agent,
                    text: "Olá!".into(),
                },
                HistoryTurn {
                    role: HistoryRole::Contact,
                    text: "Qual o preço?".into(),
                },
            ],
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    fn generator(server: &MockServer) -> OpenAiCompatGenerator {
        OpenAiCompatGenerator::new(&format!("{}/v1/", server.uri()), "sk-test", "gpt-test").unwrap()
    }

    #[tokio::test]
    async fn generate_maps_history_to_chat_roles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-test",
                "messages": [
                    { "role": "system", "content": "Você é um atendente." },
                    { "role": "user", "content": "Oi" },
                    { "role": "assistant", "content": "Olá!" },
                    { "role": "user", "content": "Qual o preço?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  R$ 10  ")))
            .expect(1)
            .mount(&server)
            .await;

        let text = generator(&server).generate(&request()).await.unwrap();
        assert_eq!(text, "R$ 10");
    }

    #[tokio::test]
    async fn empty_completion_is_ai_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;
        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, DesklineError::AiUnavailable { .. }));
    }

    #[tokio::test]
    async fn retries_once_on_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .mount(&server)
            .await;
        assert_eq!(generator(&server).generate(&request()).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "invalid api key" }
            })))
            .mount(&server)
            .await;
        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(err.to_string().contains("invalid api key"), "got: {err}");
    }

    #[test]
    fn missing_api_key_disables_the_provider() {
        assert!(
            OpenAiCompatGenerator::from_config(&ProviderConfig::default())
                .unwrap()
                .is_none()
        );
    }
}
