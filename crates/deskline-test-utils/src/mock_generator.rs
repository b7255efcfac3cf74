// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock text generator for deterministic testing.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use deskline_core::{
    AdapterType, DesklineError, GenerationRequest, HealthStatus, PluginAdapter, TextGenerator,
};

/// A text generator that returns pre-configured replies.
///
/// Replies are popped from a FIFO queue; an `Err` entry fails that call with
/// `AiUnavailable`. When the queue is empty, "mock reply" is returned.
pub struct MockGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::from_queue(VecDeque::new())
    }

    pub fn with_replies(replies: Vec<String>) -> Self {
        Self::from_queue(replies.into_iter().map(Ok).collect())
    }

    /// A generator whose every call fails.
    pub fn failing(message: &str) -> Self {
        Self::from_queue(std::iter::repeat_n(Err(message.to_string()), 64).collect())
    }

    fn from_queue(replies: VecDeque<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleeps before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_reply(&self, reply: Result<String, String>) {
        self.replies.lock().await.push_back(reply);
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
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
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DesklineError> {
        self.requests.lock().await.push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.replies.lock().await.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(DesklineError::AiUnavailable {
                message,
                source: None,
            }),
            None => Ok("mock reply".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "sys".into(),
            temperature: 0.5,
            history: vec![],
        }
    }

    #[tokio::test]
    async fn replies_then_default() {
        let generator = MockGenerator::with_replies(vec!["first".into()]);
        assert_eq!(generator.generate(&request()).await.unwrap(), "first");
        assert_eq!(generator.generate(&request()).await.unwrap(), "mock reply");
        assert_eq!(generator.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn failing_generator_reports_ai_unavailable() {
        let generator = MockGenerator::failing("down");
        assert!(matches!(
            generator.generate(&request()).await,
            Err(DesklineError::AiUnavailable { .. })
        ));
    }
}
