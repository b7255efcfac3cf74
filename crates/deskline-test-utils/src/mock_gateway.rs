// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel gateway for deterministic testing.
//!
//! `MockGateway` implements `ChannelGateway` with a scripted sequence of
//! pairing polls and captures every outbound send for assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use deskline_core::{
    AdapterType, ChannelGateway, DesklineError, GatewayEndpoint, HealthStatus, InstanceId,
    PairingPoll, PluginAdapter,
};

/// One captured `send_text` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub instance_id: InstanceId,
    pub jid: String,
    pub text: String,
}

/// A mock gateway bridge.
///
/// Polls pop from the script until one entry is left, which then repeats.
/// A `None` entry makes that poll fail with `GatewayUnreachable`.
pub struct MockGateway {
    polls: Mutex<VecDeque<Option<PairingPoll>>>,
    sent: Mutex<Vec<SentText>>,
    teardowns: Mutex<Vec<InstanceId>>,
    fail_sends: AtomicBool,
    notify: Arc<Notify>,
}

fn scripted_failure(what: &str) -> DesklineError {
    DesklineError::GatewayUnreachable {
        message: format!("mock gateway {what} failure"),
        source: None,
    }
}

impl MockGateway {
    /// A gateway whose polls always report `Waiting`.
    pub fn new() -> Self {
        Self::with_polls(vec![Some(PairingPoll::Waiting)])
    }

    pub fn with_polls(polls: Vec<Option<PairingPoll>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            sent: Mutex::new(Vec::new()),
            teardowns: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Replaces the poll script.
    pub async fn set_polls(&self, polls: Vec<Option<PairingPoll>>) {
        *self.polls.lock().await = polls.into();
    }

    /// Makes every subsequent `send_text` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<SentText> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn teardowns(&self) -> Vec<InstanceId> {
        self.teardowns.lock().await.clone()
    }

    /// Waits until at least `count` sends were captured, or `timeout` passes.
    /// Returns whether the count was reached.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.sent_count().await >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, DesklineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DesklineError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelGateway for MockGateway {
    async fn poll_pairing(&self, _endpoint: &GatewayEndpoint) -> Result<PairingPoll, DesklineError> {
        let mut polls = self.polls.lock().await;
        let next = if polls.len() > 1 {
            polls.pop_front().flatten()
        } else {
            polls.front().cloned().flatten()
        };
        next.ok_or_else(|| scripted_failure("poll"))
    }

    async fn send_text(
        &self,
        endpoint: &GatewayEndpoint,
        jid: &str,
        text: &str,
    ) -> Result<(), DesklineError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(scripted_failure("send"));
        }
        self.sent.lock().await.push(SentText {
            instance_id: endpoint.instance_id.clone(),
            jid: jid.to_string(),
            text: text.to_string(),
        });
        self.notify.notify_waiters();
        Ok(())
    }

    async fn teardown(&self, endpoint: &GatewayEndpoint) -> Result<(), DesklineError> {
        self.teardowns.lock().await.push(endpoint.instance_id.clone());
        Ok(())
    }
}
