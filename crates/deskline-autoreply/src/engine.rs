// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-reply policy: decides whether to answer an inbound message and
//! sends the generated reply through the outbound dispatcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskline_config::model::AutoReplyConfig;
use deskline_core::{
    AutoReplySettings, DesklineError, GenerationRequest, HistoryRole, HistoryTurn,
    InboundObserver, Message, MessageDirection, StorageAdapter, TenantId, TextGenerator, Ticket,
    TicketStatus,
};
use deskline_router::{OutboundDispatcher, OutboundRequest};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AutoReplyPolicy {
    /// Upper bound on one generation call.
    pub timeout: Duration,
    pub history_limit: u32,
    pub only_unassigned: bool,
}

impl AutoReplyPolicy {
    pub fn from_config(config: &AutoReplyConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            history_limit: config.history_limit,
            only_unassigned: config.only_unassigned,
        }
    }
}

/// Answers inbound messages with generated text when a tenant opts in.
pub struct AutoReplyEngine {
    storage: Arc<dyn StorageAdapter>,
    generator: Option<Arc<dyn TextGenerator>>,
    dispatcher: OutboundDispatcher,
    policy: AutoReplyPolicy,
}

impl AutoReplyEngine {
    /// Without a generator the engine never replies.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        generator: Option<Arc<dyn TextGenerator>>,
        dispatcher: OutboundDispatcher,
        policy: AutoReplyPolicy,
    ) -> Self {
        Self {
            storage,
            generator,
            dispatcher,
            policy,
        }
    }

    /// The tenant's settings, or the disabled defaults if it never wrote any.
    pub async fn settings(&self, tenant: &TenantId) -> Result<AutoReplySettings, DesklineError> {
        Ok(self
            .storage
            .get_auto_reply(tenant)
            .await?
            .unwrap_or_else(|| AutoReplySettings::disabled(tenant.clone())))
    }

    /// Creates or replaces the tenant's settings.
    pub async fn update_settings(
        &self,
        settings: &AutoReplySettings,
    ) -> Result<AutoReplySettings, DesklineError> {
        let stored = self.storage.upsert_auto_reply(settings).await?;
        info!(
            tenant_id = %stored.tenant_id,
            enabled = stored.enabled,
            "auto-reply settings updated"
        );
        Ok(stored)
    }

    /// Runs the policy for one committed inbound message.
    ///
    /// `Ok(None)` means the policy chose not to reply. Errors leave the
    /// ticket untouched and available for a manual reply.
    pub async fn respond(
        &self,
        ticket: &Ticket,
        message: &Message,
    ) -> Result<Option<Message>, DesklineError> {
        if message.direction != MessageDirection::Inbound {
            return Ok(None);
        }
        let Some(generator) = &self.generator else {
            return Ok(None);
        };
        let settings = self.settings(&ticket.tenant_id).await?;
        if !settings.enabled {
            return Ok(None);
        }

        let current = self
            .storage
            .get_ticket(&ticket.id)
            .await?
            .ok_or_else(|| DesklineError::not_found("ticket", &ticket.id))?;
        if current.status == TicketStatus::Closed {
            return Ok(None);
        }
        if self.policy.only_unassigned && current.owner_id.is_some() {
            debug!(ticket_id = %ticket.id, "ticket has an owner, auto-reply skipped");
            return Ok(None);
        }

        let history = self
            .storage
            .recent_messages(&ticket.id, self.policy.history_limit)
            .await?
            .into_iter()
            .map(|m| HistoryTurn {
                role: match m.direction {
                    MessageDirection::Inbound => HistoryRole::Contact,
                    MessageDirection::Outbound => HistoryRole::Agent,
                },
                text: m.body,
            })
            .collect();
        let request = GenerationRequest {
            system_prompt: settings.system_prompt,
            temperature: settings.temperature,
            history,
        };

        let text = tokio::time::timeout(self.policy.timeout, generator.generate(&request))
            .await
            .map_err(|_| DesklineError::AiUnavailable {
                message: "generation timed out".to_string(),
                source: Some(Box::new(DesklineError::Timeout {
                    duration: self.policy.timeout,
                })),
            })??;
        if text.trim().is_empty() {
            return Err(DesklineError::AiUnavailable {
                message: "generator returned an empty reply".to_string(),
                source: None,
            });
        }

        let sent = self
            .dispatcher
            .send(OutboundRequest::ai(ticket.id.clone(), text))
            .await?;
        Ok(Some(sent))
    }
}

#[async_trait]
impl InboundObserver for AutoReplyEngine {
    async fn on_inbound(&self, ticket: &Ticket, message: &Message) {
        match self.respond(ticket, message).await {
            Ok(Some(reply)) => {
                info!(
                    ticket_id = %ticket.id,
                    message_id = %reply.id,
                    status = %reply.status,
                    "auto-reply sent"
                );
            }
            Ok(None) => debug!(ticket_id = %ticket.id, "auto-reply not applicable"),
            Err(e) => {
                warn!(
                    ticket_id = %ticket.id,
                    error = %e,
                    "auto-reply failed, ticket left for manual reply"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::{InboundRecord, Instance};
    use deskline_gateway::EndpointResolver;
    use deskline_test_utils::{MockGateway, MockGenerator, TestHarness};
    use tracing_test::traced_test;

    struct Fixture {
        harness: TestHarness,
        gateway: Arc<MockGateway>,
        generator: Arc<MockGenerator>,
        engine: AutoReplyEngine,
        instance: Instance,
    }

    async fn fixture_with(generator: MockGenerator, policy: AutoReplyPolicy) -> Fixture {
        let harness = TestHarness::new().await.unwrap();
        let gateway = Arc::new(MockGateway::new());
        let generator = Arc::new(generator);
        let endpoints = EndpointResolver::new(harness.dyn_storage(), "http://gateway.test");
        let dispatcher = OutboundDispatcher::new(harness.dyn_storage(), gateway.clone(), endpoints);
        let engine = AutoReplyEngine::new(
            harness.dyn_storage(),
            Some(generator.clone()),
            dispatcher,
            policy,
        );
        let instance = harness.connected_instance("Main", None).await.unwrap();
        Fixture {
            harness,
            gateway,
            generator,
            engine,
            instance,
        }
    }

    fn policy() -> AutoReplyPolicy {
        AutoReplyPolicy {
            timeout: Duration::from_millis(200),
            history_limit: 10,
            only_unassigned: false,
        }
    }

    impl Fixture {
        async fn inbound(&self, body: &str) -> (Ticket, Message) {
            let outcome = self
                .harness
                .storage
                .record_inbound(&InboundRecord {
                    tenant_id: self.harness.tenant.clone(),
                    instance_id: self.instance.id.clone(),
                    contact_address: "5511999999999".to_string(),
                    contact_name: None,
                    body: body.to_string(),
                    default_queue_id: None,
                })
                .await
                .unwrap();
            (outcome.ticket, outcome.message)
        }
    }

    #[tokio::test]
    async fn enabled_tenant_gets_one_ai_reply() {
        let f = fixture_with(MockGenerator::with_replies(vec!["Custa R$ 10.".into()]), policy()).await;
        f.harness
            .engine_settings(true, 0.7, "Você é um atendente.")
            .await;
        let (ticket, message) = f.inbound("Qual o preço?").await;

        let reply = f.engine.respond(&ticket, &message).await.unwrap().unwrap();
        assert!(reply.is_ai_generated);
        assert_eq!(reply.direction, MessageDirection::Outbound);
        assert_eq!(reply.body, "Custa R$ 10.");
        assert_eq!(f.gateway.sent_count().await, 1);

        let requests = f.generator.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system_prompt, "Você é um atendente.");
        assert!((requests[0].temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(
            requests[0].history,
            vec![HistoryTurn {
                role: HistoryRole::Contact,
                text: "Qual o preço?".into()
            }]
        );
    }

    #[tokio::test]
    async fn disabled_or_missing_settings_never_call_the_generator() {
        let f = fixture_with(MockGenerator::new(), policy()).await;
        let (ticket, message) = f.inbound("Oi").await;
        assert!(f.engine.respond(&ticket, &message).await.unwrap().is_none());

        f.harness.engine_settings(false, 0.5, "x").await;
        assert!(f.engine.respond(&ticket, &message).await.unwrap().is_none());
        assert!(f.generator.requests().await.is_empty());
        assert_eq!(f.gateway.sent_count().await, 0);
    }

    #[tokio::test]
    async fn timeout_produces_no_outbound_and_leaves_ticket_alone() {
        let f = fixture_with(
            MockGenerator::new().with_delay(Duration::from_secs(5)),
            policy(),
        )
        .await;
        f.harness.engine_settings(true, 0.7, "x").await;
        let (ticket, message) = f.inbound("Qual o preço?").await;

        let err = f.engine.respond(&ticket, &message).await.unwrap_err();
        let DesklineError::AiUnavailable {
            source: Some(source),
            ..
        } = &err
        else {
            panic!("expected AiUnavailable, got {err:?}");
        };
        assert!(matches!(
            source.downcast_ref::<DesklineError>(),
            Some(DesklineError::Timeout { .. })
        ));
        assert_eq!(f.gateway.sent_count().await, 0);

        let after = f.harness.storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(after.status, TicketStatus::Pending);
        let history = f.harness.storage.recent_messages(&ticket.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn generator_failure_is_swallowed_by_the_observer() {
        let f = fixture_with(MockGenerator::failing("provider down"), policy()).await;
        f.harness.engine_settings(true, 0.7, "x").await;
        let (ticket, message) = f.inbound("Oi").await;

        assert!(matches!(
            f.engine.respond(&ticket, &message).await,
            Err(DesklineError::AiUnavailable { .. })
        ));
        f.engine.on_inbound(&ticket, &message).await;
        assert_eq!(f.gateway.sent_count().await, 0);
        assert!(logs_contain("auto-reply failed"));
    }

    #[tokio::test]
    async fn empty_generation_is_ai_unavailable() {
        let f = fixture_with(MockGenerator::with_replies(vec!["  ".into()]), policy()).await;
        f.harness.engine_settings(true, 0.7, "x").await;
        let (ticket, message) = f.inbound("Oi").await;
        assert!(matches!(
            f.engine.respond(&ticket, &message).await,
            Err(DesklineError::AiUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn owned_tickets_are_skipped_when_only_unassigned() {
        let f = fixture_with(
            MockGenerator::new(),
            AutoReplyPolicy {
                only_unassigned: true,
                ..policy()
            },
        )
        .await;
        f.harness.engine_settings(true, 0.7, "x").await;
        let (ticket, message) = f.inbound("Oi").await;
        let agent = f.harness.agent("ana").await.unwrap();
        f.harness.storage.claim_ticket(&ticket.id, &agent.id).await.unwrap();

        assert!(f.engine.respond(&ticket, &message).await.unwrap().is_none());
        assert!(f.generator.requests().await.is_empty());
    }

    #[tokio::test]
    async fn outbound_messages_do_not_trigger_replies() {
        let f = fixture_with(MockGenerator::new(), policy()).await;
        f.harness.engine_settings(true, 0.7, "x").await;
        let (ticket, mut message) = f.inbound("Oi").await;
        message.direction = MessageDirection::Outbound;
        assert!(f.engine.respond(&ticket, &message).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settings_default_to_disabled_and_validate_temperature() {
        let f = fixture_with(MockGenerator::new(), policy()).await;
        let tenant = f.harness.tenant.clone();
        let defaults = f.engine.settings(&tenant).await.unwrap();
        assert!(!defaults.enabled);

        let mut bad = defaults.clone();
        bad.temperature = 1.5;
        assert!(matches!(
            f.engine.update_settings(&bad).await,
            Err(DesklineError::Config(_))
        ));

        let mut good = defaults;
        good.enabled = true;
        good.system_prompt = "Seja breve.".into();
        f.engine.update_settings(&good).await.unwrap();
        assert_eq!(f.engine.settings(&tenant).await.unwrap(), good);
    }

    trait SettingsExt {
        async fn engine_settings(&self, enabled: bool, temperature: f32, prompt: &str);
    }

    impl SettingsExt for TestHarness {
        async fn engine_settings(&self, enabled: bool, temperature: f32, prompt: &str) {
            self.storage
                .upsert_auto_reply(&AutoReplySettings {
                    tenant_id: self.tenant.clone(),
                    enabled,
                    temperature,
                    system_prompt: prompt.to_string(),
                })
                .await
                .unwrap();
        }
    }
}
