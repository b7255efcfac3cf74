// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message path: persist first, then hand to the gateway.

use std::sync::Arc;

use deskline_core::types::now;
use deskline_core::{
    ChannelGateway, DesklineError, InstanceStatus, Message, MessageDirection, MessageId,
    MessageStatus, StorageAdapter, Ticket, TicketId,
};
use deskline_gateway::EndpointResolver;
use tracing::{debug, info, warn};

/// One outbound text for a ticket.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub ticket_id: TicketId,
    pub body: String,
    /// Ties an optimistic client entry to the persisted message.
    pub correlation_id: Option<String>,
    pub is_ai_generated: bool,
}

impl OutboundRequest {
    pub fn human(ticket_id: TicketId, body: impl Into<String>) -> Self {
        Self {
            ticket_id,
            body: body.into(),
            correlation_id: None,
            is_ai_generated: false,
        }
    }

    pub fn ai(ticket_id: TicketId, body: impl Into<String>) -> Self {
        Self {
            is_ai_generated: true,
            ..Self::human(ticket_id, body)
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Sends outbound text through the ticket's instance.
#[derive(Clone)]
pub struct OutboundDispatcher {
    storage: Arc<dyn StorageAdapter>,
    gateway: Arc<dyn ChannelGateway>,
    endpoints: EndpointResolver,
}

impl OutboundDispatcher {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        gateway: Arc<dyn ChannelGateway>,
        endpoints: EndpointResolver,
    ) -> Self {
        Self {
            storage,
            gateway,
            endpoints,
        }
    }

    /// Persists the message, then pushes it through the gateway.
    ///
    /// A gateway failure does not fail the call: the message is marked
    /// `failed` and returned in that state.
    pub async fn send(&self, request: OutboundRequest) -> Result<Message, DesklineError> {
        let ticket = self
            .storage
            .get_ticket(&request.ticket_id)
            .await?
            .ok_or_else(|| DesklineError::not_found("ticket", &request.ticket_id))?;
        let message = self
            .storage
            .insert_outbound(&Message {
                id: MessageId::generate(),
                ticket_id: ticket.id.clone(),
                direction: MessageDirection::Outbound,
                body: request.body,
                status: MessageStatus::Sent,
                is_ai_generated: request.is_ai_generated,
                correlation_id: request.correlation_id,
                // Restamped by storage at commit.
                created_at: now(),
            })
            .await?;
        debug!(
            ticket_id = %ticket.id,
            message_id = %message.id,
            ai = message.is_ai_generated,
            "outbound message persisted"
        );

        match self.deliver(&ticket, &message).await {
            Ok(()) => {
                info!(ticket_id = %ticket.id, message_id = %message.id, "outbound message sent");
                Ok(message)
            }
            Err(e) => {
                warn!(
                    ticket_id = %ticket.id,
                    message_id = %message.id,
                    error = %e,
                    "gateway send failed, marking message failed"
                );
                self.storage
                    .advance_message_status(&message.id, MessageStatus::Failed)
                    .await
            }
        }
    }

    async fn deliver(&self, ticket: &Ticket, message: &Message) -> Result<(), DesklineError> {
        let contact = self
            .storage
            .get_contact(&ticket.contact_id)
            .await?
            .ok_or_else(|| DesklineError::not_found("contact", &ticket.contact_id))?;
        let instance = self
            .storage
            .get_instance(&ticket.instance_id)
            .await?
            .ok_or_else(|| DesklineError::not_found("instance", &ticket.instance_id))?;
        if instance.status != InstanceStatus::Connected {
            return Err(DesklineError::GatewayUnreachable {
                message: format!("instance {} is {}", instance.id, instance.status),
                source: None,
            });
        }
        let endpoint = self.endpoints.endpoint(&instance).await?;
        self.gateway
            .send_text(&endpoint, &contact.address, &message.body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::{InboundRecord, InstanceId};
    use deskline_test_utils::{MockGateway, TestHarness};

    struct Fixture {
        harness: TestHarness,
        gateway: Arc<MockGateway>,
        dispatcher: OutboundDispatcher,
    }

    async fn fixture() -> Fixture {
        let harness = TestHarness::new().await.unwrap();
        let gateway = Arc::new(MockGateway::new());
        let endpoints = EndpointResolver::new(harness.dyn_storage(), "http://gateway.test");
        let dispatcher = OutboundDispatcher::new(harness.dyn_storage(), gateway.clone(), endpoints);
        Fixture {
            harness,
            gateway,
            dispatcher,
        }
    }

    async fn ticket_on(harness: &TestHarness, instance: &InstanceId) -> Ticket {
        harness
            .storage
            .record_inbound(&InboundRecord {
                tenant_id: harness.tenant.clone(),
                instance_id: instance.clone(),
                contact_address: "5511999999999".to_string(),
                contact_name: None,
                body: "Oi".to_string(),
                default_queue_id: None,
            })
            .await
            .unwrap()
            .ticket
    }

    #[tokio::test]
    async fn send_persists_then_delivers_to_contact_address() {
        let f = fixture().await;
        let instance = f.harness.connected_instance("Main", None).await.unwrap();
        let ticket = ticket_on(&f.harness, &instance.id).await;

        let sent = f
            .dispatcher
            .send(OutboundRequest::human(ticket.id.clone(), "Olá!").with_correlation(Some("c-1".into())))
            .await
            .unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);
        assert_eq!(sent.correlation_id.as_deref(), Some("c-1"));
        assert!(!sent.is_ai_generated);

        let captured = f.gateway.sent_messages().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].jid, "5511999999999");
        assert_eq!(captured[0].text, "Olá!");
        assert_eq!(captured[0].instance_id, instance.id);

        let ticket = f.harness.storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        let last = ticket.last_message.unwrap();
        assert_eq!(last.body, "Olá!");
        assert_eq!(last.direction, MessageDirection::Outbound);
    }

    #[tokio::test]
    async fn gateway_failure_marks_message_failed() {
        let f = fixture().await;
        let instance = f.harness.connected_instance("Main", None).await.unwrap();
        let ticket = ticket_on(&f.harness, &instance.id).await;
        f.gateway.fail_sends(true);

        let message = f
            .dispatcher
            .send(OutboundRequest::ai(ticket.id.clone(), "auto"))
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert!(message.is_ai_generated);
        let stored = f.harness.storage.get_message(&message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn disconnected_instance_fails_the_message_without_calling_gateway() {
        let f = fixture().await;
        let instance = f.harness.connected_instance("Main", None).await.unwrap();
        let ticket = ticket_on(&f.harness, &instance.id).await;
        f.harness
            .storage
            .transition_instance(
                &instance.id,
                InstanceStatus::Connected,
                InstanceStatus::Uninitialized,
                None,
            )
            .await
            .unwrap();

        let message = f
            .dispatcher
            .send(OutboundRequest::human(ticket.id, "anyone?"))
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert_eq!(f.gateway.sent_count().await, 0);
    }

    #[tokio::test]
    async fn closed_ticket_rejects_send() {
        let f = fixture().await;
        let instance = f.harness.connected_instance("Main", None).await.unwrap();
        let ticket = ticket_on(&f.harness, &instance.id).await;
        let agent = f.harness.agent("ana").await.unwrap();
        f.harness.storage.claim_ticket(&ticket.id, &agent.id).await.unwrap();
        f.harness.storage.resolve_ticket(&ticket.id, Some(&agent.id)).await.unwrap();

        let err = f
            .dispatcher
            .send(OutboundRequest::human(ticket.id, "late"))
            .await
            .unwrap_err();
        assert!(matches!(err, DesklineError::InvalidTransition { .. }));
        assert_eq!(f.gateway.sent_count().await, 0);
    }

    #[tokio::test]
    async fn send_racing_resolve_never_lands_on_a_closed_ticket() {
        let f = fixture().await;
        let instance = f.harness.connected_instance("Main", None).await.unwrap();
        let ticket = ticket_on(&f.harness, &instance.id).await;
        let agent = f.harness.agent("ana").await.unwrap();
        f.harness.storage.claim_ticket(&ticket.id, &agent.id).await.unwrap();

        let (sent, closed) = tokio::join!(
            f.dispatcher
                .send(OutboundRequest::human(ticket.id.clone(), "last words")),
            f.harness.storage.resolve_ticket(&ticket.id, Some(&agent.id)),
        );
        let closed = closed.unwrap();
        match sent {
            Ok(message) => {
                let stored = f.harness.storage.get_message(&message.id).await.unwrap();
                assert!(stored.is_some());
            }
            Err(e) => assert!(matches!(e, DesklineError::InvalidTransition { .. })),
        }

        let stored = f.harness.storage.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, closed.updated_at);
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let f = fixture().await;
        let err = f
            .dispatcher
            .send(OutboundRequest::human(TicketId::from("nope"), "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, DesklineError::NotFound { .. }));
    }
}
