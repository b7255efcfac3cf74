// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket life cycle and queue assignment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use deskline_config::model::PlanConfig;
use deskline_core::{
    Agent, AgentId, AgentPresence, DesklineError, InboundMessage, InboundObserver, InboundOutcome,
    InboundRecord, Instance, Message, MessageId, MessageStatus, Queue, QueueDisposal, QueueId,
    StorageAdapter, TenantId, Ticket, TicketId, TicketView,
};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::dispatch::{OutboundDispatcher, OutboundRequest};

#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Agent quota for tenants without a persisted limit.
    pub default_agent_limit: u32,
}

impl RouterSettings {
    pub fn from_config(plan: &PlanConfig) -> Self {
        Self {
            default_agent_limit: plan.max_agents,
        }
    }
}

/// Routes inbound conversations into queues and drives ticket ownership.
pub struct TicketRouter {
    storage: Arc<dyn StorageAdapter>,
    dispatcher: OutboundDispatcher,
    settings: RouterSettings,
    observers: Vec<Arc<dyn InboundObserver>>,
    tasks: TaskTracker,
}

impl TicketRouter {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        dispatcher: OutboundDispatcher,
        settings: RouterSettings,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            settings,
            observers: Vec::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Registers an observer notified after each committed inbound message.
    pub fn with_observer(mut self, observer: Arc<dyn InboundObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn dispatcher(&self) -> &OutboundDispatcher {
        &self.dispatcher
    }

    /// Waits for every observer task spawned so far.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    async fn ticket(&self, id: &TicketId) -> Result<Ticket, DesklineError> {
        self.storage
            .get_ticket(id)
            .await?
            .ok_or_else(|| DesklineError::not_found("ticket", id))
    }

    async fn agent_in(&self, id: &AgentId, tenant: &TenantId) -> Result<Agent, DesklineError> {
        match self.storage.get_agent(id).await? {
            Some(agent) if &agent.tenant_id == tenant => Ok(agent),
            _ => Err(DesklineError::not_found("agent", id)),
        }
    }

    async fn queue_in(&self, id: &QueueId, tenant: &TenantId) -> Result<Queue, DesklineError> {
        match self.storage.get_queue(id).await? {
            Some(queue) if &queue.tenant_id == tenant => Ok(queue),
            _ => Err(DesklineError::not_found("queue", id)),
        }
    }

    async fn instance_in(
        &self,
        inbound: &InboundMessage,
    ) -> Result<Instance, DesklineError> {
        match self.storage.get_instance(&inbound.instance_id).await? {
            Some(instance) if instance.owner_id == inbound.tenant_id => Ok(instance),
            _ => Err(DesklineError::not_found("instance", &inbound.instance_id)),
        }
    }

    // --- Inbound ---

    /// Files an inbound message against the contact's active ticket, creating
    /// a `pending` ticket in the routing queue when there is none.
    ///
    /// Observers are notified on a background task once the write commits.
    pub async fn route_inbound(
        &self,
        inbound: InboundMessage,
    ) -> Result<InboundOutcome, DesklineError> {
        let instance = self.instance_in(&inbound).await?;
        let default_queue_id = match instance.default_queue_id {
            Some(queue) => Some(queue),
            None => self
                .storage
                .get_tenant_settings(&inbound.tenant_id)
                .await?
                .and_then(|s| s.default_queue_id),
        };

        let outcome = self
            .storage
            .record_inbound(&InboundRecord {
                tenant_id: inbound.tenant_id,
                instance_id: inbound.instance_id,
                contact_address: inbound.contact_address,
                contact_name: inbound.contact_name,
                body: inbound.body,
                default_queue_id,
            })
            .await?;

        info!(
            ticket_id = %outcome.ticket.id,
            instance_id = %instance.id,
            created = outcome.ticket_created,
            unread = outcome.ticket.unread_count,
            "inbound message routed"
        );

        for observer in &self.observers {
            let observer = Arc::clone(observer);
            let ticket = outcome.ticket.clone();
            let message = outcome.message.clone();
            self.tasks.spawn(async move {
                observer.on_inbound(&ticket, &message).await;
            });
        }
        Ok(outcome)
    }

    // --- Ownership ---

    /// Takes ownership of a pending ticket. Exactly one concurrent claimer wins;
    /// the others get `AlreadyClaimed`.
    pub async fn claim(&self, ticket: &TicketId, agent: &AgentId) -> Result<Ticket, DesklineError> {
        let current = self.ticket(ticket).await?;
        self.agent_in(agent, &current.tenant_id).await?;
        let claimed = self.storage.claim_ticket(ticket, agent).await?;
        info!(ticket_id = %ticket, agent_id = %agent, "ticket claimed");
        Ok(claimed)
    }

    pub async fn transfer_to_queue(
        &self,
        ticket: &TicketId,
        queue: &QueueId,
    ) -> Result<Ticket, DesklineError> {
        let current = self.ticket(ticket).await?;
        self.queue_in(queue, &current.tenant_id).await?;
        let moved = self.storage.transfer_to_queue(ticket, queue).await?;
        info!(ticket_id = %ticket, queue_id = %queue, "ticket transferred to queue");
        Ok(moved)
    }

    pub async fn transfer_to_agent(
        &self,
        ticket: &TicketId,
        agent: &AgentId,
    ) -> Result<Ticket, DesklineError> {
        let current = self.ticket(ticket).await?;
        self.agent_in(agent, &current.tenant_id).await?;
        let moved = self.storage.transfer_to_agent(ticket, agent).await?;
        info!(ticket_id = %ticket, agent_id = %agent, "ticket transferred to agent");
        Ok(moved)
    }

    /// Closes an open ticket. Resolving a closed ticket returns it unchanged.
    pub async fn resolve(
        &self,
        ticket: &TicketId,
        by: Option<&AgentId>,
    ) -> Result<Ticket, DesklineError> {
        let resolved = self.storage.resolve_ticket(ticket, by).await?;
        info!(ticket_id = %ticket, "ticket resolved");
        Ok(resolved)
    }

    pub async fn return_to_queue(&self, ticket: &TicketId) -> Result<Ticket, DesklineError> {
        let returned = self.storage.return_to_queue(ticket).await?;
        info!(ticket_id = %ticket, "ticket returned to queue");
        Ok(returned)
    }

    pub async fn acknowledge_read(&self, ticket: &TicketId) -> Result<Ticket, DesklineError> {
        self.storage.acknowledge_read(ticket).await
    }

    pub async fn decrement_unread(
        &self,
        ticket: &TicketId,
        n: u32,
    ) -> Result<Ticket, DesklineError> {
        self.storage.decrement_unread(ticket, n).await
    }

    // --- Queries ---

    pub async fn get_ticket(&self, ticket: &TicketId) -> Result<Ticket, DesklineError> {
        self.ticket(ticket).await
    }

    /// Tickets for a view, most recently updated first.
    pub async fn list_tickets(
        &self,
        tenant: &TenantId,
        view: &TicketView,
    ) -> Result<Vec<Ticket>, DesklineError> {
        self.storage.list_tickets(tenant, view).await
    }

    /// Messages ordered by `(created_at, id)`, strictly after `after` when given.
    pub async fn history(
        &self,
        ticket: &TicketId,
        after: Option<(DateTime<Utc>, MessageId)>,
        limit: u32,
    ) -> Result<Vec<Message>, DesklineError> {
        self.ticket(ticket).await?;
        self.storage.messages_since(ticket, after, limit).await
    }

    // --- Messages ---

    /// Sends a human reply. See [`OutboundDispatcher::send`].
    pub async fn send_message(
        &self,
        ticket: &TicketId,
        body: &str,
        correlation_id: Option<String>,
    ) -> Result<Message, DesklineError> {
        self.dispatcher
            .send(OutboundRequest::human(ticket.clone(), body).with_correlation(correlation_id))
            .await
    }

    /// Applies a delivery or read receipt. Stale receipts are ignored.
    pub async fn mark_message_status(
        &self,
        message: &MessageId,
        status: MessageStatus,
    ) -> Result<Message, DesklineError> {
        let updated = self.storage.advance_message_status(message, status).await?;
        debug!(message_id = %message, status = %updated.status, "message status applied");
        Ok(updated)
    }

    // --- Queues and agents ---

    pub async fn create_queue(
        &self,
        tenant: &TenantId,
        name: &str,
        color: Option<String>,
    ) -> Result<Queue, DesklineError> {
        let queue = Queue {
            id: QueueId::generate(),
            tenant_id: tenant.clone(),
            name: name.to_string(),
            color,
        };
        self.storage.create_queue(&queue).await?;
        info!(queue_id = %queue.id, tenant_id = %tenant, name, "queue created");
        Ok(queue)
    }

    pub async fn list_queues(&self, tenant: &TenantId) -> Result<Vec<Queue>, DesklineError> {
        self.storage.list_queues(tenant).await
    }

    /// Deletes a queue. Its tickets are reassigned or orphaned, never deleted.
    pub async fn delete_queue(
        &self,
        queue: &QueueId,
        disposal: QueueDisposal,
    ) -> Result<u64, DesklineError> {
        let current = self
            .storage
            .get_queue(queue)
            .await?
            .ok_or_else(|| DesklineError::not_found("queue", queue))?;
        if let QueueDisposal::ReassignTo(target) = &disposal {
            self.queue_in(target, &current.tenant_id).await?;
        }
        let touched = self.storage.delete_queue(queue, disposal).await?;
        info!(queue_id = %queue, tickets = touched, "queue deleted");
        Ok(touched)
    }

    /// Adds an agent, enforcing the tenant's agent quota.
    pub async fn register_agent(
        &self,
        tenant: &TenantId,
        identity_ref: &str,
        display_name: &str,
    ) -> Result<Agent, DesklineError> {
        let limit = self
            .storage
            .get_tenant_settings(tenant)
            .await?
            .and_then(|s| s.agent_limit)
            .unwrap_or(self.settings.default_agent_limit);
        let agent = Agent {
            id: AgentId::generate(),
            tenant_id: tenant.clone(),
            identity_ref: identity_ref.to_string(),
            display_name: display_name.to_string(),
            presence: AgentPresence::Offline,
        };
        self.storage.create_agent(&agent, limit).await?;
        info!(agent_id = %agent.id, tenant_id = %tenant, "agent registered");
        Ok(agent)
    }

    pub async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, DesklineError> {
        self.storage.list_agents(tenant).await
    }

    pub async fn set_agent_presence(
        &self,
        agent: &AgentId,
        presence: AgentPresence,
    ) -> Result<Agent, DesklineError> {
        self.storage.set_agent_presence(agent, presence).await
    }
}
