// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.
//!
//! Every state-changing method is a single atomic conditional write. A failed
//! precondition is reported as a domain error, never as a partial update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DesklineError;
use crate::feed::{FeedFilter, FeedSubscription};
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Agent, AgentId, AgentPresence, AutoReplySettings, Contact, ContactId, Instance, InstanceId,
    InstanceStatus, Message, MessageId, MessageStatus, Queue, QueueDisposal, QueueId, TenantId,
    TenantSettings, Ticket, TicketId, TicketView,
};

/// An inbound message ready to be filed against a ticket.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub tenant_id: TenantId,
    pub instance_id: InstanceId,
    pub contact_address: String,
    pub contact_name: Option<String>,
    pub body: String,
    /// Queue assigned when a new ticket has to be created.
    pub default_queue_id: Option<QueueId>,
}

/// Result of filing an inbound message.
#[derive(Debug, Clone)]
pub struct InboundOutcome {
    pub ticket: Ticket,
    pub message: Message,
    pub contact: Contact,
    /// True when no active ticket existed for the contact.
    pub ticket_created: bool,
}

#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection).
    async fn initialize(&self) -> Result<(), DesklineError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), DesklineError>;

    /// Subscribes to committed changes.
    fn subscribe(&self, filter: FeedFilter) -> FeedSubscription;

    // --- Instances ---

    /// Inserts an instance. When its status holds a quota slot the insert
    /// only happens if fewer than `limit` of the owner's instances hold one.
    async fn create_instance(&self, instance: &Instance, limit: u32) -> Result<(), DesklineError>;

    async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, DesklineError>;

    async fn list_instances(&self, owner: &TenantId) -> Result<Vec<Instance>, DesklineError>;

    /// Moves `uninitialized`/`failed` to `generating_code` iff fewer than
    /// `limit` of the owner's instances hold a quota slot.
    async fn begin_pairing(&self, id: &InstanceId, limit: u32) -> Result<Instance, DesklineError>;

    /// Moves the instance from `from` to `to` iff it is currently in `from`.
    /// `phone` is written when `to` is `connected` and cleared otherwise.
    async fn transition_instance(
        &self,
        id: &InstanceId,
        from: InstanceStatus,
        to: InstanceStatus,
        phone: Option<String>,
    ) -> Result<Instance, DesklineError>;

    /// Deletes an instance that is `uninitialized`.
    async fn delete_instance(&self, id: &InstanceId) -> Result<(), DesklineError>;

    /// Instances in `generating_code`, `awaiting_scan` or `connected`.
    async fn count_active_instances(&self, owner: &TenantId) -> Result<u32, DesklineError>;

    /// Instances stuck mid-pairing, e.g. after a restart.
    async fn list_pairing_instances(&self) -> Result<Vec<Instance>, DesklineError>;

    // --- Queues ---

    async fn create_queue(&self, queue: &Queue) -> Result<(), DesklineError>;

    async fn get_queue(&self, id: &QueueId) -> Result<Option<Queue>, DesklineError>;

    async fn list_queues(&self, tenant: &TenantId) -> Result<Vec<Queue>, DesklineError>;

    /// Deletes a queue, disposing of its tickets. Returns the number of tickets touched.
    async fn delete_queue(
        &self,
        id: &QueueId,
        disposal: QueueDisposal,
    ) -> Result<u64, DesklineError>;

    // --- Agents ---

    /// Inserts an agent iff the tenant has fewer than `limit` agents.
    async fn create_agent(&self, agent: &Agent, limit: u32) -> Result<(), DesklineError>;

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, DesklineError>;

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, DesklineError>;

    async fn set_agent_presence(
        &self,
        id: &AgentId,
        presence: AgentPresence,
    ) -> Result<Agent, DesklineError>;

    // --- Contacts ---

    async fn get_contact(&self, id: &ContactId) -> Result<Option<Contact>, DesklineError>;

    // --- Tickets ---

    /// Files an inbound message: upserts the contact, finds or creates the
    /// contact's active ticket, inserts the message and bumps unread and
    /// last-message fields. One transaction.
    async fn record_inbound(&self, record: &InboundRecord) -> Result<InboundOutcome, DesklineError>;

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, DesklineError>;

    /// Tickets matching the view, most recently updated first.
    async fn list_tickets(
        &self,
        tenant: &TenantId,
        view: &TicketView,
    ) -> Result<Vec<Ticket>, DesklineError>;

    /// `pending -> open` with `owner = agent`, iff the ticket is still unowned and pending.
    /// A lost race yields `AlreadyClaimed`.
    async fn claim_ticket(&self, id: &TicketId, agent: &AgentId) -> Result<Ticket, DesklineError>;

    /// `open -> pending` with the owner cleared and the queue replaced.
    async fn transfer_to_queue(
        &self,
        id: &TicketId,
        queue: &QueueId,
    ) -> Result<Ticket, DesklineError>;

    /// Reassigns the owner of an `open` ticket without touching its status.
    async fn transfer_to_agent(
        &self,
        id: &TicketId,
        agent: &AgentId,
    ) -> Result<Ticket, DesklineError>;

    /// `open -> closed`; clears the owner and records who resolved it.
    /// Resolving a closed ticket is a no-op; resolving a pending one is rejected.
    async fn resolve_ticket(
        &self,
        id: &TicketId,
        by: Option<&AgentId>,
    ) -> Result<Ticket, DesklineError>;

    /// `open -> pending` keeping the ticket's queue; `NoQueueAssigned` when it has none.
    async fn return_to_queue(&self, id: &TicketId) -> Result<Ticket, DesklineError>;

    /// Resets `unread_count` to zero.
    async fn acknowledge_read(&self, id: &TicketId) -> Result<Ticket, DesklineError>;

    /// Decrements `unread_count` by `n`, never below zero.
    async fn decrement_unread(&self, id: &TicketId, n: u32) -> Result<Ticket, DesklineError>;

    // --- Messages ---

    /// Inserts an outbound message and refreshes the ticket's last-message fields.
    async fn insert_outbound(&self, message: &Message) -> Result<Message, DesklineError>;

    async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, DesklineError>;

    /// Messages of a ticket ordered by `(created_at, id)`, strictly after `after` when given.
    async fn messages_since(
        &self,
        ticket: &TicketId,
        after: Option<(DateTime<Utc>, MessageId)>,
        limit: u32,
    ) -> Result<Vec<Message>, DesklineError>;

    /// The newest `limit` messages of a ticket, returned oldest first.
    async fn recent_messages(
        &self,
        ticket: &TicketId,
        limit: u32,
    ) -> Result<Vec<Message>, DesklineError>;

    /// Advances a message's status. Stale receipts leave the row unchanged.
    async fn advance_message_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<Message, DesklineError>;

    // --- Settings ---

    async fn get_auto_reply(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<AutoReplySettings>, DesklineError>;

    async fn upsert_auto_reply(
        &self,
        settings: &AutoReplySettings,
    ) -> Result<AutoReplySettings, DesklineError>;

    async fn get_tenant_settings(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<TenantSettings>, DesklineError>;

    async fn upsert_tenant_settings(&self, settings: &TenantSettings) -> Result<(), DesklineError>;
}
