// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.
//!
//! Query modules report guard outcomes; this layer turns rejections into
//! domain errors and publishes a change event for every committed write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use deskline_config::model::StorageConfig;
use deskline_core::{
    AdapterType, Agent, AgentId, AgentPresence, AutoReplySettings, ChangeEvent, ChangeKind,
    ChangeRow, Contact, ContactId, DesklineError, FeedFilter, FeedHub, FeedSubscription,
    HealthStatus, InboundOutcome, InboundRecord, Instance, InstanceId, InstanceStatus, Message,
    MessageId, MessageStatus, PluginAdapter, Queue, QueueDisposal, QueueId, StorageAdapter,
    TenantId, TenantSettings, Ticket, TicketId, TicketStatus, TicketView,
};

use crate::database::Database;
use crate::queries::{self, Guarded};
use crate::queries::messages::StatusChange;
use crate::queries::queues::QueueRemoval;

/// SQLite-backed storage adapter.
///
/// The database opens on [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
    feed: FeedHub,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        let feed = FeedHub::new(config.feed_capacity);
        Self {
            config,
            db: OnceCell::new(),
            feed,
        }
    }

    fn db(&self) -> Result<&Database, DesklineError> {
        self.db.get().ok_or_else(|| DesklineError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// The hub change events are published to.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    fn publish(&self, kind: ChangeKind, row: ChangeRow) {
        self.feed.publish(ChangeEvent::new(kind, row));
    }

    fn ticket_updated(&self, ticket: &Ticket) {
        self.publish(ChangeKind::Update, ChangeRow::Ticket(ticket.clone()));
    }

    fn instance_updated(&self, instance: &Instance) {
        self.publish(ChangeKind::Update, ChangeRow::Instance(instance.clone()));
    }
}

fn ticket_missing(id: &TicketId) -> DesklineError {
    DesklineError::not_found("ticket", id)
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DesklineError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DesklineError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        self.feed.reset();
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), DesklineError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| DesklineError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), DesklineError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn subscribe(&self, filter: FeedFilter) -> FeedSubscription {
        self.feed.subscribe(filter)
    }

    // --- Instances ---

    async fn create_instance(&self, instance: &Instance, limit: u32) -> Result<(), DesklineError> {
        if !queries::instances::create_instance(self.db()?, instance, limit).await? {
            return Err(DesklineError::QuotaExceeded {
                resource: "instances".to_string(),
                limit,
            });
        }
        self.publish(ChangeKind::Insert, ChangeRow::Instance(instance.clone()));
        Ok(())
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, DesklineError> {
        queries::instances::get_instance(self.db()?, id).await
    }

    async fn list_instances(&self, owner: &TenantId) -> Result<Vec<Instance>, DesklineError> {
        queries::instances::list_instances(self.db()?, owner).await
    }

    async fn begin_pairing(&self, id: &InstanceId, limit: u32) -> Result<Instance, DesklineError> {
        match queries::instances::begin_pairing(self.db()?, id, limit).await? {
            Guarded::Applied(instance) => {
                self.instance_updated(&instance);
                Ok(instance)
            }
            Guarded::Rejected(None) => Err(DesklineError::not_found("instance", id)),
            Guarded::Rejected(Some(current)) if current.status.is_pairing() => {
                Err(DesklineError::PairingInProgress {
                    instance: id.to_string(),
                })
            }
            Guarded::Rejected(Some(current)) if current.status == InstanceStatus::Connected => Err(
                DesklineError::invalid_transition("instance", current.status, "generating_code"),
            ),
            Guarded::Rejected(Some(_)) => Err(DesklineError::QuotaExceeded {
                resource: "instances".to_string(),
                limit,
            }),
        }
    }

    async fn transition_instance(
        &self,
        id: &InstanceId,
        from: InstanceStatus,
        to: InstanceStatus,
        phone: Option<String>,
    ) -> Result<Instance, DesklineError> {
        if !from.can_transition_to(to) {
            return Err(DesklineError::invalid_transition("instance", from, to));
        }
        match queries::instances::transition_instance(self.db()?, id, from, to, phone).await? {
            Guarded::Applied(instance) => {
                self.instance_updated(&instance);
                Ok(instance)
            }
            Guarded::Rejected(None) => Err(DesklineError::not_found("instance", id)),
            Guarded::Rejected(Some(current)) => {
                Err(DesklineError::invalid_transition("instance", current.status, to))
            }
        }
    }

    async fn delete_instance(&self, id: &InstanceId) -> Result<(), DesklineError> {
        match queries::instances::delete_instance(self.db()?, id).await? {
            Guarded::Applied(instance) => {
                self.publish(ChangeKind::Delete, ChangeRow::Instance(instance));
                Ok(())
            }
            Guarded::Rejected(None) => Err(DesklineError::not_found("instance", id)),
            Guarded::Rejected(Some(current)) => Err(DesklineError::invalid_transition(
                "instance",
                current.status,
                "removed",
            )),
        }
    }

    async fn count_active_instances(&self, owner: &TenantId) -> Result<u32, DesklineError> {
        queries::instances::count_active_instances(self.db()?, owner).await
    }

    async fn list_pairing_instances(&self) -> Result<Vec<Instance>, DesklineError> {
        queries::instances::list_pairing_instances(self.db()?).await
    }

    // --- Queues ---

    async fn create_queue(&self, queue: &Queue) -> Result<(), DesklineError> {
        queries::queues::create_queue(self.db()?, queue).await?;
        self.publish(ChangeKind::Insert, ChangeRow::Queue(queue.clone()));
        Ok(())
    }

    async fn get_queue(&self, id: &QueueId) -> Result<Option<Queue>, DesklineError> {
        queries::queues::get_queue(self.db()?, id).await
    }

    async fn list_queues(&self, tenant: &TenantId) -> Result<Vec<Queue>, DesklineError> {
        queries::queues::list_queues(self.db()?, tenant).await
    }

    async fn delete_queue(
        &self,
        id: &QueueId,
        disposal: QueueDisposal,
    ) -> Result<u64, DesklineError> {
        let target = match &disposal {
            QueueDisposal::ReassignTo(q) => Some(q.clone()),
            QueueDisposal::Orphan => None,
        };
        match queries::queues::delete_queue(self.db()?, id, disposal).await? {
            QueueRemoval::Removed { queue, tickets } => {
                for ticket in &tickets {
                    self.ticket_updated(ticket);
                }
                self.publish(ChangeKind::Delete, ChangeRow::Queue(queue));
                Ok(tickets.len() as u64)
            }
            QueueRemoval::Missing => Err(DesklineError::not_found("queue", id)),
            QueueRemoval::BadTarget => Err(DesklineError::not_found(
                "queue",
                target.map(|q| q.to_string()).unwrap_or_default(),
            )),
        }
    }

    // --- Agents ---

    async fn create_agent(&self, agent: &Agent, limit: u32) -> Result<(), DesklineError> {
        if !queries::agents::create_agent(self.db()?, agent, limit).await? {
            return Err(DesklineError::QuotaExceeded {
                resource: "agents".to_string(),
                limit,
            });
        }
        self.publish(ChangeKind::Insert, ChangeRow::Agent(agent.clone()));
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, DesklineError> {
        queries::agents::get_agent(self.db()?, id).await
    }

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, DesklineError> {
        queries::agents::list_agents(self.db()?, tenant).await
    }

    async fn set_agent_presence(
        &self,
        id: &AgentId,
        presence: AgentPresence,
    ) -> Result<Agent, DesklineError> {
        let agent = queries::agents::set_presence(self.db()?, id, presence)
            .await?
            .ok_or_else(|| DesklineError::not_found("agent", id))?;
        self.publish(ChangeKind::Update, ChangeRow::Agent(agent.clone()));
        Ok(agent)
    }

    // --- Contacts ---

    async fn get_contact(&self, id: &ContactId) -> Result<Option<Contact>, DesklineError> {
        queries::contacts::get_contact(self.db()?, id).await
    }

    // --- Tickets ---

    async fn record_inbound(&self, record: &InboundRecord) -> Result<InboundOutcome, DesklineError> {
        let ingested = queries::tickets::record_inbound(self.db()?, record).await?;
        let ticket_kind = if ingested.ticket_created {
            ChangeKind::Insert
        } else {
            ChangeKind::Update
        };
        self.publish(ticket_kind, ChangeRow::Ticket(ingested.ticket.clone()));
        self.publish(ChangeKind::Insert, ChangeRow::Message(ingested.message.clone()));
        Ok(InboundOutcome {
            ticket: ingested.ticket,
            message: ingested.message,
            contact: ingested.contact,
            ticket_created: ingested.ticket_created,
        })
    }

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, DesklineError> {
        queries::tickets::get_ticket(self.db()?, id).await
    }

    async fn list_tickets(
        &self,
        tenant: &TenantId,
        view: &TicketView,
    ) -> Result<Vec<Ticket>, DesklineError> {
        queries::tickets::list_tickets(self.db()?, tenant, view).await
    }

    async fn claim_ticket(&self, id: &TicketId, agent: &AgentId) -> Result<Ticket, DesklineError> {
        match queries::tickets::claim(self.db()?, id, agent).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(None) => Err(ticket_missing(id)),
            Guarded::Rejected(Some(t)) if t.status == TicketStatus::Closed => {
                Err(DesklineError::invalid_transition("ticket", t.status, TicketStatus::Open))
            }
            Guarded::Rejected(Some(_)) => Err(DesklineError::AlreadyClaimed {
                ticket: id.to_string(),
            }),
        }
    }

    async fn transfer_to_queue(
        &self,
        id: &TicketId,
        queue: &QueueId,
    ) -> Result<Ticket, DesklineError> {
        match queries::tickets::transfer_to_queue(self.db()?, id, queue).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(None) => Err(ticket_missing(id)),
            Guarded::Rejected(Some(t)) => Err(DesklineError::invalid_transition(
                "ticket",
                t.status,
                TicketStatus::Pending,
            )),
        }
    }

    async fn transfer_to_agent(
        &self,
        id: &TicketId,
        agent: &AgentId,
    ) -> Result<Ticket, DesklineError> {
        match queries::tickets::transfer_to_agent(self.db()?, id, agent).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(None) => Err(ticket_missing(id)),
            Guarded::Rejected(Some(t)) => Err(DesklineError::invalid_transition(
                "ticket",
                t.status,
                TicketStatus::Open,
            )),
        }
    }

    async fn resolve_ticket(
        &self,
        id: &TicketId,
        by: Option<&AgentId>,
    ) -> Result<Ticket, DesklineError> {
        match queries::tickets::resolve(self.db()?, id, by).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(None) => Err(ticket_missing(id)),
            Guarded::Rejected(Some(t)) if t.status == TicketStatus::Closed => Ok(t),
            Guarded::Rejected(Some(t)) => Err(DesklineError::invalid_transition(
                "ticket",
                t.status,
                TicketStatus::Closed,
            )),
        }
    }

    async fn return_to_queue(&self, id: &TicketId) -> Result<Ticket, DesklineError> {
        match queries::tickets::return_to_queue(self.db()?, id).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(None) => Err(ticket_missing(id)),
            Guarded::Rejected(Some(t))
                if t.status == TicketStatus::Open && t.queue_id.is_none() =>
            {
                Err(DesklineError::NoQueueAssigned {
                    ticket: id.to_string(),
                })
            }
            Guarded::Rejected(Some(t)) => Err(DesklineError::invalid_transition(
                "ticket",
                t.status,
                TicketStatus::Pending,
            )),
        }
    }

    async fn acknowledge_read(&self, id: &TicketId) -> Result<Ticket, DesklineError> {
        match queries::tickets::acknowledge_read(self.db()?, id).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(_) => Err(ticket_missing(id)),
        }
    }

    async fn decrement_unread(&self, id: &TicketId, n: u32) -> Result<Ticket, DesklineError> {
        match queries::tickets::decrement_unread(self.db()?, id, n).await? {
            Guarded::Applied(ticket) => {
                self.ticket_updated(&ticket);
                Ok(ticket)
            }
            Guarded::Rejected(_) => Err(ticket_missing(id)),
        }
    }

    // --- Messages ---

    async fn insert_outbound(&self, message: &Message) -> Result<Message, DesklineError> {
        let (message, guarded) = queries::messages::insert_outbound(self.db()?, message).await?;
        match guarded {
            Guarded::Applied(ticket) => {
                self.publish(ChangeKind::Insert, ChangeRow::Message(message.clone()));
                self.ticket_updated(&ticket);
                Ok(message)
            }
            Guarded::Rejected(Some(ticket)) => Err(DesklineError::invalid_transition(
                "ticket",
                ticket.status,
                "send",
            )),
            Guarded::Rejected(None) => Err(ticket_missing(&message.ticket_id)),
        }
    }

    async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, DesklineError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn messages_since(
        &self,
        ticket: &TicketId,
        after: Option<(DateTime<Utc>, MessageId)>,
        limit: u32,
    ) -> Result<Vec<Message>, DesklineError> {
        queries::messages::messages_since(self.db()?, ticket, after, limit).await
    }

    async fn recent_messages(
        &self,
        ticket: &TicketId,
        limit: u32,
    ) -> Result<Vec<Message>, DesklineError> {
        queries::messages::recent_messages(self.db()?, ticket, limit).await
    }

    async fn advance_message_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<Message, DesklineError> {
        match queries::messages::advance_status(self.db()?, id, status).await? {
            StatusChange::Advanced(message) => {
                self.publish(ChangeKind::Update, ChangeRow::Message(message.clone()));
                Ok(message)
            }
            StatusChange::Unchanged(message) => Ok(message),
            StatusChange::Rejected(message) => Err(DesklineError::invalid_transition(
                "message",
                message.status,
                status,
            )),
            StatusChange::Missing => Err(DesklineError::not_found("message", id)),
        }
    }

    // --- Settings ---

    async fn get_auto_reply(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<AutoReplySettings>, DesklineError> {
        queries::settings::get_auto_reply(self.db()?, tenant).await
    }

    async fn upsert_auto_reply(
        &self,
        settings: &AutoReplySettings,
    ) -> Result<AutoReplySettings, DesklineError> {
        if !settings.temperature_in_range() {
            return Err(DesklineError::Config(format!(
                "temperature must be within [0, 1], got {}",
                settings.temperature
            )));
        }
        let stored = queries::settings::upsert_auto_reply(self.db()?, settings).await?;
        self.publish(ChangeKind::Update, ChangeRow::AutoReplySettings(stored.clone()));
        Ok(stored)
    }

    async fn get_tenant_settings(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<TenantSettings>, DesklineError> {
        queries::settings::get_tenant_settings(self.db()?, tenant).await
    }

    async fn upsert_tenant_settings(&self, settings: &TenantSettings) -> Result<(), DesklineError> {
        queries::settings::upsert_tenant_settings(self.db()?, settings).await
    }
}
