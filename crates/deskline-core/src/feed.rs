// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row-level change feed.
//!
//! Storage publishes one [`ChangeEvent`] per committed write. Subscribers
//! filter by table and an optional column equality. A subscriber that falls
//! behind or whose hub is reset receives [`DesklineError::FeedDisconnected`]
//! and must resubscribe and backfill.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;

use crate::error::DesklineError;
use crate::types::{Agent, AutoReplySettings, Instance, Message, Queue, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Instances,
    Tickets,
    Messages,
    Queues,
    Agents,
    AutoReplySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The row image carried by a change event. Deletes carry the last image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum ChangeRow {
    Instance(Instance),
    Ticket(Ticket),
    Message(Message),
    Queue(Queue),
    Agent(Agent),
    AutoReplySettings(AutoReplySettings),
}

impl ChangeRow {
    pub fn table(&self) -> Table {
        match self {
            ChangeRow::Instance(_) => Table::Instances,
            ChangeRow::Ticket(_) => Table::Tickets,
            ChangeRow::Message(_) => Table::Messages,
            ChangeRow::Queue(_) => Table::Queues,
            ChangeRow::Agent(_) => Table::Agents,
            ChangeRow::AutoReplySettings(_) => Table::AutoReplySettings,
        }
    }

    /// Column value used for filter matching, `None` for unknown or null columns.
    pub fn field(&self, column: &str) -> Option<String> {
        match (self, column) {
            (ChangeRow::Instance(i), "id") => Some(i.id.to_string()),
            (ChangeRow::Instance(i), "owner_id" | "tenant_id") => Some(i.owner_id.to_string()),
            (ChangeRow::Instance(i), "status") => Some(i.status.to_string()),
            (ChangeRow::Ticket(t), "id") => Some(t.id.to_string()),
            (ChangeRow::Ticket(t), "tenant_id") => Some(t.tenant_id.to_string()),
            (ChangeRow::Ticket(t), "instance_id") => Some(t.instance_id.to_string()),
            (ChangeRow::Ticket(t), "queue_id") => t.queue_id.as_ref().map(ToString::to_string),
            (ChangeRow::Ticket(t), "owner_id") => t.owner_id.as_ref().map(ToString::to_string),
            (ChangeRow::Ticket(t), "status") => Some(t.status.to_string()),
            (ChangeRow::Message(m), "id") => Some(m.id.to_string()),
            (ChangeRow::Message(m), "ticket_id") => Some(m.ticket_id.to_string()),
            (ChangeRow::Queue(q), "id") => Some(q.id.to_string()),
            (ChangeRow::Queue(q), "tenant_id") => Some(q.tenant_id.to_string()),
            (ChangeRow::Agent(a), "id") => Some(a.id.to_string()),
            (ChangeRow::Agent(a), "tenant_id") => Some(a.tenant_id.to_string()),
            (ChangeRow::AutoReplySettings(s), "tenant_id") => Some(s.tenant_id.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, row: ChangeRow) -> Self {
        Self { kind, row }
    }

    pub fn table(&self) -> Table {
        self.row.table()
    }
}

/// Selects the events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub table: Table,
    pub column_eq: Option<(String, String)>,
    /// Empty means every kind.
    pub kinds: Vec<ChangeKind>,
}

impl FeedFilter {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            column_eq: None,
            kinds: Vec::new(),
        }
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.column_eq = Some((column.to_string(), value.to_string()));
        self
    }

    pub fn kinds(mut self, kinds: &[ChangeKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table() != self.table {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        match &self.column_eq {
            None => true,
            Some((column, value)) => event.row.field(column).as_deref() == Some(value.as_str()),
        }
    }
}

/// Fan-out point for committed changes.
pub struct FeedHub {
    sender: ArcSwap<broadcast::Sender<ChangeEvent>>,
    capacity: usize,
}

impl FeedHub {
    /// Creates a hub whose subscribers may buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: ArcSwap::from_pointee(tx),
            capacity: capacity.max(1),
        }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.load().send(event);
    }

    pub fn subscribe(&self, filter: FeedFilter) -> FeedSubscription {
        FeedSubscription {
            rx: self.sender.load().subscribe(),
            filter,
        }
    }

    /// Drops every live subscription. Each one reports `FeedDisconnected`
    /// after draining what was already buffered.
    pub fn reset(&self) {
        let (tx, _) = broadcast::channel(self.capacity);
        self.sender.store(Arc::new(tx));
        tracing::debug!("change feed reset");
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.load().receiver_count()
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A filtered view over the hub.
pub struct FeedSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: FeedFilter,
}

impl FeedSubscription {
    /// Waits for the next matching event.
    pub async fn recv(&mut self) -> Result<ChangeEvent, DesklineError> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, table = %self.filter.table, "feed subscriber lagged");
                    return Err(DesklineError::FeedDisconnected);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(DesklineError::FeedDisconnected);
                }
            }
        }
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::Utc;

    fn message(ticket: &str, body: &str) -> Message {
        Message {
            id: MessageId::generate(),
            ticket_id: TicketId::from(ticket),
            direction: MessageDirection::Inbound,
            body: body.to_string(),
            status: MessageStatus::Sent,
            is_ai_generated: false,
            correlation_id: None,
            created_at: Utc::now(),
        }
    }

    fn insert(m: Message) -> ChangeEvent {
        ChangeEvent::new(ChangeKind::Insert, ChangeRow::Message(m))
    }

    #[tokio::test]
    async fn filter_by_column_equality() {
        let hub = FeedHub::new(16);
        let mut sub = hub.subscribe(FeedFilter::table(Table::Messages).eq("ticket_id", "t1"));
        hub.publish(insert(message("t2", "other")));
        hub.publish(insert(message("t1", "mine")));

        let ev = sub.recv().await.unwrap();
        match ev.row {
            ChangeRow::Message(m) => assert_eq!(m.body, "mine"),
            other => panic!("unexpected row {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_is_disconnected() {
        let hub = FeedHub::new(2);
        let mut sub = hub.subscribe(FeedFilter::table(Table::Messages));
        for i in 0..5 {
            hub.publish(insert(message("t1", &format!("m{i}"))));
        }
        assert!(matches!(
            sub.recv().await,
            Err(DesklineError::FeedDisconnected)
        ));
    }

    #[tokio::test]
    async fn reset_disconnects_after_buffered_events() {
        let hub = FeedHub::new(8);
        let mut sub = hub.subscribe(FeedFilter::table(Table::Messages));
        hub.publish(insert(message("t1", "before")));
        hub.reset();

        assert!(sub.recv().await.is_ok());
        assert!(matches!(
            sub.recv().await,
            Err(DesklineError::FeedDisconnected)
        ));

        let mut fresh = hub.subscribe(FeedFilter::table(Table::Messages));
        hub.publish(insert(message("t1", "after")));
        assert!(fresh.recv().await.is_ok());
    }

    #[test]
    fn null_column_never_matches() {
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId::from("t1"),
            tenant_id: TenantId::default(),
            contact_id: ContactId::from("c1"),
            instance_id: InstanceId::from("i1"),
            queue_id: None,
            owner_id: None,
            status: TicketStatus::Pending,
            last_message: None,
            unread_count: 0,
            tags: vec![],
            resolved_by: None,
            created_at: now,
            updated_at: now,
        };
        let ev = ChangeEvent::new(ChangeKind::Update, ChangeRow::Ticket(ticket));
        assert!(!FeedFilter::table(Table::Tickets).eq("owner_id", "").matches(&ev));
        assert!(FeedFilter::table(Table::Tickets).eq("status", "pending").matches(&ev));
        assert!(
            !FeedFilter::table(Table::Tickets)
                .kinds(&[ChangeKind::Insert])
                .matches(&ev)
        );
    }
}
