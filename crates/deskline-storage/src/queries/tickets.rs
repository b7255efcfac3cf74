// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket ingestion and ownership transitions.
//!
//! Ownership changes are single `UPDATE ... WHERE <guard>` statements. The
//! `tickets` CHECK constraint keeps `owner_id IS NULL` equivalent to
//! `status != 'open'` for every write here.

use deskline_core::{
    AgentId, Contact, DesklineError, InboundRecord, Message, MessageDirection, MessageId,
    MessageStatus, QueueId, TenantId, Ticket, TicketId, TicketView,
};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

use super::{Guarded, contacts};
use crate::database::{Database, map_tr_err};
use crate::rows::{self, TICKET_COLUMNS, ts};

pub(crate) fn select(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Ticket>> {
    conn.query_row(
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
        params![id],
        rows::ticket,
    )
    .optional()
}

/// Rows written by one inbound message.
pub struct Ingested {
    pub ticket: Ticket,
    pub message: Message,
    pub contact: Contact,
    pub ticket_created: bool,
}

/// Upserts the contact, reuses its non-closed ticket or opens a pending one,
/// and appends the inbound message. One transaction.
pub async fn record_inbound(db: &Database, record: &InboundRecord) -> Result<Ingested, DesklineError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| -> Result<Ingested, rusqlite::Error> {
            let now = deskline_core::types::now();
            let now_s = ts(&now);
            let tx = conn.transaction()?;

            let contact = contacts::upsert(
                &tx,
                &record.tenant_id,
                &record.contact_address,
                record.contact_name.as_deref(),
            )?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM tickets WHERE contact_id = ?1 AND status != 'closed'",
                    params![contact.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let (ticket_id, ticket_created) = match existing {
                Some(id) => (id, false),
                None => {
                    // Only keep the default queue if it still exists.
                    let queue: Option<String> = match &record.default_queue_id {
                        Some(q) => tx
                            .query_row(
                                "SELECT id FROM queues WHERE id = ?1 AND tenant_id = ?2",
                                params![q.as_str(), record.tenant_id.as_str()],
                                |row| row.get(0),
                            )
                            .optional()?,
                        None => None,
                    };
                    let id = TicketId::generate().to_string();
                    tx.execute(
                        "INSERT INTO tickets (id, tenant_id, contact_id, instance_id, queue_id,
                                              status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
                        params![
                            id,
                            record.tenant_id.as_str(),
                            contact.id.as_str(),
                            record.instance_id.as_str(),
                            queue,
                            now_s,
                        ],
                    )?;
                    (id, true)
                }
            };

            let message = Message {
                id: MessageId::generate(),
                ticket_id: TicketId::from(ticket_id.clone()),
                direction: MessageDirection::Inbound,
                body: record.body.clone(),
                status: MessageStatus::Delivered,
                is_ai_generated: false,
                correlation_id: None,
                created_at: now,
            };
            super::messages::insert_row(&tx, &message)?;

            tx.execute(
                "UPDATE tickets SET unread_count = unread_count + 1,
                     last_message_body = ?2, last_message_direction = 'inbound',
                     last_message_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                params![ticket_id, record.body, now_s],
            )?;

            let ticket = tx.query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                params![ticket_id],
                rows::ticket,
            )?;
            tx.commit()?;

            Ok(Ingested {
                ticket,
                message,
                contact,
                ticket_created,
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_ticket(db: &Database, id: &TicketId) -> Result<Option<Ticket>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select(conn, &id))
        .await
        .map_err(map_tr_err)
}

pub async fn list_tickets(
    db: &Database,
    tenant: &TenantId,
    view: &TicketView,
) -> Result<Vec<Ticket>, DesklineError> {
    let tenant = tenant.to_string();
    let (clause, arg): (&'static str, Option<String>) = match view {
        TicketView::Mine(agent) => ("status = 'open' AND owner_id = ?2", Some(agent.to_string())),
        TicketView::Queued(Some(queue)) => {
            ("status = 'pending' AND queue_id = ?2", Some(queue.to_string()))
        }
        TicketView::Queued(None) => ("status = 'pending'", None),
        TicketView::Closed => ("status = 'closed'", None),
    };
    db.connection()
        .call(move |conn| -> Result<Vec<Ticket>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets
                 WHERE tenant_id = ?1 AND {clause}
                 ORDER BY updated_at DESC, id DESC"
            ))?;
            let mut values = vec![Value::from(tenant)];
            values.extend(arg.map(Value::from));
            let rows = stmt.query_map(params_from_iter(values), rows::ticket)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Runs one guarded UPDATE (`?1` is always the ticket id) and reads the row back.
async fn guarded_update(
    db: &Database,
    id: &TicketId,
    sql: &'static str,
    args: Vec<Value>,
) -> Result<Guarded<Ticket>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Guarded<Ticket>, rusqlite::Error> {
            let mut values = vec![Value::from(id.clone())];
            values.extend(args);
            let changed = conn.execute(sql, params_from_iter(values))?;
            Ok(Guarded::from_write(changed, select(conn, &id)?))
        })
        .await
        .map_err(map_tr_err)
}

fn now_value() -> Value {
    Value::from(ts(&deskline_core::types::now()))
}

/// Unowned `pending -> open`.
pub async fn claim(
    db: &Database,
    id: &TicketId,
    agent: &AgentId,
) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET owner_id = ?2, status = 'open', updated_at = ?3
         WHERE id = ?1 AND owner_id IS NULL AND status = 'pending'",
        vec![Value::from(agent.to_string()), now_value()],
    )
    .await
}

pub async fn transfer_to_queue(
    db: &Database,
    id: &TicketId,
    queue: &QueueId,
) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET queue_id = ?2, owner_id = NULL, status = 'pending', updated_at = ?3
         WHERE id = ?1 AND status = 'open'",
        vec![Value::from(queue.to_string()), now_value()],
    )
    .await
}

pub async fn transfer_to_agent(
    db: &Database,
    id: &TicketId,
    agent: &AgentId,
) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET owner_id = ?2, updated_at = ?3
         WHERE id = ?1 AND status = 'open'",
        vec![Value::from(agent.to_string()), now_value()],
    )
    .await
}

/// `open -> closed`; `resolved_by` falls back to the current owner.
pub async fn resolve(
    db: &Database,
    id: &TicketId,
    by: Option<&AgentId>,
) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET status = 'closed', resolved_by = COALESCE(?2, owner_id),
             owner_id = NULL, updated_at = ?3
         WHERE id = ?1 AND status = 'open'",
        vec![Value::from(by.map(ToString::to_string)), now_value()],
    )
    .await
}

pub async fn return_to_queue(db: &Database, id: &TicketId) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET owner_id = NULL, status = 'pending', updated_at = ?2
         WHERE id = ?1 AND status = 'open' AND queue_id IS NOT NULL",
        vec![now_value()],
    )
    .await
}

/// Read acknowledgement does not bump `updated_at`, so list order is unaffected.
pub async fn acknowledge_read(db: &Database, id: &TicketId) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET unread_count = 0 WHERE id = ?1",
        vec![],
    )
    .await
}

pub async fn decrement_unread(
    db: &Database,
    id: &TicketId,
    n: u32,
) -> Result<Guarded<Ticket>, DesklineError> {
    guarded_update(
        db,
        id,
        "UPDATE tickets SET unread_count = MAX(unread_count - ?2, 0) WHERE id = ?1",
        vec![Value::from(i64::from(n))],
    )
    .await
}
