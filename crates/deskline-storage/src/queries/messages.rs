// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message rows: append, history windows, and monotonic status receipts.

use chrono::{DateTime, Utc};
use deskline_core::{DesklineError, Message, MessageId, MessageStatus, Ticket, TicketId};
use rusqlite::{OptionalExtension, params};

use super::Guarded;
use crate::database::{Database, map_tr_err};
use crate::rows::{self, MESSAGE_COLUMNS, ts};

pub(crate) fn insert_row(conn: &rusqlite::Connection, message: &Message) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            message.id.as_str(),
            message.ticket_id.as_str(),
            message.direction.to_string(),
            message.body,
            message.status.to_string(),
            message.is_ai_generated,
            message.correlation_id,
            ts(&message.created_at),
        ],
    )?;
    Ok(())
}

fn select(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        params![id],
        rows::message,
    )
    .optional()
}

/// Appends an outbound message and refreshes the ticket's last-message snapshot.
/// Returns `None` when the ticket does not exist.
/// Appends an outbound message to a non-closed ticket.
///
/// `created_at` is stamped on the writer thread, so timestamps follow commit
/// order. The ticket guard is part of the same transaction.
pub async fn insert_outbound(
    db: &Database,
    message: &Message,
) -> Result<(Message, Guarded<Ticket>), DesklineError> {
    let mut message = message.clone();
    db.connection()
        .call(move |conn| -> Result<(Message, Guarded<Ticket>), rusqlite::Error> {
            message.created_at = deskline_core::types::now();
            let at = ts(&message.created_at);
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE tickets SET last_message_body = ?2, last_message_direction = ?3,
                     last_message_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status != 'closed'",
                params![
                    message.ticket_id.as_str(),
                    message.body,
                    message.direction.to_string(),
                    at,
                ],
            )?;
            let ticket = super::tickets::select(&tx, message.ticket_id.as_str())?;
            if changed == 0 {
                return Ok((message, Guarded::Rejected(ticket)));
            }
            insert_row(&tx, &message)?;
            tx.commit()?;
            Ok((message, Guarded::from_write(changed, ticket)))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_message(db: &Database, id: &MessageId) -> Result<Option<Message>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Messages strictly after the `(created_at, id)` cursor, in order.
pub async fn messages_since(
    db: &Database,
    ticket: &TicketId,
    after: Option<(DateTime<Utc>, MessageId)>,
    limit: u32,
) -> Result<Vec<Message>, DesklineError> {
    let ticket = ticket.to_string();
    let (after_ts, after_id) = match after {
        Some((at, id)) => (ts(&at), id.to_string()),
        None => (String::new(), String::new()),
    };
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE ticket_id = ?1 AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                 ORDER BY created_at, id
                 LIMIT ?4"
            ))?;
            let rows = stmt.query_map(params![ticket, after_ts, after_id, limit], rows::message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// The newest `limit` messages, oldest first.
pub async fn recent_messages(
    db: &Database,
    ticket: &TicketId,
    limit: u32,
) -> Result<Vec<Message>, DesklineError> {
    let ticket = ticket.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT {MESSAGE_COLUMNS} FROM messages WHERE ticket_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2
                 ) ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map(params![ticket, limit], rows::message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub enum StatusChange {
    Advanced(Message),
    /// Duplicate or stale receipt; the stored row is returned as-is.
    Unchanged(Message),
    /// `failed` requested for a message that is already past `sent`.
    Rejected(Message),
    Missing,
}

/// Applies a receipt iff it moves the status forward.
pub async fn advance_status(
    db: &Database,
    id: &MessageId,
    status: MessageStatus,
) -> Result<StatusChange, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<StatusChange, rusqlite::Error> {
            let Some(current) = select(conn, &id)? else {
                return Ok(StatusChange::Missing);
            };
            if current.status.can_advance_to(status) {
                let changed = conn.execute(
                    "UPDATE messages SET status = ?3 WHERE id = ?1 AND status = ?2",
                    params![id, current.status.to_string(), status.to_string()],
                )?;
                return Ok(match (changed, select(conn, &id)?) {
                    (1, Some(updated)) => StatusChange::Advanced(updated),
                    (_, Some(row)) => StatusChange::Unchanged(row),
                    (_, None) => StatusChange::Missing,
                });
            }
            if status == MessageStatus::Failed && current.status != MessageStatus::Failed {
                return Ok(StatusChange::Rejected(current));
            }
            Ok(StatusChange::Unchanged(current))
        })
        .await
        .map_err(map_tr_err)
}
