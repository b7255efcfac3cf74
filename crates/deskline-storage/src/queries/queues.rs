// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing queues and queue deletion with explicit ticket disposal.

use deskline_core::{DesklineError, Queue, QueueDisposal, QueueId, TenantId, Ticket};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::rows::{self, QUEUE_COLUMNS, TICKET_COLUMNS, ts};

fn select(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Queue>> {
    conn.query_row(
        &format!("SELECT {QUEUE_COLUMNS} FROM queues WHERE id = ?1"),
        params![id],
        rows::queue,
    )
    .optional()
}

pub async fn create_queue(db: &Database, queue: &Queue) -> Result<(), DesklineError> {
    let queue = queue.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO queues (id, tenant_id, name, color, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    queue.id.as_str(),
                    queue.tenant_id.as_str(),
                    queue.name,
                    queue.color,
                    ts(&deskline_core::types::now()),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_queue(db: &Database, id: &QueueId) -> Result<Option<Queue>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select(conn, &id))
        .await
        .map_err(map_tr_err)
}

pub async fn list_queues(db: &Database, tenant: &TenantId) -> Result<Vec<Queue>, DesklineError> {
    let tenant = tenant.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Queue>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {QUEUE_COLUMNS} FROM queues WHERE tenant_id = ?1 ORDER BY name"
            ))?;
            let rows = stmt.query_map(params![tenant], rows::queue)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Result of a queue deletion.
pub enum QueueRemoval {
    Removed { queue: Queue, tickets: Vec<Ticket> },
    Missing,
    /// The reassignment target is missing, belongs to another tenant, or is the queue itself.
    BadTarget,
}

/// Deletes a queue and disposes of its tickets in one transaction.
pub async fn delete_queue(
    db: &Database,
    id: &QueueId,
    disposal: QueueDisposal,
) -> Result<QueueRemoval, DesklineError> {
    let id = id.to_string();
    let now = ts(&deskline_core::types::now());
    db.connection()
        .call(move |conn| -> Result<QueueRemoval, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(queue) = select(&tx, &id)? else {
                return Ok(QueueRemoval::Missing);
            };

            let target = match &disposal {
                QueueDisposal::Orphan => None,
                QueueDisposal::ReassignTo(target) => match select(&tx, target.as_str())? {
                    Some(t) if t.tenant_id == queue.tenant_id && t.id != queue.id => {
                        Some(t.id.to_string())
                    }
                    _ => return Ok(QueueRemoval::BadTarget),
                },
            };

            let ticket_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM tickets WHERE queue_id = ?1")?;
                let rows = stmt.query_map(params![id], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };

            tx.execute(
                "UPDATE tickets SET queue_id = ?2, updated_at = ?3 WHERE queue_id = ?1",
                params![id, target, now],
            )?;
            tx.execute(
                "UPDATE instances SET default_queue_id = ?2 WHERE default_queue_id = ?1",
                params![id, target],
            )?;
            tx.execute(
                "UPDATE tenant_settings SET default_queue_id = ?2 WHERE default_queue_id = ?1",
                params![id, target],
            )?;
            tx.execute("DELETE FROM queues WHERE id = ?1", params![id])?;

            let mut tickets = Vec::with_capacity(ticket_ids.len());
            {
                let mut stmt =
                    tx.prepare(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"))?;
                for ticket_id in &ticket_ids {
                    tickets.push(stmt.query_row(params![ticket_id], rows::ticket)?);
                }
            }
            tx.commit()?;
            Ok(QueueRemoval::Removed { queue, tickets })
        })
        .await
        .map_err(map_tr_err)
}
