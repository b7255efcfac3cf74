// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance rows and their pairing-status transitions.

use deskline_core::{DesklineError, Instance, InstanceId, InstanceStatus, TenantId};
use rusqlite::{OptionalExtension, params};

use super::Guarded;
use crate::database::{Database, map_tr_err};
use crate::rows::{self, INSTANCE_COLUMNS, ts};

const SLOT_STATES: &str = "('generating_code', 'awaiting_scan', 'connected')";

fn select(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Instance>> {
    conn.query_row(
        &format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?1"),
        params![id],
        rows::instance,
    )
    .optional()
}

/// Inserts an instance; slot-holding statuses are quota-checked in the same statement.
/// Returns `false` when the quota rejected the insert.
pub async fn create_instance(
    db: &Database,
    instance: &Instance,
    limit: u32,
) -> Result<bool, DesklineError> {
    let instance = instance.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let quota_applies = instance.status.holds_quota_slot();
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO instances ({INSTANCE_COLUMNS})
                     SELECT ?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?7
                     WHERE ?8 = 0 OR (SELECT COUNT(*) FROM instances
                                      WHERE owner_id = ?2 AND status IN {SLOT_STATES}) < ?9"
                ),
                params![
                    instance.id.as_str(),
                    instance.owner_id.as_str(),
                    instance.display_name,
                    instance.status.to_string(),
                    instance.provider.to_string(),
                    instance.default_queue_id.as_ref().map(|q| q.as_str()),
                    ts(&instance.created_at),
                    quota_applies,
                    limit,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_instance(db: &Database, id: &InstanceId) -> Result<Option<Instance>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select(conn, &id))
        .await
        .map_err(map_tr_err)
}

pub async fn list_instances(db: &Database, owner: &TenantId) -> Result<Vec<Instance>, DesklineError> {
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Instance>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE owner_id = ?1 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map(params![owner], rows::instance)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// `uninitialized | failed -> generating_code`, guarded by the owner's slot count.
pub async fn begin_pairing(
    db: &Database,
    id: &InstanceId,
    limit: u32,
) -> Result<Guarded<Instance>, DesklineError> {
    let id = id.to_string();
    let now = ts(&deskline_core::types::now());
    db.connection()
        .call(move |conn| -> Result<Guarded<Instance>, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE instances SET status = 'generating_code', phone = NULL, updated_at = ?2
                     WHERE id = ?1 AND status IN ('uninitialized', 'failed')
                       AND (SELECT COUNT(*) FROM instances AS other
                            WHERE other.owner_id = instances.owner_id
                              AND other.status IN {SLOT_STATES}) < ?3"
                ),
                params![id, now, limit],
            )?;
            Ok(Guarded::from_write(changed, select(conn, &id)?))
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set on `status`. The caller has already checked the edge is legal.
pub async fn transition_instance(
    db: &Database,
    id: &InstanceId,
    from: InstanceStatus,
    to: InstanceStatus,
    phone: Option<String>,
) -> Result<Guarded<Instance>, DesklineError> {
    let id = id.to_string();
    let now = ts(&deskline_core::types::now());
    let phone = if to == InstanceStatus::Connected { phone } else { None };
    db.connection()
        .call(move |conn| -> Result<Guarded<Instance>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE instances SET status = ?3, phone = ?4, updated_at = ?5
                 WHERE id = ?1 AND status = ?2",
                params![id, from.to_string(), to.to_string(), phone, now],
            )?;
            Ok(Guarded::from_write(changed, select(conn, &id)?))
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes an `uninitialized` instance.
pub async fn delete_instance(
    db: &Database,
    id: &InstanceId,
) -> Result<Guarded<Instance>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Guarded<Instance>, rusqlite::Error> {
            let Some(row) = select(conn, &id)? else {
                return Ok(Guarded::Rejected(None));
            };
            let deleted = conn.execute(
                "DELETE FROM instances WHERE id = ?1 AND status = 'uninitialized'",
                params![id],
            )?;
            Ok(if deleted == 1 {
                Guarded::Applied(row)
            } else {
                Guarded::Rejected(Some(row))
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_active_instances(db: &Database, owner: &TenantId) -> Result<u32, DesklineError> {
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| -> Result<u32, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM instances WHERE owner_id = ?1 AND status IN {SLOT_STATES}"
                ),
                params![owner],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_pairing_instances(db: &Database) -> Result<Vec<Instance>, DesklineError> {
    db.connection()
        .call(|conn| -> Result<Vec<Instance>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances
                 WHERE status IN ('generating_code', 'awaiting_scan') ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], rows::instance)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
