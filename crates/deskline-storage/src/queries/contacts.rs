// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contacts are keyed by `(tenant_id, address)` and created on first contact.

use deskline_core::{Contact, ContactId, DesklineError, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::rows::{self, CONTACT_COLUMNS, ts};

/// Inserts the contact if new, refreshing its display name when one is given.
pub(crate) fn upsert(
    conn: &rusqlite::Connection,
    tenant: &TenantId,
    address: &str,
    display_name: Option<&str>,
) -> rusqlite::Result<Contact> {
    conn.execute(
        "INSERT INTO contacts (id, tenant_id, address, display_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (tenant_id, address)
         DO UPDATE SET display_name = COALESCE(excluded.display_name, contacts.display_name)",
        params![
            ContactId::generate().as_str(),
            tenant.as_str(),
            address,
            display_name,
            ts(&deskline_core::types::now()),
        ],
    )?;
    conn.query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 AND address = ?2"),
        params![tenant.as_str(), address],
        rows::contact,
    )
}

pub async fn get_contact(db: &Database, id: &ContactId) -> Result<Option<Contact>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Contact>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![id],
                rows::contact,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
