// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite columns and domain types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use deskline_core::{
    Agent, AutoReplySettings, Contact, Instance, LastMessage, Message, Queue, TenantSettings,
    Ticket,
};
use rusqlite::Row;
use rusqlite::types::Type;

/// Fixed-width so lexicographic order matches chronological order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.format(TS_FORMAT).to_string()
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => get_ts(row, idx).map(Some),
    }
}

fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn get_id<T: From<String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    row.get::<_, String>(idx).map(T::from)
}

fn get_opt_id<T: From<String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(T::from))
}

pub(crate) const INSTANCE_COLUMNS: &str = "id, owner_id, display_name, status, phone, provider, \
     default_queue_id, created_at, updated_at";

pub(crate) fn instance(row: &Row<'_>) -> rusqlite::Result<Instance> {
    Ok(Instance {
        id: get_id(row, 0)?,
        owner_id: get_id(row, 1)?,
        display_name: row.get(2)?,
        status: get_enum(row, 3)?,
        phone: row.get(4)?,
        provider: get_enum(row, 5)?,
        default_queue_id: get_opt_id(row, 6)?,
        created_at: get_ts(row, 7)?,
        updated_at: get_ts(row, 8)?,
    })
}

pub(crate) const QUEUE_COLUMNS: &str = "id, tenant_id, name, color";

pub(crate) fn queue(row: &Row<'_>) -> rusqlite::Result<Queue> {
    Ok(Queue {
        id: get_id(row, 0)?,
        tenant_id: get_id(row, 1)?,
        name: row.get(2)?,
        color: row.get(3)?,
    })
}

pub(crate) const AGENT_COLUMNS: &str = "id, tenant_id, identity_ref, display_name, presence";

pub(crate) fn agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: get_id(row, 0)?,
        tenant_id: get_id(row, 1)?,
        identity_ref: row.get(2)?,
        display_name: row.get(3)?,
        presence: get_enum(row, 4)?,
    })
}

pub(crate) const CONTACT_COLUMNS: &str = "id, tenant_id, address, display_name, avatar_url";

pub(crate) fn contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: get_id(row, 0)?,
        tenant_id: get_id(row, 1)?,
        address: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
    })
}

pub(crate) const TICKET_COLUMNS: &str = "id, tenant_id, contact_id, instance_id, queue_id, \
     owner_id, status, last_message_body, last_message_direction, last_message_at, \
     unread_count, tags, resolved_by, created_at, updated_at";

pub(crate) fn ticket(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let body: Option<String> = row.get(7)?;
    let direction: Option<String> = row.get(8)?;
    let at = get_opt_ts(row, 9)?;
    let last_message = match (body, direction, at) {
        (Some(body), Some(_), Some(at)) => Some(LastMessage {
            body,
            direction: get_enum(row, 8)?,
            at,
        }),
        _ => None,
    };

    let tags_raw: String = row.get(11)?;
    let tags: Vec<String> = serde_json::from_str(&tags_raw).map_err(|e| conversion_err(11, e))?;

    Ok(Ticket {
        id: get_id(row, 0)?,
        tenant_id: get_id(row, 1)?,
        contact_id: get_id(row, 2)?,
        instance_id: get_id(row, 3)?,
        queue_id: get_opt_id(row, 4)?,
        owner_id: get_opt_id(row, 5)?,
        status: get_enum(row, 6)?,
        last_message,
        unread_count: row.get(10)?,
        tags,
        resolved_by: get_opt_id(row, 12)?,
        created_at: get_ts(row, 13)?,
        updated_at: get_ts(row, 14)?,
    })
}

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, ticket_id, direction, body, status, is_ai_generated, correlation_id, created_at";

pub(crate) fn message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: get_id(row, 0)?,
        ticket_id: get_id(row, 1)?,
        direction: get_enum(row, 2)?,
        body: row.get(3)?,
        status: get_enum(row, 4)?,
        is_ai_generated: row.get(5)?,
        correlation_id: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}

pub(crate) fn auto_reply(row: &Row<'_>) -> rusqlite::Result<AutoReplySettings> {
    let temperature: f64 = row.get(2)?;
    Ok(AutoReplySettings {
        tenant_id: get_id(row, 0)?,
        enabled: row.get(1)?,
        temperature: temperature as f32,
        system_prompt: row.get(3)?,
    })
}

pub(crate) fn tenant_settings(row: &Row<'_>) -> rusqlite::Result<TenantSettings> {
    Ok(TenantSettings {
        tenant_id: get_id(row, 0)?,
        gateway_url: row.get(1)?,
        default_queue_id: get_opt_id(row, 2)?,
        instance_limit: row.get(3)?,
        agent_limit: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert!(ts(&a) < ts(&b));
        assert_eq!(ts(&a), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn timestamp_round_trips_at_micro_precision() {
        let now = deskline_core::types::now();
        let parsed = DateTime::parse_from_rfc3339(&ts(&now))
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, now);
    }
}
