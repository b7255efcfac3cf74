// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped settings rows with upsert semantics.

use deskline_core::{AutoReplySettings, DesklineError, TenantId, TenantSettings};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::rows::{self, ts};

pub async fn get_auto_reply(
    db: &Database,
    tenant: &TenantId,
) -> Result<Option<AutoReplySettings>, DesklineError> {
    let tenant = tenant.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<AutoReplySettings>, rusqlite::Error> {
            conn.query_row(
                "SELECT tenant_id, enabled, temperature, system_prompt
                 FROM auto_reply_settings WHERE tenant_id = ?1",
                params![tenant],
                rows::auto_reply,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_auto_reply(
    db: &Database,
    settings: &AutoReplySettings,
) -> Result<AutoReplySettings, DesklineError> {
    let settings = settings.clone();
    db.connection()
        .call(move |conn| -> Result<AutoReplySettings, rusqlite::Error> {
            conn.execute(
                "INSERT INTO auto_reply_settings (tenant_id, enabled, temperature, system_prompt, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (tenant_id) DO UPDATE SET
                     enabled = excluded.enabled,
                     temperature = excluded.temperature,
                     system_prompt = excluded.system_prompt,
                     updated_at = excluded.updated_at",
                params![
                    settings.tenant_id.as_str(),
                    settings.enabled,
                    f64::from(settings.temperature),
                    settings.system_prompt,
                    ts(&deskline_core::types::now()),
                ],
            )?;
            conn.query_row(
                "SELECT tenant_id, enabled, temperature, system_prompt
                 FROM auto_reply_settings WHERE tenant_id = ?1",
                params![settings.tenant_id.as_str()],
                rows::auto_reply,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_tenant_settings(
    db: &Database,
    tenant: &TenantId,
) -> Result<Option<TenantSettings>, DesklineError> {
    let tenant = tenant.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<TenantSettings>, rusqlite::Error> {
            conn.query_row(
                "SELECT tenant_id, gateway_url, default_queue_id, instance_limit, agent_limit
                 FROM tenant_settings WHERE tenant_id = ?1",
                params![tenant],
                rows::tenant_settings,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_tenant_settings(
    db: &Database,
    settings: &TenantSettings,
) -> Result<(), DesklineError> {
    let settings = settings.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO tenant_settings
                     (tenant_id, gateway_url, default_queue_id, instance_limit, agent_limit, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (tenant_id) DO UPDATE SET
                     gateway_url = excluded.gateway_url,
                     default_queue_id = excluded.default_queue_id,
                     instance_limit = excluded.instance_limit,
                     agent_limit = excluded.agent_limit,
                     updated_at = excluded.updated_at",
                params![
                    settings.tenant_id.as_str(),
                    settings.gateway_url,
                    settings.default_queue_id.as_ref().map(|q| q.as_str()),
                    settings.instance_limit,
                    settings.agent_limit,
                    ts(&deskline_core::types::now()),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
