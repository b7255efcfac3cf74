// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use deskline_core::{Agent, AgentId, AgentPresence, DesklineError, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::rows::{self, AGENT_COLUMNS, ts};

fn select(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Agent>> {
    conn.query_row(
        &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
        params![id],
        rows::agent,
    )
    .optional()
}

/// Inserts the agent iff the tenant has fewer than `limit` agents.
/// Returns `false` when the quota rejected it.
pub async fn create_agent(db: &Database, agent: &Agent, limit: u32) -> Result<bool, DesklineError> {
    let agent = agent.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let inserted = conn.execute(
                "INSERT INTO agents (id, tenant_id, identity_ref, display_name, presence, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE (SELECT COUNT(*) FROM agents WHERE tenant_id = ?2) < ?7",
                params![
                    agent.id.as_str(),
                    agent.tenant_id.as_str(),
                    agent.identity_ref,
                    agent.display_name,
                    agent.presence.to_string(),
                    ts(&deskline_core::types::now()),
                    limit,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_agent(db: &Database, id: &AgentId) -> Result<Option<Agent>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select(conn, &id))
        .await
        .map_err(map_tr_err)
}

pub async fn list_agents(db: &Database, tenant: &TenantId) -> Result<Vec<Agent>, DesklineError> {
    let tenant = tenant.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Agent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE tenant_id = ?1 ORDER BY display_name, id"
            ))?;
            let rows = stmt.query_map(params![tenant], rows::agent)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_presence(
    db: &Database,
    id: &AgentId,
    presence: AgentPresence,
) -> Result<Option<Agent>, DesklineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Agent>, rusqlite::Error> {
            conn.execute(
                "UPDATE agents SET presence = ?2 WHERE id = ?1",
                params![id, presence.to_string()],
            )?;
            select(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}
