// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-database harness with tenant seeding helpers.
//!
//! `TestHarness` opens a fresh SQLite store in a temp directory and seeds
//! queues, agents and connected instances for one tenant.

use std::sync::Arc;

use deskline_config::model::StorageConfig;
use deskline_core::types::now;
use deskline_core::{
    Agent, AgentId, AgentPresence, AutoReplySettings, DesklineError, Instance, InstanceId,
    InstanceStatus, ProviderKind, Queue, QueueId, StorageAdapter, TenantId, TenantSettings,
};
use deskline_storage::SqliteStorage;

/// Quota used by the seeding helpers; high enough never to interfere.
const SEED_LIMIT: u32 = 1_000;

/// A migrated temp database scoped to one tenant.
pub struct TestHarness {
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    /// Tenant every seeding helper writes under.
    pub tenant: TenantId,
    temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Opens a fresh store for tenant `acme`.
    pub async fn new() -> Result<Self, DesklineError> {
        Self::for_tenant(TenantId::from("acme")).await
    }

    pub async fn for_tenant(tenant: TenantId) -> Result<Self, DesklineError> {
        let temp_dir = tempfile::TempDir::new().map_err(DesklineError::storage)?;
        let config = StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().to_string(),
            wal_mode: true,
            feed_capacity: 256,
        };
        let storage = SqliteStorage::new(config);
        storage.initialize().await?;
        Ok(Self {
            storage: Arc::new(storage),
            tenant,
            temp_dir,
        })
    }

    /// Path of the SQLite file, for tests that need a second connection.
    pub fn database_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("test.db")
    }

    /// The store as a trait object, the way engine components hold it.
    pub fn dyn_storage(&self) -> Arc<dyn StorageAdapter> {
        self.storage.clone()
    }

    pub async fn queue(&self, name: &str) -> Result<Queue, DesklineError> {
        let queue = Queue {
            id: QueueId::generate(),
            tenant_id: self.tenant.clone(),
            name: name.to_string(),
            color: None,
        };
        self.storage.create_queue(&queue).await?;
        Ok(queue)
    }

    pub async fn agent(&self, name: &str) -> Result<Agent, DesklineError> {
        let agent = Agent {
            id: AgentId::generate(),
            tenant_id: self.tenant.clone(),
            identity_ref: format!("idp|{name}"),
            display_name: name.to_string(),
            presence: AgentPresence::Online,
        };
        self.storage.create_agent(&agent, SEED_LIMIT).await?;
        Ok(agent)
    }

    /// Inserts an instance that is already `connected`, skipping pairing.
    pub async fn connected_instance(
        &self,
        name: &str,
        default_queue: Option<&Queue>,
    ) -> Result<Instance, DesklineError> {
        let ts = now();
        let instance = Instance {
            id: InstanceId::generate(),
            owner_id: self.tenant.clone(),
            display_name: name.to_string(),
            status: InstanceStatus::Connected,
            phone: Some("5511000000000".to_string()),
            provider: ProviderKind::Whatsapp,
            default_queue_id: default_queue.map(|q| q.id.clone()),
            created_at: ts,
            updated_at: ts,
        };
        self.storage.create_instance(&instance, SEED_LIMIT).await?;
        Ok(instance)
    }

    pub async fn tenant_settings(&self, settings: TenantSettings) -> Result<(), DesklineError> {
        self.storage
            .upsert_tenant_settings(&TenantSettings {
                tenant_id: self.tenant.clone(),
                ..settings
            })
            .await
    }

    /// Turns auto-reply on with the given prompt.
    pub async fn enable_auto_reply(&self, prompt: &str) -> Result<(), DesklineError> {
        self.storage
            .upsert_auto_reply(&AutoReplySettings {
                tenant_id: self.tenant.clone(),
                enabled: true,
                temperature: 0.3,
                system_prompt: prompt.to_string(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_rows_belong_to_the_tenant() {
        let harness = TestHarness::new().await.unwrap();
        let queue = harness.queue("Sales").await.unwrap();
        let instance = harness
            .connected_instance("Main", Some(&queue))
            .await
            .unwrap();
        harness.agent("ana").await.unwrap();

        let stored = harness.storage.get_instance(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Connected);
        assert_eq!(stored.default_queue_id, Some(queue.id));
        assert_eq!(harness.storage.list_agents(&harness.tenant).await.unwrap().len(), 1);
    }
}
