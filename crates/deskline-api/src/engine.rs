// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles the four components over one storage and gateway.

use std::sync::Arc;

use deskline_autoreply::{AutoReplyEngine, AutoReplyPolicy, OpenAiCompatGenerator};
use deskline_config::model::DesklineConfig;
use deskline_core::{ChannelGateway, DesklineError, PluginAdapter, StorageAdapter, TextGenerator};
use deskline_gateway::{EndpointResolver, HttpGateway};
use deskline_pairing::{PairingManager, PairingSettings};
use deskline_router::{OutboundDispatcher, RouterSettings, TicketRouter};
use deskline_storage::SqliteStorage;
use deskline_sync::{SyncSettings, Synchronizer};
use tracing::{info, warn};

/// Everything a request handler needs.
pub struct Engine {
    pub storage: Arc<dyn StorageAdapter>,
    pub pairing: PairingManager,
    pub router: Arc<TicketRouter>,
    pub sync: Synchronizer,
    pub auto_reply: Arc<AutoReplyEngine>,
}

impl Engine {
    /// Wires the components over already-initialized adapters.
    pub fn assemble(
        config: &DesklineConfig,
        storage: Arc<dyn StorageAdapter>,
        gateway: Arc<dyn ChannelGateway>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        let endpoints = EndpointResolver::new(storage.clone(), config.gateway.base_url.clone());
        let pairing = PairingManager::new(
            storage.clone(),
            gateway.clone(),
            endpoints.clone(),
            PairingSettings::from_config(&config.pairing, &config.plan),
        );
        let dispatcher = OutboundDispatcher::new(storage.clone(), gateway, endpoints);

        if generator.is_none() {
            warn!("no text-generation provider configured, auto-reply is inert");
        }
        let auto_reply = Arc::new(AutoReplyEngine::new(
            storage.clone(),
            generator,
            dispatcher.clone(),
            AutoReplyPolicy::from_config(&config.auto_reply),
        ));
        let router = Arc::new(
            TicketRouter::new(
                storage.clone(),
                dispatcher,
                RouterSettings::from_config(&config.plan),
            )
            .with_observer(auto_reply.clone()),
        );
        let sync = Synchronizer::new(
            storage.clone(),
            router.clone(),
            SyncSettings::from_config(&config.sync),
        );

        Self {
            storage,
            pairing,
            router,
            sync,
            auto_reply,
        }
    }

    /// Opens SQLite storage and the HTTP adapters named by `config`.
    pub async fn from_config(config: &DesklineConfig) -> Result<Self, DesklineError> {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        info!(path = %config.storage.database_path, "storage initialized");

        let gateway = HttpGateway::new(&config.gateway)?;
        let generator = OpenAiCompatGenerator::from_config(&config.provider)?
            .map(|g| Arc::new(g) as Arc<dyn TextGenerator>);

        Ok(Self::assemble(
            config,
            Arc::new(storage),
            Arc::new(gateway),
            generator,
        ))
    }

    /// Cancels pairing attempts, waits for observer tasks and flushes storage.
    pub async fn shutdown(&self) -> Result<(), DesklineError> {
        self.pairing.shutdown();
        self.router.settle().await;
        self.storage.shutdown().await?;
        info!("engine shut down");
        Ok(())
    }
}
