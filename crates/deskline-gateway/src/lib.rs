// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP channel gateway adapter for the Deskline conversation engine.
//!
//! This crate implements [`ChannelGateway`] against the bridge contract
//! (`GET /qr`, `POST /send`, `POST /logout`) and resolves the tenant-scoped
//! bridge URL for each instance.

pub mod client;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskline_config::model::GatewayConfig;
use deskline_core::{
    AdapterType, ChannelGateway, DesklineError, GatewayEndpoint, HealthStatus, Instance,
    PairingPoll, PluginAdapter, StorageAdapter,
};
use tracing::{debug, info};

use crate::client::GatewayClient;

/// Channel gateway speaking the bridge HTTP contract.
pub struct HttpGateway {
    client: GatewayClient,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, DesklineError> {
        let client = GatewayClient::new(
            Duration::from_secs(config.request_timeout_secs),
            config.max_retries,
        )?;
        info!(
            timeout_secs = config.request_timeout_secs,
            max_retries = config.max_retries,
            "HTTP gateway initialized"
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl PluginAdapter for HttpGateway {
    fn name(&self) -> &str {
        "http-gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, DesklineError> {
        // Bridges are per tenant; there is no single endpoint to probe.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DesklineError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelGateway for HttpGateway {
    async fn poll_pairing(&self, endpoint: &GatewayEndpoint) -> Result<PairingPoll, DesklineError> {
        let qr = self.client.qr(&endpoint.base_url, &endpoint.instance_id).await?;
        Ok(if qr.connected {
            PairingPoll::Connected { phone: qr.phone }
        } else {
            match qr.qr {
                Some(code) if !code.is_empty() => PairingPoll::Code(code),
                _ => PairingPoll::Waiting,
            }
        })
    }

    async fn send_text(
        &self,
        endpoint: &GatewayEndpoint,
        jid: &str,
        text: &str,
    ) -> Result<(), DesklineError> {
        self.client
            .send(&endpoint.base_url, &endpoint.instance_id, jid, text)
            .await?;
        debug!(instance_id = %endpoint.instance_id, jid, "message handed to gateway");
        Ok(())
    }

    async fn teardown(&self, endpoint: &GatewayEndpoint) -> Result<(), DesklineError> {
        self.client
            .logout(&endpoint.base_url, &endpoint.instance_id)
            .await
    }
}

/// Resolves the bridge endpoint for an instance from its tenant's settings.
#[derive(Clone)]
pub struct EndpointResolver {
    storage: Arc<dyn StorageAdapter>,
    fallback_url: String,
}

impl EndpointResolver {
    /// `fallback_url` is used when the tenant has no gateway URL persisted.
    pub fn new(storage: Arc<dyn StorageAdapter>, fallback_url: impl Into<String>) -> Self {
        Self {
            storage,
            fallback_url: fallback_url.into(),
        }
    }

    pub async fn endpoint(&self, instance: &Instance) -> Result<GatewayEndpoint, DesklineError> {
        let base_url = self
            .storage
            .get_tenant_settings(&instance.owner_id)
            .await?
            .and_then(|s| s.gateway_url)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.fallback_url.clone());
        Ok(GatewayEndpoint {
            base_url,
            instance_id: instance.id.clone(),
        })
    }
}
