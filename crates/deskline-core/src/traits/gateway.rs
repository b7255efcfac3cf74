// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel gateway trait: the external bridge that pairs devices and relays text.

use async_trait::async_trait;

use crate::error::DesklineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{GatewayEndpoint, PairingPoll};

/// Bridge to a messaging network.
///
/// Every call failure surfaces as [`DesklineError::GatewayUnreachable`].
#[async_trait]
pub trait ChannelGateway: PluginAdapter {
    /// Reports the current pairing state for the endpoint's instance.
    async fn poll_pairing(&self, endpoint: &GatewayEndpoint) -> Result<PairingPoll, DesklineError>;

    /// Delivers a text message to `jid` through the endpoint's instance.
    async fn send_text(
        &self,
        endpoint: &GatewayEndpoint,
        jid: &str,
        text: &str,
    ) -> Result<(), DesklineError>;

    /// Ends the gateway-side session for the instance.
    async fn teardown(&self, endpoint: &GatewayEndpoint) -> Result<(), DesklineError>;
}
