// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text-generation capability used by auto-reply.

use async_trait::async_trait;

use crate::error::DesklineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::GenerationRequest;

#[async_trait]
pub trait TextGenerator: PluginAdapter {
    /// Produces a reply for the given prompt, temperature and history.
    ///
    /// Failures surface as [`DesklineError::AiUnavailable`].
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DesklineError>;
}
