// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::types::{Message, Ticket};

/// Notified after an inbound message has been committed.
///
/// Observers run off the ingest path; whatever they do cannot fail ingestion.
#[async_trait]
pub trait InboundObserver: Send + Sync + 'static {
    async fn on_inbound(&self, ticket: &Ticket, message: &Message);
}
