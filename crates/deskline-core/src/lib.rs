// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Deskline conversation engine.
//!
//! This crate provides the domain types, error taxonomy, change feed and
//! adapter traits shared by every other Deskline crate.

pub mod error;
pub mod feed;
pub mod traits;
pub mod types;

pub use error::DesklineError;
pub use feed::{ChangeEvent, ChangeKind, ChangeRow, FeedFilter, FeedHub, FeedSubscription, Table};
pub use types::{
    AdapterType, Agent, AgentId, AgentPresence, AutoReplySettings, Contact, ContactId,
    GatewayEndpoint, GatewayEvent, GenerationRequest, HealthStatus, HistoryRole, HistoryTurn,
    InboundMessage, Instance, InstanceId, InstanceStatus, LastMessage, Message, MessageDirection,
    MessageId, MessageStatus, PairingPoll, ProviderKind, Queue, QueueDisposal, QueueId, TenantId,
    TenantSettings, Ticket, TicketId, TicketStatus, TicketView,
};

pub use traits::{
    ChannelGateway, InboundObserver, InboundOutcome, InboundRecord, PluginAdapter,
    StorageAdapter, TextGenerator,
};
