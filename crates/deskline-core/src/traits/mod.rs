// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All backends extend [`PluginAdapter`] and use `#[async_trait]` so they can
//! be held as trait objects.

pub mod adapter;
pub mod gateway;
pub mod generator;
pub mod observer;
pub mod storage;

pub use adapter::PluginAdapter;
pub use gateway::ChannelGateway;
pub use generator::TextGenerator;
pub use observer::InboundObserver;
pub use storage::{InboundOutcome, InboundRecord, StorageAdapter};
