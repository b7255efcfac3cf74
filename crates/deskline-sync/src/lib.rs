// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime message synchronization for ticket viewers.
//!
//! [`MessageTimeline`] is the pure merge of persisted and optimistic
//! messages. [`Synchronizer`] keeps one timeline per viewer in step with the
//! storage change feed and backfills after the feed drops.

pub mod synchronizer;
pub mod timeline;

pub use synchronizer::{SyncHandle, SyncSettings, SyncUpdate, Synchronizer};
pub use timeline::{MessageTimeline, TimelineEntry};
