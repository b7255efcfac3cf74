// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket routing for the Deskline conversation engine.
//!
//! [`TicketRouter`] files inbound messages against tickets and drives the
//! claim/transfer/resolve life cycle. Every ownership change is a single
//! conditional write in storage. [`OutboundDispatcher`] is the one path
//! outbound text takes, for human and AI replies alike.

pub mod dispatch;
pub mod router;

pub use dispatch::{OutboundDispatcher, OutboundRequest};
pub use router::{RouterSettings, TicketRouter};
