// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket API for the Deskline conversation engine.
//!
//! Exposes ticket routing, instance pairing and auto-reply settings as a
//! JSON REST API, the gateway webhooks for inbound messages and receipts,
//! and a per-ticket WebSocket stream backed by the message synchronizer.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod server;
pub mod ws;

pub use engine::Engine;
pub use error::{ApiError, ErrorResponse};
pub use server::{ApiState, router, serve};
