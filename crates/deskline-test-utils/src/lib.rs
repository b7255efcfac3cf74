// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Deskline integration tests.
//!
//! Provides mock adapters and a temp-database harness for fast,
//! deterministic tests without a gateway bridge or an AI provider.
//!
//! # Components
//!
//! - [`MockGateway`] - Scripted pairing polls and captured outbound sends
//! - [`MockGenerator`] - Text generator with queued replies, failures and delays
//! - [`TestHarness`] - SQLite storage in a temp directory plus seeding helpers

pub mod harness;
pub mod mock_gateway;
pub mod mock_generator;

pub use harness::TestHarness;
pub use mock_gateway::{MockGateway, SentText};
pub use mock_generator::MockGenerator;
