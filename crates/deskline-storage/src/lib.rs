// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Deskline conversation engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, guarded single-statement state
//! transitions for instances and tickets, and an in-process change feed
//! published after every committed write.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
pub(crate) mod rows;

pub use adapter::SqliteStorage;
pub use database::Database;
