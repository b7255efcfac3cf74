// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-reply for the Deskline conversation engine.
//!
//! [`AutoReplyEngine`] observes committed inbound messages and, when the
//! tenant has auto-reply enabled, answers through the same outbound path a
//! human reply takes. [`OpenAiCompatGenerator`] is the bundled
//! [`TextGenerator`](deskline_core::TextGenerator).

pub mod engine;
pub mod openai;
pub mod types;

pub use engine::{AutoReplyEngine, AutoReplyPolicy};
pub use openai::OpenAiCompatGenerator;
