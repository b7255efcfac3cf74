// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance connection manager for the Deskline conversation engine.
//!
//! Drives each channel instance through
//! `uninitialized -> generating_code -> awaiting_scan -> connected`, failing
//! attempts that are not confirmed before the pairing deadline, and exposes
//! the live pairing code to viewers.

pub mod manager;
pub mod view;

pub use manager::{NewInstance, PairingManager, PairingSettings};
pub use view::PairingView;
