// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types of the gateway bridge HTTP contract.

use serde::{Deserialize, Serialize};

/// Body of `GET /qr`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QrResponse {
    /// Pairing code to render, `null` until the bridge has one.
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub connected: bool,
    /// Phone identifier, reported by bridges that know it once connected.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Body of `POST /send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest<'a> {
    pub jid: &'a str,
    pub message: &'a str,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
