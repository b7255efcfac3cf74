// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use deskline_core::{Instance, InstanceId, InstanceStatus};
use serde::Serialize;

/// What viewers see of a pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingView {
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
    /// Latest pairing code; cleared once connected.
    pub code: Option<String>,
    pub phone: Option<String>,
    /// Why the last attempt failed.
    pub error: Option<String>,
}

impl PairingView {
    pub fn of(instance: &Instance) -> Self {
        Self {
            instance_id: instance.id.clone(),
            status: instance.status,
            code: None,
            phone: instance.phone.clone(),
            error: None,
        }
    }
}
