// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and the Deskline engine.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current time truncated to the microsecond precision storage keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Account that owns instances, queues, agents and settings.
    TenantId
);
string_id!(
    /// Identifier of a paired channel instance.
    InstanceId
);
string_id!(
    /// Identifier of a routing queue.
    QueueId
);
string_id!(
    /// Identifier of a human agent.
    AgentId
);
string_id!(
    /// Identifier of an external contact.
    ContactId
);
string_id!(
    /// Identifier of a ticket.
    TicketId
);
string_id!(
    /// Identifier of a persisted message.
    MessageId
);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Gateway,
    Generator,
}

// --- Instances ---

/// Pairing life cycle of a channel instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Uninitialized,
    GeneratingCode,
    AwaitingScan,
    Connected,
    Failed,
}

impl InstanceStatus {
    /// Returns true if `next` is a legal edge from `self`.
    ///
    /// Forward progression is strict: `uninitialized -> generating_code ->
    /// awaiting_scan -> connected`. Any non-failed state may fail, and
    /// `failed`/`connected` return to `uninitialized` on disconnect.
    pub fn can_transition_to(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Uninitialized, GeneratingCode)
                | (GeneratingCode, AwaitingScan)
                | (AwaitingScan, Connected)
                | (Uninitialized | GeneratingCode | AwaitingScan | Connected, Failed)
                | (Failed | Connected, Uninitialized)
        )
    }

    /// All states from which `next` is reachable in one edge.
    pub fn predecessors(next: InstanceStatus) -> Vec<InstanceStatus> {
        use InstanceStatus::*;
        [Uninitialized, GeneratingCode, AwaitingScan, Connected, Failed]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// States that count against the plan's instance quota.
    pub fn holds_quota_slot(self) -> bool {
        matches!(
            self,
            InstanceStatus::GeneratingCode | InstanceStatus::AwaitingScan | InstanceStatus::Connected
        )
    }

    /// States in which a pairing attempt is in flight.
    pub fn is_pairing(self) -> bool {
        matches!(
            self,
            InstanceStatus::GeneratingCode | InstanceStatus::AwaitingScan
        )
    }
}

/// Messaging network an instance bridges to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Whatsapp,
    Telegram,
    Instagram,
    Generic,
}

/// A paired messaging-channel endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub owner_id: TenantId,
    pub display_name: String,
    pub status: InstanceStatus,
    /// Set only once the instance is connected.
    pub phone: Option<String>,
    pub provider: ProviderKind,
    pub default_queue_id: Option<QueueId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Queues, agents, contacts ---

/// A named bucket of pending tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub tenant_id: TenantId,
    pub name: String,
    pub color: Option<String>,
}

/// What happens to a deleted queue's tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueDisposal {
    /// Move every ticket to another queue.
    ReassignTo(QueueId),
    /// Keep the tickets with no queue.
    Orphan,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentPresence {
    Online,
    Offline,
}

/// A human operator who can own tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    /// Reference into the external identity provider.
    pub identity_ref: String,
    pub display_name: String,
    pub presence: AgentPresence,
}

/// An external party identified by its network address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub tenant_id: TenantId,
    /// Network address, e.g. a phone number.
    pub address: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

// --- Tickets ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Open,
    Closed,
}

/// Snapshot of the latest message shown in ticket lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub body: String,
    pub direction: MessageDirection,
    pub at: DateTime<Utc>,
}

/// An ongoing conversation with a contact, owned by at most one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub instance_id: InstanceId,
    pub queue_id: Option<QueueId>,
    pub owner_id: Option<AgentId>,
    pub status: TicketStatus,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub tags: Vec<String>,
    /// Agent that resolved the ticket; kept for history once `owner_id` is cleared.
    pub resolved_by: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// `owner != null <=> status == open`.
    pub fn ownership_consistent(&self) -> bool {
        self.owner_id.is_some() == (self.status == TicketStatus::Open)
    }
}

/// Ticket list filters exposed to viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketView {
    /// Open tickets owned by the agent.
    Mine(AgentId),
    /// Pending tickets, optionally restricted to one queue.
    Queued(Option<QueueId>),
    Closed,
}

// --- Messages ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Position in the delivery progression; `failed` ranks with `delivered`
    /// so that merges never move a failed message back to `sent`.
    pub fn rank(self) -> u8 {
        match self {
            MessageStatus::Sent => 0,
            MessageStatus::Delivered | MessageStatus::Failed => 1,
            MessageStatus::Read => 2,
        }
    }

    /// `sent -> delivered -> read` only moves forward; `failed` is reachable from `sent` only.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Sent, MessageStatus::Failed) => true,
            (MessageStatus::Failed, _) | (_, MessageStatus::Failed) => false,
            (from, to) => to.rank() > from.rank(),
        }
    }

    /// Picks the status two observations of the same message converge on.
    pub fn merge(self, other: MessageStatus) -> MessageStatus {
        if other.rank() > self.rank() {
            other
        } else if other.rank() == self.rank() && other == MessageStatus::Failed {
            // Deterministic tie: failed wins over delivered regardless of arrival order.
            other
        } else {
            self
        }
    }
}

/// A persisted message. Immutable except for monotonic status updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub ticket_id: TicketId,
    pub direction: MessageDirection,
    pub body: String,
    pub status: MessageStatus,
    pub is_ai_generated: bool,
    /// Client-supplied id that ties an optimistic send to its persisted record.
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Ordering key: `(created_at, id)` breaks timestamp ties deterministically.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// An inbound message delivered by a channel gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub tenant_id: TenantId,
    pub instance_id: InstanceId,
    /// Sender address on the external network.
    pub contact_address: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    pub body: String,
}

// --- Settings ---

/// Per-tenant auto-reply policy. One row per tenant with upsert semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoReplySettings {
    pub tenant_id: TenantId,
    pub enabled: bool,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    pub system_prompt: String,
}

impl AutoReplySettings {
    /// Settings used when a tenant has never written any.
    pub fn disabled(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            enabled: false,
            temperature: 0.7,
            system_prompt: String::new(),
        }
    }

    pub fn temperature_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.temperature)
    }
}

/// Tenant-scoped configuration persisted alongside the tenant's data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: TenantId,
    pub gateway_url: Option<String>,
    pub default_queue_id: Option<QueueId>,
    pub instance_limit: Option<u32>,
    pub agent_limit: Option<u32>,
}

impl Default for TenantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

// --- Gateway ---

/// Where to reach the gateway bridge for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub base_url: String,
    pub instance_id: InstanceId,
}

/// One observation of the gateway's pairing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingPoll {
    /// The gateway has not issued a code yet.
    Waiting,
    /// A code is ready to be scanned.
    Code(String),
    /// The scan completed.
    Connected { phone: Option<String> },
}

/// Out-of-band pairing notifications pushed by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    CodeIssued { code: String },
    ScanConfirmed { phone: Option<String> },
    Error { message: String },
}

// --- Text generation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    Contact,
    Agent,
}

/// One prior turn handed to the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub text: String,
}

/// Input for a text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub temperature: f32,
    pub history: Vec<HistoryTurn>,
}
