// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so typos fail at startup.

use serde::{Deserialize, Serialize};

/// Top-level Deskline configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DesklineConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Channel gateway client settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub pairing: PairingConfig,

    /// Plan limits applied when a tenant has none persisted.
    #[serde(default)]
    pub plan: PlanConfig,

    #[serde(default)]
    pub auto_reply: AutoReplyConfig,

    /// Text-generation provider. Auto-reply is inert without one.
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Tenant used by single-tenant deployments and the CLI.
    #[serde(default = "default_tenant")]
    pub default_tenant: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            default_tenant: default_tenant(),
        }
    }
}

fn default_service_name() -> String {
    "deskline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tenant() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Events buffered per change-feed subscriber before it is disconnected.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            feed_capacity: default_feed_capacity(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("deskline/deskline.db").display().to_string())
        .unwrap_or_else(|| "deskline.db".to_string())
}

fn default_feed_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Used when a tenant has no gateway URL persisted.
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for transient gateway statuses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairingConfig {
    /// Seconds before an unscanned pairing attempt is failed.
    #[serde(default = "default_pairing_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_pairing_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_pairing_timeout_secs() -> u64 {
    90
}

fn default_poll_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,

    #[serde(default = "default_max_agents")]
    pub max_agents: u32,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_instances: default_max_instances(),
            max_agents: default_max_agents(),
        }
    }
}

fn default_max_instances() -> u32 {
    1
}

fn default_max_agents() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AutoReplyConfig {
    /// Upper bound on a single generation call.
    #[serde(default = "default_auto_reply_timeout_secs")]
    pub timeout_secs: u64,

    /// Prior messages handed to the generator.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Skip tickets that already have an owner.
    #[serde(default)]
    pub only_unassigned: bool,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_auto_reply_timeout_secs(),
            history_limit: default_history_limit(),
            only_unassigned: false,
        }
    }
}

fn default_auto_reply_timeout_secs() -> u64 {
    12
}

fn default_history_limit() -> u32 {
    10
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// `None` disables the provider.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_key: None,
            model: default_model(),
        }
    }
}

fn default_provider_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Window within which an unkeyed outbound echo matches an optimistic entry.
    #[serde(default = "default_match_window_ms")]
    pub match_window_ms: u64,

    /// Maximum messages fetched per backfill after a feed drop.
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            match_window_ms: default_match_window_ms(),
            backfill_limit: default_backfill_limit(),
        }
    }
}

fn default_match_window_ms() -> u64 {
    5000
}

fn default_backfill_limit() -> u32 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}
