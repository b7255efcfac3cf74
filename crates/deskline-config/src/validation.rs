// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use std::ops::RangeInclusive;

use crate::diagnostic::ConfigError;
use crate::model::DesklineConfig;

const PAIRING_TIMEOUT_RANGE: RangeInclusive<u64> = 60..=120;
const AUTO_REPLY_TIMEOUT_RANGE: RangeInclusive<u64> = 10..=15;
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Collects every violation instead of failing on the first.
pub fn validate_config(config: &DesklineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.service.default_tenant.trim().is_empty() {
        fail("service.default_tenant must not be empty".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.storage.feed_capacity == 0 {
        fail("storage.feed_capacity must be at least 1".to_string());
    }

    let gateway_url = config.gateway.base_url.trim();
    if !(gateway_url.starts_with("http://") || gateway_url.starts_with("https://")) {
        fail(format!(
            "gateway.base_url `{gateway_url}` must start with http:// or https://"
        ));
    }

    if config.gateway.request_timeout_secs == 0 {
        fail("gateway.request_timeout_secs must be at least 1".to_string());
    }

    if !PAIRING_TIMEOUT_RANGE.contains(&config.pairing.timeout_secs) {
        fail(format!(
            "pairing.timeout_secs must be between {} and {}, got {}",
            PAIRING_TIMEOUT_RANGE.start(),
            PAIRING_TIMEOUT_RANGE.end(),
            config.pairing.timeout_secs
        ));
    }

    if config.pairing.poll_interval_ms == 0 {
        fail("pairing.poll_interval_ms must be at least 1".to_string());
    }

    if !AUTO_REPLY_TIMEOUT_RANGE.contains(&config.auto_reply.timeout_secs) {
        fail(format!(
            "auto_reply.timeout_secs must be between {} and {}, got {}",
            AUTO_REPLY_TIMEOUT_RANGE.start(),
            AUTO_REPLY_TIMEOUT_RANGE.end(),
            config.auto_reply.timeout_secs
        ));
    }

    if config.provider.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        fail("provider.api_key must not be blank when set".to_string());
    }

    if config.api.host.trim().is_empty() {
        fail("api.host must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&DesklineConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_violations() {
        let mut config = DesklineConfig::default();
        config.pairing.timeout_secs = 30;
        config.auto_reply.timeout_secs = 60;
        config.service.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn pairing_window_bounds_are_inclusive() {
        let mut config = DesklineConfig::default();
        config.pairing.timeout_secs = 60;
        assert!(validate_config(&config).is_ok());
        config.pairing.timeout_secs = 120;
        assert!(validate_config(&config).is_ok());
        config.pairing.timeout_secs = 121;
        assert!(validate_config(&config).is_err());
    }
}
