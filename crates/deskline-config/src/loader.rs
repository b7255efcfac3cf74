// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based layered configuration loading.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/deskline/deskline.toml`
//! 3. `~/.config/deskline/deskline.toml`
//! 4. `./deskline.toml`
//! 5. `DESKLINE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DesklineConfig;

/// Top-level sections, longest first so `auto_reply_` wins over shorter prefixes.
const SECTIONS: &[&str] = &[
    "auto_reply", "provider", "pairing", "service", "storage", "gateway", "plan", "sync", "api",
];

pub fn load_config() -> Result<DesklineConfig, figment::Error> {
    build_figment().extract()
}

/// Loads from a TOML string only; no files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<DesklineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DesklineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DesklineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DesklineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The unextracted figment for the standard hierarchy.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DesklineConfig::default()))
        .merge(Toml::file("/etc/deskline/deskline.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("deskline/deskline.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("deskline.toml"))
        .merge(env_provider())
}

/// Maps `DESKLINE_PAIRING_TIMEOUT_SECS` to `pairing.timeout_secs`.
///
/// Only the section prefix is split; key names keep their underscores.
fn env_provider() -> Env {
    Env::prefixed("DESKLINE_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("pairing_timeout_secs"), "pairing.timeout_secs");
        assert_eq!(map_env_key("auto_reply_only_unassigned"), "auto_reply.only_unassigned");
        assert_eq!(map_env_key("api_port"), "api.port");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("deskline.toml", "[api]\nport = 8000\n")?;
            jail.set_env("DESKLINE_API_PORT", "9100");
            jail.set_env("DESKLINE_AUTO_REPLY_HISTORY_LIMIT", "5");
            let config = load_config_from_path(Path::new("deskline.toml"))?;
            assert_eq!(config.api.port, 9100);
            assert_eq!(config.auto_reply.history_limit, 5);
            Ok(())
        });
    }
}
