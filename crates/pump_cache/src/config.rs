/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Clone, Debug, serde::Deserialize)]
pub struct CacheConfig {
    /// Suppress a repeated self-refresh of the same entity inside this window (milliseconds).
    /// `0` disables the debounce.
    #[serde(default = "default_refresh_cooldown_ms")]
    pub refresh_cooldown_ms: u64,
    /// Server base URL, e.g. `https://pump.example`. When set, relative links are
    /// resolved against it and fetches for other hosts are dropped.
    #[serde(default)]
    pub site_url: Option<String>,
    /// Capacity of the cache-wide event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_refresh_cooldown_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_cooldown_ms: default_refresh_cooldown_ms(),
            site_url: None,
            event_buffer: default_event_buffer(),
        }
    }
}

impl CacheConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s).context("invalid cache config json")?;
        Ok(cfg.from_env_overrides())
    }

    /// `PUMP_REFRESH_COOLDOWN_MS` overrides the configured cooldown.
    pub fn from_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PUMP_REFRESH_COOLDOWN_MS") {
            if let Ok(ms) = v.trim().parse() {
                self.refresh_cooldown_ms = ms;
            }
        }
        self
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_millis(self.refresh_cooldown_ms)
    }

    /// Site URL without a trailing slash, with `https://` added when the scheme is missing.
    pub fn site_base(&self) -> Option<String> {
        let raw = self.site_url.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let mut url = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };
        while url.ends_with('/') {
            url.pop();
        }
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: CacheConfig = serde_json::from_str(r#"{"site_url": "pump.example/"}"#).unwrap();
        assert_eq!(cfg.refresh_cooldown(), Duration::from_secs(1));
        assert_eq!(cfg.event_buffer, 256);
        assert_eq!(cfg.site_base().as_deref(), Some("https://pump.example"));
    }

    #[test]
    fn blank_site_is_none() {
        let cfg = CacheConfig {
            site_url: Some("  ".to_string()),
            ..CacheConfig::default()
        };
        assert!(cfg.site_base().is_none());
    }
}
