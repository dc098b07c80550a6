// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// WebSocket endpoint of the agent backend, e.g. `ws://127.0.0.1:8000/ws`
    /// or `wss://` for TLS deployments.
    #[serde(default = "default_url")]
    pub url: String,
    /// Optional bearer token, sent as `Authorization: Bearer <token>` during
    /// the WebSocket upgrade handshake.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum suffix/prefix length (chars) scanned when deduplicating a
    /// resent fragment.  100 was chosen empirically against the backend's
    /// observed resend sizes; raise it if joins show duplicated text.
    #[serde(default = "default_overlap_window")]
    pub overlap_window: usize,
    /// Initial channel text before real content arrives.  The first envelope
    /// replaces it rather than appending.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// First reconnect delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt: `delay = base * factor^attempt`.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Connect attempts per outage before surfacing `ConnectionLost`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_url() -> String {
    "ws://127.0.0.1:8000/ws".to_string()
}

fn default_overlap_window() -> usize {
    100
}

fn default_placeholder() -> String {
    "working...\n\n".to_string()
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overlap_window: default_overlap_window(),
            placeholder: default_placeholder(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_attempts: default_max_attempts(),
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.backend.url.starts_with("ws://"));
        assert_eq!(cfg.engine.overlap_window, 100);
        assert_eq!(cfg.transport.max_attempts, 5);
        assert!(cfg.transport.backoff_factor > 1.0);
    }

    #[test]
    fn partial_toml_fills_missing_fields_from_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [backend]
            url = "wss://db.example.com/ws"
            token = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.backend.url, "wss://db.example.com/ws");
        assert_eq!(cfg.backend.token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.engine.overlap_window, 100);
        assert_eq!(cfg.transport.base_delay_ms, 500);
    }

    #[test]
    fn overlap_window_is_tunable() {
        let cfg: Config = toml::from_str(
            r#"
            [engine]
            overlap_window = 256
            placeholder = ""
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.overlap_window, 256);
        assert_eq!(cfg.engine.placeholder, "");
    }
}
