// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bridge configuration loaded from TOML files, the environment, or
//! constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! host = "127.0.0.1"
//! port = 8765
//! transport = "http"
//! default_backend = "auto"
//!
//! [[preload]]
//! model_path = "./models/demo/model.onnx"
//! model_id = "demo"
//! ```
//!
//! Later sources win: defaults, then the TOML file, then
//! `ML_BRIDGE_HOST` / `ML_BRIDGE_PORT` / `ML_BRIDGE_TRANSPORT`, then
//! whatever the caller applies on top (CLI flags).

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use model_registry::BackendPreference;

use crate::RuntimeError;

pub const ENV_HOST: &str = "ML_BRIDGE_HOST";
pub const ENV_PORT: &str = "ML_BRIDGE_PORT";
pub const ENV_TRANSPORT: &str = "ML_BRIDGE_TRANSPORT";
/// Older names for [`ENV_HOST`] and [`ENV_PORT`], read when the primary
/// variable is unset or blank.
pub const ENV_HOST_ALIAS: &str = "MAX_BRIDGE_HOST";
pub const ENV_PORT_ALIAS: &str = "MAX_BRIDGE_PORT";

/// Default cap on an HTTP request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Which front end serves requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Line-delimited JSON over stdin/stdout.
    #[default]
    Stdio,
    Http,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" | "stream" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown transport '{other}'; expected 'stdio' or 'http'")),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        })
    }
}

/// A model loaded before the bridge reports ready.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PreloadModel {
    pub model_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// Configuration for the bridge.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BridgeConfig {
    /// HTTP bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    /// Backend used when a load request names none: `"auto"` or a kind.
    #[serde(default = "default_backend")]
    pub default_backend: String,
    #[serde(default)]
    pub preload: Vec<PreloadModel>,
    /// Largest accepted HTTP request body; larger bodies get 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_backend() -> String {
    "auto".to_string()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl BridgeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))?;
        config.backend_preference()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Applies `ML_BRIDGE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, RuntimeError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `ML_BRIDGE_*` overrides from an arbitrary lookup.
    ///
    /// `MAX_BRIDGE_HOST` and `MAX_BRIDGE_PORT` are honoured when the
    /// `ML_BRIDGE_*` variable of the same role is unset.
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RuntimeError> {
        let first_set = |keys: [&'static str; 2]| {
            keys.into_iter().find_map(|key| {
                lookup(key)
                    .filter(|value| !value.trim().is_empty())
                    .map(|value| (key, value))
            })
        };

        if let Some((_, host)) = first_set([ENV_HOST, ENV_HOST_ALIAS]) {
            self.host = host.trim().to_string();
        }
        if let Some((key, port)) = first_set([ENV_PORT, ENV_PORT_ALIAS]) {
            self.port = port.trim().parse().map_err(|e| {
                RuntimeError::ConfigError(format!("invalid {key} '{port}': {e}"))
            })?;
        }
        if let Some(transport) = lookup(ENV_TRANSPORT) {
            self.transport = transport.parse().map_err(RuntimeError::ConfigError)?;
        }
        Ok(self)
    }

    /// Parses [`Self::default_backend`].
    pub fn backend_preference(&self) -> Result<BackendPreference, RuntimeError> {
        self.default_backend
            .parse()
            .map_err(|e| RuntimeError::ConfigError(format!("invalid default_backend: {e}")))
    }

    /// Resolves `host:port` to a bindable address.
    pub fn socket_addr(&self) -> Result<SocketAddr, RuntimeError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                RuntimeError::ConfigError(format!("cannot resolve {}:{}: {e}", self.host, self.port))
            })?
            .next()
            .ok_or_else(|| {
                RuntimeError::ConfigError(format!("no address for {}:{}", self.host, self.port))
            })
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: Transport::default(),
            default_backend: default_backend(),
            preload: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default() {
        let c = BridgeConfig::default();
        assert_eq!(c.host, "0.0.0.0");
        assert_eq!(c.port, 8765);
        assert_eq!(c.transport, Transport::Stdio);
        assert_eq!(c.backend_preference().unwrap(), BackendPreference::Auto);
        assert!(c.preload.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
host = "127.0.0.1"
port = 9000
transport = "http"

[[preload]]
model_path = "/models/demo.onnx"
model_id = "demo"
"#;
        let c = BridgeConfig::from_toml(toml).unwrap();
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.port, 9000);
        assert_eq!(c.transport, Transport::Http);
        assert_eq!(c.default_backend, "auto");
        assert_eq!(c.preload.len(), 1);
        assert_eq!(c.preload[0].model_id.as_deref(), Some("demo"));
    }

    #[test]
    fn test_from_toml_rejects_unknown_backend() {
        let result = BridgeConfig::from_toml(r#"default_backend = "cuda""#);
        assert!(matches!(result, Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = BridgeConfig {
            port: 1234,
            preload: vec![PreloadModel {
                model_path: PathBuf::from("m.safetensors"),
                model_id: None,
                backend: Some("native".into()),
            }],
            ..Default::default()
        };
        let toml = c.to_toml().unwrap();
        let back = BridgeConfig::from_toml(&toml).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_env_overrides() {
        let c = BridgeConfig::default()
            .apply_env_from(env(&[
                (ENV_HOST, "127.0.0.1"),
                (ENV_PORT, "9999"),
                (ENV_TRANSPORT, "HTTP"),
            ]))
            .unwrap();
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.port, 9999);
        assert_eq!(c.transport, Transport::Http);
    }

    #[test]
    fn test_legacy_host_variable() {
        let c = BridgeConfig::default()
            .apply_env_from(env(&[(ENV_HOST_ALIAS, "10.0.0.5")]))
            .unwrap();
        assert_eq!(c.host, "10.0.0.5");
        assert_eq!(c.port, 8765);
    }

    #[test]
    fn test_legacy_port_variable() {
        let c = BridgeConfig::default()
            .apply_env_from(env(&[(ENV_PORT_ALIAS, "9100")]))
            .unwrap();
        assert_eq!(c.port, 9100);
        assert_eq!(c.host, "0.0.0.0");
    }

    #[test]
    fn test_primary_variables_win_over_legacy() {
        let c = BridgeConfig::default()
            .apply_env_from(env(&[
                (ENV_HOST, "127.0.0.1"),
                (ENV_HOST_ALIAS, "10.0.0.5"),
                (ENV_PORT, "9999"),
                (ENV_PORT_ALIAS, "9100"),
            ]))
            .unwrap();
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.port, 9999);
    }

    #[test]
    fn test_invalid_legacy_port_names_its_variable() {
        let err = BridgeConfig::default()
            .apply_env_from(env(&[(ENV_PORT_ALIAS, "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT_ALIAS), "{err}");
    }

    #[test]
    fn test_max_body_bytes_from_toml() {
        let c = BridgeConfig::from_toml("max_body_bytes = 1024").unwrap();
        assert_eq!(c.max_body_bytes, 1024);
        assert_eq!(BridgeConfig::from_toml("").unwrap().max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn test_env_invalid_port() {
        let result = BridgeConfig::default().apply_env_from(env(&[(ENV_PORT, "eighty")]));
        assert!(matches!(result, Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn test_socket_addr() {
        let c = BridgeConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(c.socket_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());
    }
}
