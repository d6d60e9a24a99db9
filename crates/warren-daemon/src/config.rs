//! Configuration file management.
//!
//! TOML with one section per subsystem; every field has a default so an
//! absent file yields a working node.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// UDP communicator settings.
    #[serde(default)]
    pub udp: UdpConfig,
    /// Topology settings.
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Naming-layer settings.
    #[serde(default)]
    pub gns: GnsConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// `[udp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Bind specification: `"[host]:port"`, `"host:port"` or `"port"`.
    /// Empty means an OS-chosen port on the wildcard address.
    #[serde(default)]
    pub bindto: String,
    #[serde(default)]
    pub disable_v6: bool,
    #[serde(default)]
    pub disable_broadcast: bool,
}

/// `[topology]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub friends_only: bool,
    #[serde(default)]
    pub minimum_friends: u32,
    #[serde(default = "default_target_connections")]
    pub target_connection_count: u32,
    /// Friends file path. Empty = `$data_dir/friends`.
    #[serde(default)]
    pub friends: String,
}

/// `[gns]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GnsConfig {
    #[serde(default = "default_max_queries")]
    pub max_parallel_background_queries: u32,
    #[serde(default = "default_replication")]
    pub dht_replication_level: u32,
    /// Default lookup timeout in seconds.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// Timeout for one DHT operation in seconds.
    #[serde(default = "default_dht_timeout")]
    pub dht_timeout_secs: u64,
    /// Nickname published under the zone's root label. Empty = the
    /// node's peer identity in base32.
    #[serde(default)]
    pub nickname: String,
}

/// `[log]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_target_connections() -> u32 {
    16
}

fn default_max_queries() -> u32 {
    500
}

fn default_replication() -> u32 {
    5
}

fn default_lookup_timeout() -> u64 {
    10
}

fn default_dht_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bindto: String::new(),
            disable_v6: false,
            disable_broadcast: false,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            friends_only: false,
            minimum_friends: 0,
            target_connection_count: default_target_connections(),
            friends: String::new(),
        }
    }
}

impl Default for GnsConfig {
    fn default() -> Self {
        Self {
            max_parallel_background_queries: default_max_queries(),
            dht_replication_level: default_replication(),
            lookup_timeout_secs: default_lookup_timeout(),
            dht_timeout_secs: default_dht_timeout(),
            nickname: String::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// The resolved data directory.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("WARREN_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".warren"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/warren"))
    }

    fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// The friends file path, honoring the override.
    pub fn friends_path(&self) -> PathBuf {
        if self.topology.friends.is_empty() {
            Self::data_dir().join("friends")
        } else {
            PathBuf::from(&self.topology.friends)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.topology.target_connection_count, 16);
        assert_eq!(config.topology.minimum_friends, 0);
        assert_eq!(config.gns.max_parallel_background_queries, 500);
        assert_eq!(config.gns.dht_replication_level, 5);
        assert_eq!(config.gns.lookup_timeout_secs, 10);
        assert_eq!(config.gns.dht_timeout_secs, 60);
        assert!(!config.udp.disable_v6);
    }

    #[test]
    fn test_roundtrip() {
        let config = DaemonConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let parsed: DaemonConfig = toml::from_str(&text).expect("parse");
        assert_eq!(
            parsed.topology.target_connection_count,
            config.topology.target_connection_count
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: DaemonConfig = toml::from_str(
            "[udp]\nbindto = \"2086\"\ndisable_broadcast = true\n",
        )
        .expect("parse");
        assert_eq!(parsed.udp.bindto, "2086");
        assert!(parsed.udp.disable_broadcast);
        assert_eq!(parsed.topology.target_connection_count, 16);
    }
}
