//! TOML configuration for the Wisp daemon and client commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use wisp_types::Node;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// This node's identity and storage.
    pub node: NodeSection,
    /// Cluster membership and query settings.
    pub cluster: ClusterSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Hostname this node identifies as in the ring.
    pub host: String,
    /// Optional instance name for multi-store hosts.
    pub instance: Option<String>,
    /// Directory for series files.
    pub data_dir: PathBuf,
    /// Address for the node HTTP API.
    pub listen_addr: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".wisp"))
            .unwrap_or_else(|| PathBuf::from(".wisp"));
        Self {
            host: "localhost".to_string(),
            instance: None,
            data_dir,
            listen_addr: "0.0.0.0:4242".to_string(),
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Every node in the ring, as `host` or `host:instance` specs.
    ///
    /// Membership is config-driven; changing it means editing this list on
    /// every node and restarting.
    pub nodes: Vec<String>,
    /// Port the node HTTP API listens on, used for ring-view queries.
    pub port: u16,
    /// Per-request timeout for ring-view queries, in seconds.
    pub timeout_secs: u64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            port: 4242,
            timeout_secs: 10,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// This node's ring identity, `host` or `host:instance`.
    pub fn node_identity(&self) -> String {
        Node::new(self.node.host.clone(), self.node.instance.clone()).identity()
    }

    /// Effective ring-view query timeout.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster.timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[node]
host = "graphite010"
instance = "a"
data_dir = "/var/lib/wisp"
listen_addr = "0.0.0.0:4242"

[cluster]
nodes = ["graphite010:a", "graphite011", "graphite012"]
port = 4242
timeout_secs = 5

[log]
level = "debug"
"#;

        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.node.host, "graphite010");
        assert_eq!(config.node.instance.as_deref(), Some("a"));
        assert_eq!(config.node.data_dir, PathBuf::from("/var/lib/wisp"));
        assert_eq!(config.cluster.nodes.len(), 3);
        assert_eq!(config.cluster.port, 4242);
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.node_identity(), "graphite010:a");
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config.node.host, "localhost");
        assert_eq!(config.node.listen_addr, "0.0.0.0:4242");
        assert!(config.cluster.nodes.is_empty());
        assert_eq!(config.cluster.port, 4242);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.node_identity(), "localhost");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[cluster]
nodes = ["a", "b"]
"#;
        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.cluster.nodes, vec!["a", "b"]);
        // Unspecified sections get defaults.
        assert_eq!(config.node.host, "localhost");
        assert_eq!(config.cluster.port, 4242);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wisp.toml");
        std::fs::write(
            &path,
            r#"
[node]
host = "node1"
data_dir = "/tmp/wisp-test"
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.node.host, "node1");
        assert_eq!(config.node.data_dir, PathBuf::from("/tmp/wisp-test"));
    }

    #[test]
    fn test_timeout_never_zero() {
        let config = CliConfig::from_toml("[cluster]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(config.query_timeout(), Duration::from_secs(1));
    }
}
