use clap::ArgAction::Append;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_NODES: [&str; 3] = ["edge-us-east-1", "edge-eu-west-1", "edge-ap-south-1"];

/// Main configuration structure that can be loaded from CLI or a config file
///
/// Example configuration file content
/// # Stream Gate Configuration
///
/// listen_on_port = 8080
/// session_ttl_secs = 3600
/// delivery_ttl_secs = 60
/// sweep_interval_secs = 30
///
/// # Upstream origin, segments are fetched from <origin>/<content id>/<path>
/// upstream_origin = "https://origin.example.com/media"
/// nodes = ["edge-us-east-1", "edge-eu-west-1"]
///
/// # Hash salts (random per process when omitted)
/// session_secret = "change-me"
/// delivery_secret = "change-me-too"
///
/// [accounts]
/// demo = "demo123"
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Session credential lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Delivery credential lifetime in seconds, must be shorter than the session lifetime
    #[arg(long, default_value_t = 60)]
    #[serde(default = "default_delivery_ttl")]
    pub delivery_ttl_secs: u64,

    /// Interval between expiry sweeps in seconds
    #[arg(long, default_value_t = 30)]
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Upstream origin segments are proxied from
    #[arg(short, long, default_value = "https://origin.example.com/media")]
    #[serde(default = "default_upstream_origin")]
    pub upstream_origin: String,

    /// Upstream node identifiers, can be specified multiple times.
    /// Defaults to the built-in pool when none are given.
    #[arg(long = "node", action = Append)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,

    /// Salt for session credentials
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,

    /// Salt for delivery credentials
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_secret: Option<String>,

    /// Number of lifecycle events kept for /log
    #[arg(long, default_value_t = 200)]
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,

    /// Configuration file path
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Login table, username -> password. Config file only.
    #[arg(skip = default_accounts())]
    #[serde(default = "default_accounts")]
    pub accounts: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            session_ttl_secs: default_session_ttl(),
            delivery_ttl_secs: default_delivery_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            upstream_origin: default_upstream_origin(),
            nodes: Vec::new(),
            session_secret: None,
            delivery_secret: None,
            event_log_capacity: default_event_log_capacity(),
            config: None,
            accounts: default_accounts(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.session_ttl_secs == default_session_ttl() {
            self.session_ttl_secs = file_config.session_ttl_secs;
        }
        if self.delivery_ttl_secs == default_delivery_ttl() {
            self.delivery_ttl_secs = file_config.delivery_ttl_secs;
        }
        if self.sweep_interval_secs == default_sweep_interval() {
            self.sweep_interval_secs = file_config.sweep_interval_secs;
        }
        if self.upstream_origin == default_upstream_origin() {
            self.upstream_origin = file_config.upstream_origin;
        }
        if self.event_log_capacity == default_event_log_capacity() {
            self.event_log_capacity = file_config.event_log_capacity;
        }

        if self.nodes.is_empty() {
            self.nodes = file_config.nodes;
        }
        if self.session_secret.is_none() {
            self.session_secret = file_config.session_secret;
        }
        if self.delivery_secret.is_none() {
            self.delivery_secret = file_config.delivery_secret;
        }

        // accounts only come from the file
        self.accounts = file_config.accounts;

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.delivery_ttl_secs == 0 {
            return Err(anyhow::anyhow!("delivery_ttl_secs must be greater than 0"));
        }
        if self.delivery_ttl_secs >= self.session_ttl_secs {
            return Err(anyhow::anyhow!(
                "delivery_ttl_secs ({}) must be shorter than session_ttl_secs ({})",
                self.delivery_ttl_secs,
                self.session_ttl_secs
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!("sweep_interval_secs must be greater than 0"));
        }

        if !self.upstream_origin.starts_with("http://")
            && !self.upstream_origin.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "Upstream origin must start with http:// or https://"
            ));
        }

        if self.nodes.iter().any(|node| node.trim().is_empty()) {
            return Err(anyhow::anyhow!("Node identifiers cannot be empty"));
        }

        if self.accounts.is_empty() {
            return Err(anyhow::anyhow!("At least one account is required"));
        }

        Ok(())
    }

    /// Configured node pool, or the built-in one
    pub fn node_ids(&self) -> Vec<String> {
        if self.nodes.is_empty() {
            return DEFAULT_NODES.iter().map(|node| node.to_string()).collect();
        }
        self.nodes.clone()
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_delivery_ttl() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_upstream_origin() -> String {
    "https://origin.example.com/media".to_string()
}

fn default_event_log_capacity() -> usize {
    200
}

fn default_accounts() -> HashMap<String, String> {
    HashMap::from([
        ("demo".to_string(), "demo123".to_string()),
        ("viewer".to_string(), "letmein".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.delivery_ttl_secs, 60);
        assert_eq!(config.sweep_interval_secs, 30);
        assert_eq!(config.node_ids().len(), DEFAULT_NODES.len());
    }

    #[test]
    fn test_delivery_ttl_must_be_shorter() {
        let config = Config {
            delivery_ttl_secs: 3600,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            delivery_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_upstream_and_nodes() {
        let config = Config {
            upstream_origin: "ftp://origin".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            nodes: vec!["edge-1".into(), " ".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            accounts: HashMap::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::parse_from([
            "stream-gate",
            "--listen-on-port",
            "9000",
            "--delivery-ttl-secs",
            "30",
            "--node",
            "a",
            "--node",
            "b",
        ]);
        assert_eq!(config.listen_on_port, 9000);
        assert_eq!(config.delivery_ttl_secs, 30);
        assert_eq!(config.node_ids(), ["a", "b"]);
        assert_eq!(config.accounts, default_accounts());
    }

    #[test]
    fn test_file_merge_cli_wins() {
        let path = std::env::temp_dir().join(format!(
            "stream-gate-config-{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
listen_on_port = 9100
session_ttl_secs = 7200
upstream_origin = "http://origin.local"
nodes = ["file-node"]

[accounts]
alice = "secret"
"#
        )
        .unwrap();

        let file_config = Config::from_file(&path).unwrap();
        assert_eq!(file_config.delivery_ttl_secs, 60);

        let cli = Config::parse_from(["stream-gate", "--session-ttl-secs", "1800"]);
        let merged = cli.merge_with_file(file_config);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(merged.listen_on_port, 9100);
        assert_eq!(merged.session_ttl_secs, 1800);
        assert_eq!(merged.upstream_origin, "http://origin.local");
        assert_eq!(merged.node_ids(), ["file-node"]);
        assert_eq!(merged.accounts.get("alice").map(String::as_str), Some("secret"));
        assert!(merged.validate().is_ok());
    }
}
