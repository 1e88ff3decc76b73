// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The config provider contract (§6): everything the binary needs that isn't
//! passed on the command line. Loaded once at startup from YAML; never touched
//! again while the process runs.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;

pub const MAX_PUBLIC_IPS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },
    #[error("no public IP addresses configured")]
    NoPublicIps,
    #[error("{count} public IP addresses configured, exceeding the limit of {MAX_PUBLIC_IPS}")]
    TooManyPublicIps { count: usize },
    #[error("customer subnet prefix length {0} is not a valid IPv4 prefix (0-32)")]
    InvalidPrefixLen(u8),
}

/// Per-protocol idle-timeout overrides, in seconds. Any field left `None` keeps
/// the translation engine's built-in default for that state.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct TimeoutOverrides {
    pub tcp_syn_sent: Option<u64>,
    pub tcp_established: Option<u64>,
    pub tcp_fin_wait: Option<u64>,
    pub tcp_closing: Option<u64>,
    pub tcp_time_wait: Option<u64>,
    pub udp_active: Option<u64>,
    pub icmp_active: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
    #[serde(default = "default_true")]
    pub json_enabled: bool,
    #[serde(default = "default_json_port")]
    pub json_port: u16,
}

fn default_true() -> bool {
    true
}

fn default_prometheus_port() -> u16 {
    9100
}

fn default_json_port() -> u16 {
    8080
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_true(),
            prometheus_port: default_prometheus_port(),
            json_enabled: default_true(),
            json_port: default_json_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port_id: u16,
    pub queue_count: u32,
    pub worker_core_ids: Vec<u32>,
    pub public_ips: Vec<Ipv4Addr>,
    pub customer_subnet: Ipv4Addr,
    pub customer_prefix_len: u8,
    #[serde(default)]
    pub timeout_overrides: TimeoutOverrides,
    #[serde(default = "default_max_sessions_per_customer")]
    pub max_sessions_per_customer: u32,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_max_sessions_per_customer() -> u32 {
    65536
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml_ng::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.public_ips.is_empty() {
            return Err(ConfigError::NoPublicIps);
        }
        if self.public_ips.len() > MAX_PUBLIC_IPS {
            return Err(ConfigError::TooManyPublicIps {
                count: self.public_ips.len(),
            });
        }
        if self.customer_prefix_len > 32 {
            return Err(ConfigError::InvalidPrefixLen(self.customer_prefix_len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
port_id: 0
queue_count: 2
worker_core_ids: [1, 2]
public_ips: ["203.0.113.1", "203.0.113.2"]
customer_subnet: "10.0.0.0"
customer_prefix_len: 8
"#;

    #[test]
    fn parses_minimal_yaml_with_defaults() {
        let config: Config = serde_yaml_ng::from_str(SAMPLE).unwrap();
        assert_eq!(config.public_ips.len(), 2);
        assert_eq!(config.max_sessions_per_customer, 65536);
        assert!(config.telemetry.prometheus_enabled);
        assert_eq!(config.telemetry.prometheus_port, 9100);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_public_ip_list() {
        let config: Config = serde_yaml_ng::from_str(
            r#"
port_id: 0
queue_count: 1
worker_core_ids: [0]
public_ips: []
customer_subnet: "10.0.0.0"
customer_prefix_len: 8
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoPublicIps)));
    }

    #[test]
    fn rejects_too_many_public_ips() {
        let ips: Vec<String> = (0..11).map(|i| format!("203.0.113.{i}")).collect();
        let yaml = format!(
            "port_id: 0\nqueue_count: 1\nworker_core_ids: [0]\npublic_ips: {:?}\ncustomer_subnet: \"10.0.0.0\"\ncustomer_prefix_len: 8\n",
            ips
        );
        let config: Config = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::TooManyPublicIps { count: 11 })));
    }

    #[test]
    fn timeout_overrides_default_to_none() {
        let config: Config = serde_yaml_ng::from_str(SAMPLE).unwrap();
        assert_eq!(config.timeout_overrides.tcp_established, None);
    }

    #[test]
    fn load_reports_read_error_for_missing_file() {
        let err = Config::load("/nonexistent/cgnat/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
