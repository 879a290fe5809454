use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::daemon_bridge::{BridgeTimeouts, DaemonEndpoint};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_MOUNT_PATH: &str = "/api";
const DEFAULT_DAEMON_HOST: &str = "localhost";
const DEFAULT_DAEMON_PORT: u16 = 9999;
const DEFAULT_DAEMON_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DAEMON_READ_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub log_json: bool,
    /// Normalized mount point: empty for the root, otherwise `/segment[/segment]`
    /// without a trailing slash.
    pub mount_path: String,
    pub daemon_host: String,
    pub daemon_port: u16,
    pub daemon_connect_timeout_ms: u64,
    pub daemon_read_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid AYAB_WEB_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid AYAB_DAEMON_PORT value '{value}': {source}")]
    InvalidDaemonPort {
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("invalid {name} value '{value}': expected a positive number of milliseconds")]
    InvalidTimeout { name: &'static str, value: String },
    #[error("invalid AYAB_WEB_MOUNT_PATH value '{0}': must start with '/'")]
    InvalidMountPath(String),
    #[error("AYAB_DAEMON_HOST must not be empty")]
    EmptyDaemonHost,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub daemon_host: Option<String>,
    pub daemon_port: Option<u16>,
    pub mount_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("AYAB_WEB_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = parse_bind_addr(&bind_addr_raw)?;

        let log_filter = env::var("AYAB_WEB_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_json = env::var("AYAB_WEB_LOG_JSON")
            .ok()
            .is_some_and(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"));

        let mount_path = normalize_mount_path(
            env::var("AYAB_WEB_MOUNT_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string())
                .as_str(),
        )?;

        let daemon_host = env::var("AYAB_DAEMON_HOST")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DAEMON_HOST.to_string());

        let daemon_port = match env::var("AYAB_DAEMON_PORT")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            Some(value) => parse_daemon_port(&value)?,
            None => DEFAULT_DAEMON_PORT,
        };

        let daemon_connect_timeout_ms = env_timeout_ms(
            "AYAB_DAEMON_CONNECT_TIMEOUT_MS",
            DEFAULT_DAEMON_CONNECT_TIMEOUT_MS,
        )?;
        let daemon_read_timeout_ms =
            env_timeout_ms("AYAB_DAEMON_READ_TIMEOUT_MS", DEFAULT_DAEMON_READ_TIMEOUT_MS)?;

        Ok(Self {
            bind_addr,
            log_filter,
            log_json,
            mount_path,
            daemon_host,
            daemon_port,
            daemon_connect_timeout_ms,
            daemon_read_timeout_ms,
        })
    }

    /// Command-line values win over the environment.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(bind) = overrides.bind_addr {
            self.bind_addr = parse_bind_addr(&bind)?;
        }
        if let Some(host) = overrides.daemon_host {
            let host = host.trim();
            if host.is_empty() {
                return Err(ConfigError::EmptyDaemonHost);
            }
            self.daemon_host = host.to_string();
        }
        if let Some(port) = overrides.daemon_port {
            self.daemon_port = port;
        }
        if let Some(mount) = overrides.mount_path {
            self.mount_path = normalize_mount_path(&mount)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn daemon_endpoint(&self) -> DaemonEndpoint {
        DaemonEndpoint::new(self.daemon_host.clone(), self.daemon_port)
    }

    #[must_use]
    pub fn bridge_timeouts(&self) -> BridgeTimeouts {
        BridgeTimeouts {
            connect: Duration::from_millis(self.daemon_connect_timeout_ms),
            read: Duration::from_millis(self.daemon_read_timeout_ms),
        }
    }
}

pub fn parse_bind_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidBindAddr {
            value: value.to_string(),
            source,
        })
}

pub fn parse_daemon_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidDaemonPort {
            value: value.to_string(),
            source,
        })
}

/// `/api/` and `/api` mount the same tree; `/` mounts at the root.
pub fn normalize_mount_path(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if !trimmed.starts_with('/') {
        return Err(ConfigError::InvalidMountPath(value.to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn env_timeout_ms(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = env::var(name).ok().filter(|value| !value.trim().is_empty()) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidTimeout { name, value: raw }),
    }
}

#[cfg(test)]
impl Config {
    #[must_use]
    pub fn for_tests(daemon_port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            log_json: false,
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            daemon_host: "127.0.0.1".to_string(),
            daemon_port,
            daemon_connect_timeout_ms: 500,
            daemon_read_timeout_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_path_drops_trailing_slash() {
        assert_eq!(normalize_mount_path("/api/").expect("valid"), "/api");
        assert_eq!(normalize_mount_path(" /ayab/api ").expect("valid"), "/ayab/api");
        assert_eq!(normalize_mount_path("/").expect("valid"), "");
    }

    #[test]
    fn mount_path_must_be_absolute() {
        let error = normalize_mount_path("api").expect_err("relative mount");
        assert!(matches!(error, ConfigError::InvalidMountPath(_)));
    }

    #[test]
    fn invalid_port_reports_raw_value() {
        let error = parse_daemon_port("99999").expect_err("port out of range");
        assert!(error.to_string().contains("'99999'"));
        assert_eq!(parse_daemon_port(" 9999 ").expect("valid port"), 9999);
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        assert!(matches!(
            parse_bind_addr("localhost"),
            Err(ConfigError::InvalidBindAddr { .. })
        ));
    }

    #[test]
    fn overrides_replace_environment_values() {
        let config = Config::for_tests(4242)
            .with_overrides(ConfigOverrides {
                bind_addr: Some("0.0.0.0:9000".to_string()),
                daemon_host: Some("knitpi.local".to_string()),
                daemon_port: Some(9999),
                mount_path: Some("/".to_string()),
            })
            .expect("valid overrides");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.daemon_endpoint().to_string(), "knitpi.local:9999");
        assert_eq!(config.mount_path, "");

        let error = Config::for_tests(4242)
            .with_overrides(ConfigOverrides {
                daemon_host: Some("  ".to_string()),
                ..ConfigOverrides::default()
            })
            .expect_err("blank host");
        assert!(matches!(error, ConfigError::EmptyDaemonHost));
    }

    #[test]
    fn derived_bridge_settings_follow_config() {
        let config = Config::for_tests(4242);
        assert_eq!(config.daemon_endpoint().to_string(), "127.0.0.1:4242");
        assert_eq!(config.bridge_timeouts().read, Duration::from_millis(500));
    }
}
