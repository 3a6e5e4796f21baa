//! Configuration types

use serde::Deserialize;
use std::collections::HashMap;

/// Root configuration structure
///
/// # Example
///
/// ```yaml
/// server:
///   listen_address: "127.0.0.1"
///   listen_port: 5433
///
/// upstream:
///   host: "127.0.0.1"
///   port: 5432
///
/// service_credentials:
///   username: "postgres"
///   password: "secret"
///
/// users:
///   game13:
///     password: "123"
///
/// firewall:
///   allowed_tables: [dau, sales_log]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,

    /// Upstream database server
    pub upstream: UpstreamConfig,

    /// Service account used for the upstream connection
    pub service_credentials: CredentialsConfig,

    /// Proxy users allowed to connect, keyed by username
    pub users: HashMap<String, UserConfig>,

    /// Statement firewall policy
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Look up the password configured for a proxy user.
    pub fn user_password(&self, user: &str) -> Option<&str> {
        self.users.get(user).map(|u| u.password.as_str())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.listen_address.is_empty() {
            return Err("server.listen_address must not be empty".to_string());
        }
        if self.upstream.host.is_empty() {
            return Err("upstream.host must not be empty".to_string());
        }
        if self.upstream.port == 0 {
            return Err("upstream.port must not be 0".to_string());
        }
        if self.service_credentials.username.is_empty() {
            return Err("service_credentials.username must not be empty".to_string());
        }
        if self.users.is_empty() {
            return Err("at least one entry under users is required".to_string());
        }
        Ok(())
    }
}

/// Server listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Port to listen on
    pub listen_port: u16,
}

/// Upstream database server address
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream host
    pub host: String,
    /// Upstream port
    #[serde(default = "default_upstream_port")]
    pub port: u16,
}

impl UpstreamConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials injected when authenticating against the upstream
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Username to use when connecting upstream
    pub username: String,
    /// Password to use when connecting upstream
    pub password: String,
}

/// Per-user settings for proxy authentication
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Password the user must present to the proxy
    pub password: String,
}

/// Statement firewall policy
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FirewallConfig {
    /// Tables a SELECT may read from
    #[serde(default)]
    pub allowed_tables: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}

fn default_upstream_port() -> u16 {
    5432
}

fn default_log_level() -> String {
    "info".to_string()
}
