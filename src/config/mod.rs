//! Configuration module

use serde::Deserialize;

use crate::models::RouterRecord;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub router: RouterClientConfig,
    #[serde(default)]
    pub routers: Vec<RouterRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CryptoConfig {
    /// 32 raw bytes or base64 of 32 bytes. Unset means machine-derived key.
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// Transport tuning shared by every router client
#[derive(Debug, Clone, Deserialize)]
pub struct RouterClientConfig {
    #[serde(default = "default_ssh_connect_timeout")]
    pub ssh_connect_timeout_secs: u64,
    /// Deadline for a whole SSH session: connect, auth and the command
    #[serde(default = "default_ssh_command_timeout")]
    pub ssh_command_timeout_secs: u64,
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,
    #[serde(default = "default_rpc_scheme")]
    pub rpc_scheme: String,
    /// Luci port when it is not the scheme default
    #[serde(default)]
    pub rpc_port: Option<u16>,
}

impl Default for RouterClientConfig {
    fn default() -> Self {
        Self {
            ssh_connect_timeout_secs: default_ssh_connect_timeout(),
            ssh_command_timeout_secs: default_ssh_command_timeout(),
            rpc_timeout_secs: default_rpc_timeout(),
            rpc_path: default_rpc_path(),
            rpc_scheme: default_rpc_scheme(),
            rpc_port: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_ssh_connect_timeout() -> u64 {
    5
}

fn default_ssh_command_timeout() -> u64 {
    20
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_rpc_path() -> String {
    "/cgi-bin/luci/rpc".to_string()
}

fn default_rpc_scheme() -> String {
    "http".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("PORTDASH").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;

        for record in &config.routers {
            record.check_encryption_fields()?;
        }

        Ok(config)
    }
}
