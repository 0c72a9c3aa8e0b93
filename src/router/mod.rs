//! OpenWrt router integration
//!
//! - `address`: router address normalization
//! - `command`: structured remote commands (uci argv)
//! - `rules`: rule shapes, validation, UCI field mapping
//! - `session`: sshpass-based interactive session executor
//! - `ssh`: UCI over interactive SSH sessions
//! - `rpc`: UCI over Luci JSON-RPC
//! - `driver`: transport-independent CRUD driver
//! - `client`: transport probing, mode pinning and dispatch
//! - `manager`: configured routers and client construction

pub mod address;
pub mod client;
pub mod command;
pub mod driver;
pub mod error;
pub mod manager;
pub mod rpc;
pub mod rules;
pub mod session;
pub mod ssh;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use client::{ConnectionTestResult, RouterClient};
pub use driver::{MutationOutcome, RouterDriver};
pub use error::RouterError;
pub use manager::RouterManager;
pub use rules::{PortForwardingRule, Protocol, RuleInput, RulePatch};

use crate::config::RouterClientConfig;
use crate::models::DecryptedCredential;
use address::RouterAddress;
use rpc::{RpcDriver, RpcTransport};
use session::SshpassExecutor;
use ssh::InteractiveDriver;

/// Transport a client is bound to; pinned for the client's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Interactive,
    Rpc,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Interactive => "interactive",
            TransportMode::Rpc => "rpc",
        }
    }

    /// Log prefix for the transport
    pub fn label(&self) -> &'static str {
        match self {
            TransportMode::Interactive => "SshUci",
            TransportMode::Rpc => "LuciRpc",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport tuning for one client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub ssh_connect_timeout: Duration,
    pub ssh_command_timeout: Duration,
    pub rpc_timeout: Duration,
    pub rpc_path: String,
    pub rpc_scheme: String,
    pub rpc_port: Option<u16>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        (&RouterClientConfig::default()).into()
    }
}

impl From<&RouterClientConfig> for ClientOptions {
    fn from(config: &RouterClientConfig) -> Self {
        Self {
            ssh_connect_timeout: Duration::from_secs(config.ssh_connect_timeout_secs),
            ssh_command_timeout: Duration::from_secs(config.ssh_command_timeout_secs),
            rpc_timeout: Duration::from_secs(config.rpc_timeout_secs),
            rpc_path: config.rpc_path.clone(),
            rpc_scheme: config.rpc_scheme.clone(),
            rpc_port: config.rpc_port,
        }
    }
}

impl ClientOptions {
    /// `{scheme}://{host}[:port]` of the Luci endpoint
    pub fn rpc_base_url(&self, credential: &DecryptedCredential) -> String {
        let address = RouterAddress {
            host: credential.host.clone(),
            port: credential.port,
        };
        match self.rpc_port {
            Some(port) => format!("{}://{}:{}", self.rpc_scheme, address.authority(), port),
            None => format!("{}://{}", self.rpc_scheme, address.authority()),
        }
    }
}

/// Everything needed to build a client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: DecryptedCredential,
    pub transport_preference: Option<TransportMode>,
    pub options: ClientOptions,
}

/// Build an unbound client with both transports available
pub fn create_client(config: ClientConfig) -> Result<RouterClient, RouterError> {
    let ClientConfig {
        credential,
        transport_preference,
        options,
    } = config;

    let executor = SshpassExecutor::new(
        credential.clone(),
        options.ssh_connect_timeout,
        options.ssh_command_timeout,
    );
    let interactive = InteractiveDriver::interactive(Arc::new(executor));

    let transport = RpcTransport::new(
        &options.rpc_base_url(&credential),
        &options.rpc_path,
        credential,
        options.rpc_timeout,
    )?;
    let rpc = RpcDriver::rpc(transport);

    Ok(RouterClient::with_drivers(
        Arc::new(interactive),
        Arc::new(rpc),
        transport_preference,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mode_serde() {
        assert_eq!(serde_json::to_value(TransportMode::Rpc).unwrap(), "rpc");
        let mode: TransportMode = serde_json::from_str("\"interactive\"").unwrap();
        assert_eq!(mode, TransportMode::Interactive);
    }

    #[test]
    fn test_rpc_base_url() {
        let cred = DecryptedCredential::new("fd00::1", 22, "root", "");
        let mut options = ClientOptions::default();
        assert_eq!(options.rpc_base_url(&cred), "http://[fd00::1]");

        options.rpc_scheme = "https".to_string();
        options.rpc_port = Some(8443);
        let cred = DecryptedCredential::new("192.168.1.1", 22, "root", "");
        assert_eq!(options.rpc_base_url(&cred), "https://192.168.1.1:8443");
    }

    #[tokio::test]
    async fn test_create_client_starts_unbound() {
        let client = create_client(ClientConfig {
            credential: DecryptedCredential::new("192.168.1.1", 22, "root", "pw"),
            transport_preference: None,
            options: ClientOptions::default(),
        })
        .unwrap();
        assert_eq!(client.mode().await, None);
    }
}
