//! Luci JSON-RPC UCI transport
//!
//! Talks to `luci-mod-rpc`: `POST {base}{rpc_path}/{group}` with a
//! `{id, method, params}` envelope. A login on the `auth` group yields the
//! session token that authorizes every later call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::command::FIREWALL_CONFIG;
use super::driver::{UciBackend, UciDriver};
use super::error::RouterError;
use super::rules::REDIRECT_TYPE;
use super::TransportMode;
use crate::models::DecryptedCredential;

pub type RpcDriver = UciDriver<RpcTransport>;

/// Header carrying the session token (also sent as the `auth` query parameter)
pub const AUTH_HEADER: &str = "X-Luci-Auth";

const FIREWALL_RELOAD: &str = "/etc/init.d/firewall reload";

#[derive(Debug, Serialize)]
struct RpcEnvelope<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

pub struct RpcTransport {
    http: Client,
    base_url: String,
    rpc_path: String,
    credential: DecryptedCredential,
    token: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(
        base_url: &str,
        rpc_path: &str,
        credential: DecryptedCredential,
        timeout: Duration,
    ) -> Result<Self, RouterError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(true) // Routers ship self-signed certs
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::TransportUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rpc_path: format!("/{}", rpc_path.trim_matches('/')),
            credential,
            token: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    fn url(&self, group: &str) -> String {
        format!("{}{}/{}", self.base_url, self.rpc_path, group)
    }

    async fn post(
        &self,
        group: &str,
        method: &str,
        params: Value,
        token: Option<&str>,
    ) -> Result<RpcResponse, RouterError> {
        let envelope = RpcEnvelope {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut request = self.http.post(self.url(group)).json(&envelope);
        if let Some(token) = token {
            request = request
                .header(AUTH_HEADER, token)
                .query(&[("auth", token)]);
        }

        let resp = request.send().await.map_err(map_http_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RouterError::RpcTransport {
                http_status: status.as_u16(),
            });
        }

        resp.json::<RpcResponse>()
            .await
            .map_err(|e| RouterError::RpcFault(format!("Invalid RPC response: {}", e)))
    }

    /// Log in and cache the session token
    pub async fn authenticate(&self) -> Result<String, RouterError> {
        let params = json!([self.credential.username, self.credential.password()]);
        let response = match self.post("auth", "login", params, None).await {
            Ok(r) => r,
            Err(RouterError::RpcTransport { http_status }) => {
                return Err(RouterError::Authentication(format!(
                    "login endpoint returned HTTP {}",
                    http_status
                )))
            }
            Err(e) => return Err(e),
        };

        if !response.error.is_null() {
            return Err(RouterError::Authentication(error_text(&response.error)));
        }

        let token = response
            .result
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RouterError::Authentication("login rejected".to_string()))?
            .to_string();

        *self.token.write().await = Some(token.clone());
        tracing::info!(
            "[LuciRpc] Authenticated to {} as {}",
            self.base_url,
            self.credential.username
        );
        Ok(token)
    }

    async fn ensure_token(&self) -> Result<String, RouterError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.authenticate().await
    }

    pub async fn call_rpc(
        &self,
        group: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, RouterError> {
        let token = self.ensure_token().await?;
        tracing::debug!("[LuciRpc] {}.{}", group, method);

        let response = self.post(group, method, params, Some(&token)).await?;
        if !response.error.is_null() {
            return Err(RouterError::RpcFault(format!(
                "{}.{}: {}",
                group,
                method,
                error_text(&response.error)
            )));
        }
        Ok(response.result)
    }

    /// UCI call whose result is a success flag
    async fn uci_checked(&self, method: &str, params: Value) -> Result<(), RouterError> {
        match self.call_rpc("uci", method, params).await? {
            Value::Bool(false) => Err(RouterError::RpcFault(format!(
                "uci.{} reported failure",
                method
            ))),
            _ => Ok(()),
        }
    }

    /// Sections of the firewall config, in file order
    async fn firewall_sections(&self) -> Result<Vec<(String, serde_json::Map<String, Value>)>, RouterError> {
        let all = self
            .call_rpc("uci", "get_all", json!([FIREWALL_CONFIG]))
            .await?;

        let mut sections: Vec<_> = match all {
            Value::Object(map) => map
                .into_iter()
                .filter_map(|(name, body)| match body {
                    Value::Object(options) => Some((name, options)),
                    _ => None,
                })
                .collect(),
            Value::Null | Value::Bool(false) => Vec::new(),
            other => {
                return Err(RouterError::RpcFault(format!(
                    "uci.get_all returned unexpected {}",
                    other
                )))
            }
        };

        sections.sort_by_key(|(_, options)| {
            options
                .get(".index")
                .and_then(Value::as_u64)
                .unwrap_or(u64::MAX)
        });
        Ok(sections)
    }
}

impl RpcDriver {
    pub fn rpc(transport: RpcTransport) -> Self {
        UciDriver::new(transport)
    }
}

#[async_trait]
impl UciBackend for RpcTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Rpc
    }

    async fn probe(&self) -> Result<String, RouterError> {
        self.authenticate().await?;
        Ok(format!("Connected via Luci RPC ({})", self.base_url))
    }

    async fn section_names(&self) -> Result<Vec<String>, RouterError> {
        Ok(self
            .firewall_sections()
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn section_type(&self, section: &str) -> Result<Option<String>, RouterError> {
        // uci.get on a bare section answers with its type
        let result = self
            .call_rpc("uci", "get", json!([FIREWALL_CONFIG, section]))
            .await?;
        Ok(result.as_str().filter(|t| !t.is_empty()).map(String::from))
    }

    async fn redirect_sections(
        &self,
    ) -> Result<Vec<(String, HashMap<String, String>)>, RouterError> {
        let sections = self
            .firewall_sections()
            .await?
            .into_iter()
            .filter(|(_, options)| {
                options.get(".type").and_then(Value::as_str) == Some(REDIRECT_TYPE)
            })
            .map(|(name, options)| {
                let options = options
                    .into_iter()
                    .filter(|(key, _)| !key.starts_with('.'))
                    .filter_map(|(key, value)| option_text(&value).map(|v| (key, v)))
                    .collect();
                (name, options)
            })
            .collect::<Vec<_>>();

        tracing::debug!("[LuciRpc] Read {} redirect sections", sections.len());
        Ok(sections)
    }

    async fn add_section(&self, section_type: &str) -> Result<String, RouterError> {
        let result = self
            .call_rpc("uci", "add", json!([FIREWALL_CONFIG, section_type]))
            .await?;
        result
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| RouterError::RpcFault("uci.add returned no section id".to_string()))
    }

    async fn rename_section(&self, section: &str, name: &str) -> Result<(), RouterError> {
        self.uci_checked("rename", json!([FIREWALL_CONFIG, section, name]))
            .await
    }

    async fn set_option(&self, section: &str, option: &str, value: &str) -> Result<(), RouterError> {
        self.uci_checked("set", json!([FIREWALL_CONFIG, section, option, value]))
            .await
    }

    async fn delete_section(&self, section: &str) -> Result<(), RouterError> {
        self.uci_checked("delete", json!([FIREWALL_CONFIG, section]))
            .await
    }

    async fn commit(&self) -> Result<(), RouterError> {
        self.uci_checked("commit", json!([FIREWALL_CONFIG])).await
    }

    async fn reload_firewall(&self) -> Result<(), RouterError> {
        self.call_rpc("sys", "exec", json!([FIREWALL_RELOAD]))
            .await
            .map(|_| ())
    }
}

fn map_http_error(e: reqwest::Error) -> RouterError {
    if e.is_timeout() {
        RouterError::RpcTimeout
    } else if e.is_connect() {
        RouterError::TransportUnavailable(format!("RPC connect failed: {}", e))
    } else {
        RouterError::TransportUnavailable(format!("RPC request failed: {}", e))
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// UCI list options come back as arrays; join them like `uci get` does.
fn option_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(option_text)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
}
