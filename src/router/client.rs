//! Unified router client
//!
//! Probes the interactive transport first (it needs nothing installed on the
//! router), then Luci RPC. The first one that answers is pinned for the
//! lifetime of the client; every operation is a plain dispatch to it.
//!
//! State: `Unbound → ProbingInteractive → (Bound | ProbingRpc) → (Bound | Unreachable)`.
//! An unreachable client stays unreachable until `initialize()` is called again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::driver::{MutationOutcome, RouterDriver};
use super::error::RouterError;
use super::rules::{validate_section_id, PortForwardingRule, RuleInput, RulePatch};
use super::TransportMode;

enum ClientState {
    Unbound,
    Bound(Arc<dyn RouterDriver>),
    Unreachable { hint: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub mode: Option<TransportMode>,
    pub checked_at: DateTime<Utc>,
}

impl ConnectionTestResult {
    fn new(success: bool, message: String, mode: Option<TransportMode>) -> Self {
        Self {
            success,
            message,
            mode,
            checked_at: Utc::now(),
        }
    }
}

pub struct RouterClient {
    interactive: Arc<dyn RouterDriver>,
    rpc: Arc<dyn RouterDriver>,
    preference: Option<TransportMode>,
    state: RwLock<ClientState>,
}

impl RouterClient {
    pub fn with_drivers(
        interactive: Arc<dyn RouterDriver>,
        rpc: Arc<dyn RouterDriver>,
        preference: Option<TransportMode>,
    ) -> Self {
        Self {
            interactive,
            rpc,
            preference,
            state: RwLock::new(ClientState::Unbound),
        }
    }

    fn driver_for(&self, mode: TransportMode) -> Arc<dyn RouterDriver> {
        match mode {
            TransportMode::Interactive => self.interactive.clone(),
            TransportMode::Rpc => self.rpc.clone(),
        }
    }

    /// Pinned transport, if bound
    pub async fn mode(&self) -> Option<TransportMode> {
        match &*self.state.read().await {
            ClientState::Bound(driver) => Some(driver.mode()),
            _ => None,
        }
    }

    /// Bind a transport. A bound client keeps its mode and is not re-probed.
    pub async fn initialize(&self) -> Result<TransportMode, RouterError> {
        let (driver, _) = self.bind().await?;
        Ok(driver.mode())
    }

    /// Bound driver, plus the probe message when this call did the probing
    async fn bind(&self) -> Result<(Arc<dyn RouterDriver>, Option<String>), RouterError> {
        let mut state = self.state.write().await;
        if let ClientState::Bound(driver) = &*state {
            return Ok((driver.clone(), None));
        }

        if let Some(mode) = self.preference {
            let driver = self.driver_for(mode);
            return match driver.test_connection().await {
                Ok(message) => {
                    tracing::info!("[RouterClient] Bound to {} (preferred): {}", mode, message);
                    *state = ClientState::Bound(driver.clone());
                    Ok((driver, Some(message)))
                }
                Err(e) => {
                    tracing::warn!("[RouterClient] Preferred transport {} failed: {}", mode, e);
                    *state = ClientState::Unreachable {
                        hint: format!("{} transport: {}", mode, e),
                    };
                    Err(e)
                }
            };
        }

        tracing::debug!("[RouterClient] Probing interactive transport");
        let interactive_err = match self.interactive.test_connection().await {
            Ok(message) => {
                tracing::info!("[RouterClient] Bound to interactive: {}", message);
                *state = ClientState::Bound(self.interactive.clone());
                return Ok((self.interactive.clone(), Some(message)));
            }
            Err(e) => e,
        };

        tracing::debug!(
            "[RouterClient] Interactive probe failed ({}), probing RPC transport",
            interactive_err
        );
        let rpc_err = match self.rpc.test_connection().await {
            Ok(message) => {
                tracing::info!("[RouterClient] Bound to rpc: {}", message);
                *state = ClientState::Bound(self.rpc.clone());
                return Ok((self.rpc.clone(), Some(message)));
            }
            Err(e) => e,
        };

        let hint = format!(
            "SSH failed ({}); Luci RPC failed ({})",
            interactive_err, rpc_err
        );
        tracing::warn!("[RouterClient] Router unreachable: {}", hint);
        *state = ClientState::Unreachable { hint: hint.clone() };
        Err(RouterError::RouterUnreachable { hint })
    }

    async fn bound(&self) -> Result<Arc<dyn RouterDriver>, RouterError> {
        match &*self.state.read().await {
            ClientState::Bound(driver) => return Ok(driver.clone()),
            ClientState::Unreachable { hint } => {
                return Err(RouterError::RouterUnreachable { hint: hint.clone() })
            }
            ClientState::Unbound => {}
        }

        let (driver, _) = self.bind().await?;
        Ok(driver)
    }

    /// Always answers with a result; never switches the pinned mode.
    pub async fn test_connection(&self) -> ConnectionTestResult {
        let state_hint = match &*self.state.read().await {
            ClientState::Unreachable { hint } => Some(hint.clone()),
            _ => None,
        };
        if let Some(hint) = state_hint {
            return ConnectionTestResult::new(false, hint, None);
        }

        let (driver, probed) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => return ConnectionTestResult::new(false, e.to_string(), None),
        };

        let mode = Some(driver.mode());
        // A fresh bind already talked to the router
        if let Some(message) = probed {
            return ConnectionTestResult::new(true, message, mode);
        }
        match driver.test_connection().await {
            Ok(message) => ConnectionTestResult::new(true, message, mode),
            Err(e) => ConnectionTestResult::new(false, e.to_string(), mode),
        }
    }

    pub async fn list_rules(&self) -> Result<Vec<PortForwardingRule>, RouterError> {
        self.bound().await?.list_rules().await
    }

    pub async fn add_rule(&self, rule: &RuleInput) -> Result<MutationOutcome, RouterError> {
        // Invalid input must not even trigger a probe
        rule.validate()?;
        self.bound().await?.add_rule(rule).await
    }

    pub async fn update_rule(
        &self,
        native_id: &str,
        patch: &RulePatch,
    ) -> Result<MutationOutcome, RouterError> {
        validate_section_id(native_id)?;
        patch.uci_options()?;
        self.bound().await?.update_rule(native_id, patch).await
    }

    pub async fn delete_rule(&self, native_id: &str) -> Result<MutationOutcome, RouterError> {
        validate_section_id(native_id)?;
        self.bound().await?.delete_rule(native_id).await
    }

    pub async fn set_enabled(
        &self,
        native_id: &str,
        enabled: bool,
    ) -> Result<MutationOutcome, RouterError> {
        validate_section_id(native_id)?;
        self.bound().await?.set_enabled(native_id, enabled).await
    }
}
