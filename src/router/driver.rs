//! Transport-independent port-forwarding driver
//!
//! `UciBackend` is the handful of UCI primitives a transport must provide.
//! `UciDriver` turns them into the rule CRUD contract, so both transports
//! issue the same add → rename → set × 8 → commit → reload sequence.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use super::error::RouterError;
use super::rules::{
    generate_uci_name, rule_from_uci, unique_uci_name, validate_section_id, PortForwardingRule,
    RuleInput, RulePatch, REDIRECT_TYPE,
};
use super::TransportMode;

/// Result of a mutation. `warning` carries a failed firewall reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub native_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Capability set every bound transport exposes
#[async_trait]
pub trait RouterDriver: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Reachability and credential check. Never mutates router state.
    async fn test_connection(&self) -> Result<String, RouterError>;

    async fn list_rules(&self) -> Result<Vec<PortForwardingRule>, RouterError>;

    async fn add_rule(&self, rule: &RuleInput) -> Result<MutationOutcome, RouterError>;

    async fn update_rule(
        &self,
        native_id: &str,
        patch: &RulePatch,
    ) -> Result<MutationOutcome, RouterError>;

    async fn delete_rule(&self, native_id: &str) -> Result<MutationOutcome, RouterError>;

    async fn set_enabled(
        &self,
        native_id: &str,
        enabled: bool,
    ) -> Result<MutationOutcome, RouterError> {
        let patch = RulePatch {
            enabled: Some(enabled),
            ..Default::default()
        };
        self.update_rule(native_id, &patch).await
    }
}

/// UCI primitives on the `firewall` config
#[async_trait]
pub trait UciBackend: Send + Sync {
    fn mode(&self) -> TransportMode;

    async fn probe(&self) -> Result<String, RouterError>;

    /// Every section name in the firewall config, any type
    async fn section_names(&self) -> Result<Vec<String>, RouterError>;

    /// Type of one firewall section, `None` if it does not exist
    async fn section_type(&self, section: &str) -> Result<Option<String>, RouterError>;

    /// Redirect sections with their options, as currently on the router
    async fn redirect_sections(&self)
        -> Result<Vec<(String, HashMap<String, String>)>, RouterError>;

    /// Returns the new anonymous section id
    async fn add_section(&self, section_type: &str) -> Result<String, RouterError>;

    async fn rename_section(&self, section: &str, name: &str) -> Result<(), RouterError>;

    async fn set_option(&self, section: &str, option: &str, value: &str)
        -> Result<(), RouterError>;

    async fn delete_section(&self, section: &str) -> Result<(), RouterError>;

    async fn commit(&self) -> Result<(), RouterError>;

    async fn reload_firewall(&self) -> Result<(), RouterError>;
}

pub struct UciDriver<B> {
    backend: B,
}

impl<B: UciBackend> UciDriver<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// UCI state is already committed, so a failed reload is only reported.
    async fn reload(&self) -> Option<String> {
        match self.backend.reload_firewall().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "[{}] Firewall reload failed after commit (changes are saved): {}",
                    self.backend.mode().label(),
                    e
                );
                Some(format!("Firewall reload failed: {}", e))
            }
        }
    }

    /// Only redirect sections are port forwards; zones and rules are off limits.
    async fn ensure_redirect(&self, native_id: &str) -> Result<(), RouterError> {
        match self.backend.section_type(native_id).await? {
            Some(kind) if kind == REDIRECT_TYPE => Ok(()),
            Some(kind) => Err(RouterError::validation(
                "nativeId",
                format!("'{}' is a {} section, not a port forward", native_id, kind),
            )),
            None => Err(RouterError::validation(
                "nativeId",
                format!("no firewall section named '{}'", native_id),
            )),
        }
    }

    async fn apply(
        &self,
        native_id: &str,
        options: &[(&'static str, String)],
    ) -> Result<(), RouterError> {
        for (option, value) in options {
            self.backend.set_option(native_id, option, value).await?;
        }
        self.backend.commit().await
    }
}

fn incomplete(native_id: &str) -> impl FnOnce(RouterError) -> RouterError + '_ {
    move |source| RouterError::IncompleteRule {
        native_id: native_id.to_string(),
        source: Box::new(source),
    }
}

#[async_trait]
impl<B: UciBackend> RouterDriver for UciDriver<B> {
    fn mode(&self) -> TransportMode {
        self.backend.mode()
    }

    async fn test_connection(&self) -> Result<String, RouterError> {
        self.backend.probe().await
    }

    async fn list_rules(&self) -> Result<Vec<PortForwardingRule>, RouterError> {
        let sections = self.backend.redirect_sections().await?;
        let mut rules = Vec::with_capacity(sections.len());

        for (section, options) in &sections {
            match rule_from_uci(section, options) {
                Some(rule) => rules.push(rule),
                None => tracing::warn!(
                    "[{}] Skipping redirect {}: not a single-port DNAT forward",
                    self.backend.mode().label(),
                    section
                ),
            }
        }

        Ok(rules)
    }

    async fn add_rule(&self, input: &RuleInput) -> Result<MutationOutcome, RouterError> {
        let rule = input.validate()?;

        // Re-read names right before creating: other writers may have added sections
        let existing = self.backend.section_names().await?;
        let name = unique_uci_name(&generate_uci_name(&rule.name), |n| {
            existing.iter().any(|e| e == n)
        });

        let anonymous = self.backend.add_section(REDIRECT_TYPE).await?;
        validate_section_id(&anonymous).map_err(incomplete(&anonymous))?;

        // Rename before anything else so later writes never use a positional id
        self.backend
            .rename_section(&anonymous, &name)
            .await
            .map_err(incomplete(&anonymous))?;

        self.apply(&name, &rule.uci_options())
            .await
            .map_err(incomplete(&name))?;

        let warning = self.reload().await;
        tracing::info!(
            "[{}] Added port forward {} ({} {} -> {}:{})",
            self.backend.mode().label(),
            name,
            rule.protocol.as_str(),
            rule.external_port,
            rule.internal_ip,
            rule.internal_port
        );

        Ok(MutationOutcome {
            native_id: name,
            warning,
        })
    }

    async fn update_rule(
        &self,
        native_id: &str,
        patch: &RulePatch,
    ) -> Result<MutationOutcome, RouterError> {
        validate_section_id(native_id)?;
        let options = patch.uci_options()?;

        if options.is_empty() {
            return Ok(MutationOutcome {
                native_id: native_id.to_string(),
                warning: None,
            });
        }

        self.ensure_redirect(native_id).await?;
        self.apply(native_id, &options).await?;
        let warning = self.reload().await;
        tracing::info!(
            "[{}] Updated port forward {} ({} fields)",
            self.backend.mode().label(),
            native_id,
            options.len()
        );

        Ok(MutationOutcome {
            native_id: native_id.to_string(),
            warning,
        })
    }

    async fn delete_rule(&self, native_id: &str) -> Result<MutationOutcome, RouterError> {
        validate_section_id(native_id)?;
        self.ensure_redirect(native_id).await?;

        self.backend.delete_section(native_id).await?;
        self.backend.commit().await?;
        let warning = self.reload().await;
        tracing::info!(
            "[{}] Deleted port forward {}",
            self.backend.mode().label(),
            native_id
        );

        Ok(MutationOutcome {
            native_id: native_id.to_string(),
            warning,
        })
    }
}
