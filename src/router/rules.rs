//! Port-forwarding rule shapes, validation and UCI field mapping

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::error::RouterError;

/// UCI section type holding destination-NAT rules
pub const REDIRECT_TYPE: &str = "redirect";

/// Maximum length of a generated UCI section name
pub const UCI_NAME_MAX_LEN: usize = 32;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Tcpudp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Tcpudp => "tcpudp",
        }
    }

    /// LuCI writes the combined value as "tcp udp"
    pub fn from_uci(value: &str) -> Option<Self> {
        let normalized: String = value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("")
            .to_lowercase();
        match normalized.as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "tcpudp" | "udptcp" => Some(Protocol::Tcpudp),
            _ => None,
        }
    }
}

/// Canonical rule shape exchanged with callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardingRule {
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub external_port: u16,
    pub internal_ip: Ipv4Addr,
    pub internal_port: u16,
    pub enabled: bool,
    /// Section identifier on the router; `None` until created there
    pub native_id: Option<String>,
}

/// New rule submitted by the caller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInput {
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    pub external_port: i64,
    pub internal_ip: String,
    pub internal_port: i64,
}

/// Partial update; absent fields are left untouched on the router
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePatch {
    pub name: Option<String>,
    pub protocol: Option<Protocol>,
    pub external_port: Option<i64>,
    pub internal_ip: Option<String>,
    pub internal_port: Option<i64>,
    pub enabled: Option<bool>,
}

fn default_protocol() -> Protocol {
    Protocol::Tcp
}

/// Rule that passed validation, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRule {
    pub name: String,
    pub protocol: Protocol,
    pub external_port: u16,
    pub internal_ip: Ipv4Addr,
    pub internal_port: u16,
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate_port(field: &'static str, value: i64) -> Result<u16, RouterError> {
    if (1..=65535).contains(&value) {
        Ok(value as u16)
    } else {
        Err(RouterError::validation(
            field,
            format!("{} is outside 1-65535", value),
        ))
    }
}

pub fn validate_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr, RouterError> {
    value
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| RouterError::validation(field, format!("'{}' is not an IPv4 address", value)))
}

impl RuleInput {
    pub fn validate(&self) -> Result<ValidatedRule, RouterError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(RouterError::validation("name", "name is required"));
        }

        Ok(ValidatedRule {
            name: name.to_string(),
            protocol: self.protocol,
            external_port: validate_port("externalPort", self.external_port)?,
            internal_ip: validate_ipv4("internalIp", &self.internal_ip)?,
            internal_port: validate_port("internalPort", self.internal_port)?,
        })
    }
}

impl ValidatedRule {
    /// Option writes for a new redirect section, in write order
    pub fn uci_options(&self) -> Vec<(&'static str, String)> {
        vec![
            ("target", "DNAT".to_string()),
            ("src", "wan".to_string()),
            ("dest", "lan".to_string()),
            ("proto", self.protocol.as_str().to_string()),
            ("src_dport", self.external_port.to_string()),
            ("dest_ip", self.internal_ip.to_string()),
            ("dest_port", self.internal_port.to_string()),
            ("enabled", "1".to_string()),
        ]
    }
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.uci_field_count() == 0
    }

    fn uci_field_count(&self) -> usize {
        [
            self.protocol.is_some(),
            self.external_port.is_some(),
            self.internal_ip.is_some(),
            self.internal_port.is_some(),
            self.enabled.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Validate present fields and translate them to UCI option writes
    pub fn uci_options(&self) -> Result<Vec<(&'static str, String)>, RouterError> {
        let mut options = Vec::new();

        if let Some(protocol) = self.protocol {
            options.push(("proto", protocol.as_str().to_string()));
        }
        if let Some(port) = self.external_port {
            options.push(("src_dport", validate_port("externalPort", port)?.to_string()));
        }
        if let Some(ip) = &self.internal_ip {
            options.push(("dest_ip", validate_ipv4("internalIp", ip)?.to_string()));
        }
        if let Some(port) = self.internal_port {
            options.push(("dest_port", validate_port("internalPort", port)?.to_string()));
        }
        if let Some(enabled) = self.enabled {
            options.push(("enabled", enabled_value(enabled).to_string()));
        }

        Ok(options)
    }
}

pub fn enabled_value(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

// ============================================================================
// Naming
// ============================================================================

/// Lower-case, replace chars outside `[a-z0-9_]` with `_`, cap at 32 chars.
pub fn generate_uci_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(UCI_NAME_MAX_LEN)
        .collect()
}

/// Pick `base`, or `base_2`, `base_3`… when the name is already a section.
pub fn unique_uci_name<F>(base: &str, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !exists(base) {
        return base.to_string();
    }

    let mut n = 2u32;
    loop {
        let suffix = format!("_{}", n);
        let keep = UCI_NAME_MAX_LEN.saturating_sub(suffix.len()).min(base.len());
        let candidate = format!("{}{}", &base[..keep], suffix);
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Section identifiers are interpolated into `config.section.option` paths.
pub fn validate_section_id(native_id: &str) -> Result<(), RouterError> {
    let ok = !native_id.is_empty()
        && native_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(RouterError::validation(
            "nativeId",
            format!("'{}' is not a valid UCI section identifier", native_id),
        ))
    }
}

// ============================================================================
// UCI -> rule
// ============================================================================

/// Options read back for each redirect section
pub const REDIRECT_OPTIONS: [&str; 9] = [
    "name",
    "target",
    "src",
    "dest",
    "proto",
    "src_dport",
    "dest_ip",
    "dest_port",
    "enabled",
];

/// Build a rule from a redirect section's options.
///
/// Returns `None` for sections that are not plain single-port DNAT forwards
/// this client can represent (port ranges, missing destination, …).
pub fn rule_from_uci(section: &str, options: &HashMap<String, String>) -> Option<PortForwardingRule> {
    if let Some(target) = options.get("target") {
        if !target.eq_ignore_ascii_case("DNAT") {
            return None;
        }
    }

    let name = options
        .get("name")
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("Rule {}", section));

    let protocol = options
        .get("proto")
        .map(|p| Protocol::from_uci(p))
        .unwrap_or(Some(Protocol::Tcpudp))?;

    let external_port = options.get("src_dport")?.trim().parse::<u16>().ok()?;
    let internal_ip = options.get("dest_ip")?.trim().parse::<Ipv4Addr>().ok()?;
    // fw3/fw4 reuse the external port when dest_port is unset
    let internal_port = match options.get("dest_port") {
        Some(p) => p.trim().parse::<u16>().ok()?,
        None => external_port,
    };
    if external_port == 0 || internal_port == 0 {
        return None;
    }

    let enabled = options
        .get("enabled")
        .map(|v| v.trim() != "0")
        .unwrap_or(true);

    Some(PortForwardingRule {
        id: section.to_string(),
        name,
        protocol,
        external_port,
        internal_ip,
        internal_port,
        enabled,
        native_id: Some(section.to_string()),
    })
}
