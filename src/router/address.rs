//! Router address parsing
//!
//! Accepts `host`, `host:port`, `scheme://host[:port][/path]` and bracketed
//! IPv6 literals. Only an explicit port overrides the transport default.

use serde::Serialize;
use url::Url;

use super::error::RouterError;

/// Standard remote-shell port, the default for the interactive transport
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterAddress {
    pub host: String,
    pub port: u16,
}

impl RouterAddress {
    /// Host formatted for use inside a URL (IPv6 gets brackets back)
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

pub fn parse_address(input: &str, default_port: u16) -> Result<RouterAddress, RouterError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RouterError::InvalidAddress("address is empty".to_string()));
    }

    // A placeholder non-special scheme keeps `url` from inventing default ports
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("router://{}", trimmed)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| RouterError::InvalidAddress(format!("{}: {}", trimmed, e)))?;

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RouterError::InvalidAddress(format!("{}: no host", trimmed)))?;

    if host.starts_with('-') {
        return Err(RouterError::InvalidAddress(format!(
            "{}: host may not start with '-'",
            trimmed
        )));
    }

    Ok(RouterAddress {
        host,
        port: url.port().unwrap_or(default_port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_uses_default_port() {
        let addr = parse_address("192.168.1.1", DEFAULT_SSH_PORT).unwrap();
        assert_eq!(addr.host, "192.168.1.1");
        assert_eq!(addr.port, 22);
    }

    #[test]
    fn test_scheme_port_and_path() {
        let addr = parse_address("http://r.local:8080/x", DEFAULT_SSH_PORT).unwrap();
        assert_eq!(
            addr,
            RouterAddress {
                host: "r.local".to_string(),
                port: 8080
            }
        );
    }

    #[test]
    fn test_host_with_port() {
        let addr = parse_address("openwrt.lan:2222", DEFAULT_SSH_PORT).unwrap();
        assert_eq!(addr.host, "openwrt.lan");
        assert_eq!(addr.port, 2222);
    }

    #[test]
    fn test_scheme_default_port_not_applied() {
        let addr = parse_address("https://10.0.0.1", DEFAULT_SSH_PORT).unwrap();
        assert_eq!(addr.port, 22);
    }

    #[test]
    fn test_ipv6() {
        let addr = parse_address("[fd00::1]:2200", DEFAULT_SSH_PORT).unwrap();
        assert_eq!(addr.host, "fd00::1");
        assert_eq!(addr.port, 2200);
        assert_eq!(addr.authority(), "[fd00::1]");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(matches!(
            parse_address("", DEFAULT_SSH_PORT),
            Err(RouterError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_address("   ", DEFAULT_SSH_PORT),
            Err(RouterError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_address("http://", DEFAULT_SSH_PORT),
            Err(RouterError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_address("host:99999", DEFAULT_SSH_PORT),
            Err(RouterError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_option_like_host_rejected() {
        assert!(matches!(
            parse_address("-oProxyCommand=x", DEFAULT_SSH_PORT),
            Err(RouterError::InvalidAddress(_))
        ));
    }
}
