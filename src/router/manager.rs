//! RouterManager: configured routers and per-request client construction
//!
//! Router records come from configuration. Clients are never cached: each
//! caller gets a fresh, unbound client whose credential dies with it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::CredentialCodec;
use crate::models::{DecryptedCredential, RouterRecord, RouterSummary};
use crate::router::address::{parse_address, DEFAULT_SSH_PORT};
use crate::router::{
    create_client, ClientConfig, ClientOptions, ConnectionTestResult, RouterClient, RouterError,
    TransportMode,
};

pub struct RouterManager {
    routers: HashMap<String, RouterRecord>,
    codec: Arc<CredentialCodec>,
    options: ClientOptions,
}

impl RouterManager {
    pub fn new(records: Vec<RouterRecord>, codec: Arc<CredentialCodec>, options: ClientOptions) -> Self {
        let routers: HashMap<_, _> = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        tracing::info!("[RouterManager] Loaded {} routers", routers.len());

        Self {
            routers,
            codec,
            options,
        }
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    pub fn list(&self) -> Vec<RouterSummary> {
        let mut list: Vec<_> = self.routers.values().map(RouterSummary::from).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Fresh unbound client for a configured router, `None` if unknown
    pub fn client(&self, router_id: &str) -> Option<Result<RouterClient, RouterError>> {
        let record = self.routers.get(router_id)?;
        Some(
            record
                .client_config(&self.codec, self.options.clone())
                .and_then(create_client),
        )
    }

    /// Test an ad-hoc router without registering it
    pub async fn test_connection(
        &self,
        host: &str,
        port: Option<u16>,
        username: &str,
        password: &str,
        transport: Option<TransportMode>,
    ) -> Result<ConnectionTestResult, RouterError> {
        let address = parse_address(host, port.unwrap_or(DEFAULT_SSH_PORT))?;
        let client = create_client(ClientConfig {
            credential: DecryptedCredential::new(
                &address.host,
                port.unwrap_or(address.port),
                username,
                password,
            ),
            transport_preference: transport,
            options: self.options.clone(),
        })?;

        Ok(client.test_connection().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn record(id: &str, host: &str) -> RouterRecord {
        RouterRecord {
            id: id.to_string(),
            name: id.to_uppercase(),
            host: host.to_string(),
            port: None,
            username: "root".to_string(),
            encrypted_password: None,
            encryption_iv: None,
            encryption_tag: None,
            transport: None,
        }
    }

    fn manager(records: Vec<RouterRecord>) -> RouterManager {
        RouterManager::new(
            records,
            Arc::new(CredentialCodec::new([9u8; KEY_LEN])),
            ClientOptions::default(),
        )
    }

    #[test]
    fn test_list_is_sorted() {
        let m = manager(vec![record("b", "10.0.0.2"), record("a", "10.0.0.1")]);
        let ids: Vec<_> = m.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_client_lookup() {
        let m = manager(vec![record("home", "192.168.1.1"), record("bad", "")]);
        assert!(m.client("missing").is_none());

        let client = m.client("home").unwrap().unwrap();
        assert_eq!(client.mode().await, None);

        assert!(matches!(
            m.client("bad").unwrap(),
            Err(RouterError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_adhoc_invalid_address() {
        let m = manager(Vec::new());
        assert!(matches!(
            m.test_connection("", None, "root", "pw", None).await,
            Err(RouterError::InvalidAddress(_))
        ));
    }
}
