//! Data models for portdash

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{CredentialCodec, EncryptedSecret, EncryptionError};
use crate::router::address::{parse_address, DEFAULT_SSH_PORT};
use crate::router::{ClientConfig, ClientOptions, RouterError, TransportMode};

// ============================================================================
// Router records
// ============================================================================

/// Stored router configuration. The password is only kept encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRecord {
    pub id: String,
    pub name: String,
    /// Address as entered by the operator (`host`, `host:port`, URL…)
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub encrypted_password: Option<String>,
    #[serde(default, skip_serializing)]
    pub encryption_iv: Option<String>,
    #[serde(default, skip_serializing)]
    pub encryption_tag: Option<String>,
    /// Pin a transport instead of probing
    #[serde(default)]
    pub transport: Option<TransportMode>,
}

impl RouterRecord {
    /// Encryption fields are all present or all absent.
    pub fn check_encryption_fields(&self) -> Result<(), EncryptionError> {
        self.encrypted_secret().map(|_| ())
    }

    pub fn encrypted_secret(&self) -> Result<Option<EncryptedSecret>, EncryptionError> {
        match (
            &self.encrypted_password,
            &self.encryption_iv,
            &self.encryption_tag,
        ) {
            (Some(ciphertext), Some(iv), Some(tag)) => Ok(Some(EncryptedSecret {
                ciphertext: ciphertext.clone(),
                iv: iv.clone(),
                tag: tag.clone(),
            })),
            (None, None, None) => Ok(None),
            _ => Err(EncryptionError::Malformed {
                field: "encryption",
                reason: format!(
                    "router {} has a partial set of encryption fields",
                    self.id
                ),
            }),
        }
    }

    pub fn has_password(&self) -> bool {
        self.encrypted_password.is_some()
    }

    /// Decrypt the password and normalize the address.
    pub fn credential(&self, codec: &CredentialCodec) -> Result<DecryptedCredential, RouterError> {
        let password = match self.encrypted_secret()? {
            Some(secret) => codec.decrypt_secret(&secret)?,
            None => String::new(),
        };

        let address = parse_address(&self.host, self.port.unwrap_or(DEFAULT_SSH_PORT))?;
        // An explicit record port wins over one embedded in the address
        let port = self.port.unwrap_or(address.port);

        Ok(DecryptedCredential::new(
            &address.host,
            port,
            &self.username,
            &password,
        ))
    }

    pub fn client_config(
        &self,
        codec: &CredentialCodec,
        options: ClientOptions,
    ) -> Result<ClientConfig, RouterError> {
        Ok(ClientConfig {
            credential: self.credential(codec)?,
            transport_preference: self.transport,
            options,
        })
    }
}

/// Public view of a router record
#[derive(Debug, Clone, Serialize)]
pub struct RouterSummary {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub has_password: bool,
    pub transport: Option<TransportMode>,
}

impl From<&RouterRecord> for RouterSummary {
    fn from(record: &RouterRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            host: record.host.clone(),
            port: record.port,
            username: record.username.clone(),
            has_password: record.has_password(),
            transport: record.transport,
        }
    }
}

// ============================================================================
// Decrypted credentials
// ============================================================================

/// Cleartext login for one client session; the password is wiped on drop.
#[derive(Clone)]
pub struct DecryptedCredential {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: Zeroizing<String>,
}

impl DecryptedCredential {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: Zeroizing::new(password.to_string()),
        }
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// API request models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TestRouterRequest {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub transport: Option<TransportMode>,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct EncryptPasswordRequest {
    pub password: String,
}
