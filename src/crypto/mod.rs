//! Credential codec: AES-256-GCM encryption of router passwords at rest
//!
//! - 256-bit key from `crypto.secret_key`, or a machine-derived fallback
//! - 128-bit random IV per call, 128-bit authentication tag
//! - ciphertext / iv / tag are stored as separate base64 strings

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::CryptoConfig;

/// AES-256-GCM with a 16-byte nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

const MACHINE_KEY_LABEL: &str = "portdash-credential-key";

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Cannot encrypt an empty value")]
    EmptyPlaintext,

    #[error("Malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Decryption failed (wrong key or tampered data)")]
    TagMismatch,

    #[error("Invalid secret key: {0}")]
    InvalidKey(String),
}

/// Where the key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Configured,
    MachineDerived,
}

/// Encrypted value as persisted next to a router record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

#[derive(Clone)]
pub struct CredentialCodec {
    key: Zeroizing<[u8; KEY_LEN]>,
    source: KeySource,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CredentialCodec {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
            source: KeySource::Configured,
        }
    }

    /// Build the codec from configuration, falling back to a machine-derived key.
    pub fn from_config(config: &CryptoConfig) -> Result<Self, EncryptionError> {
        match config.secret_key.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => Ok(Self::new(parse_secret_key(secret)?)),
            _ => {
                tracing::warn!(
                    "[Crypto] No crypto.secret_key configured; using a key derived from this \
                     machine's hostname and user. Encrypted passwords will not decrypt on \
                     another machine. Do not use this in production."
                );
                Ok(Self::machine_derived())
            }
        }
    }

    pub fn machine_derived() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown-host".to_string());
        let username = whoami::username();

        Self {
            key: Zeroizing::new(derive_key(&hostname, &username)),
            source: KeySource::MachineDerived,
        }
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, EncryptionError> {
        if plaintext.is_empty() {
            return Err(EncryptionError::EmptyPlaintext);
        }

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut sealed = self
            .cipher()
            .encrypt(GenericArray::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| EncryptionError::TagMismatch)?;

        // aes-gcm appends the tag to the ciphertext
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(EncryptedSecret {
            ciphertext: b64.encode(&sealed),
            iv: b64.encode(iv),
            tag: b64.encode(tag),
        })
    }

    pub fn decrypt(&self, ciphertext: &str, iv: &str, tag: &str) -> Result<String, EncryptionError> {
        let mut sealed = decode_field("ciphertext", ciphertext)?;
        let iv = decode_field("iv", iv)?;
        let tag = decode_field("tag", tag)?;

        if sealed.is_empty() {
            return Err(EncryptionError::Malformed {
                field: "ciphertext",
                reason: "empty".to_string(),
            });
        }
        if iv.len() != IV_LEN {
            return Err(EncryptionError::Malformed {
                field: "iv",
                reason: format!("expected {} bytes, got {}", IV_LEN, iv.len()),
            });
        }
        if tag.len() != TAG_LEN {
            return Err(EncryptionError::Malformed {
                field: "tag",
                reason: format!("expected {} bytes, got {}", TAG_LEN, tag.len()),
            });
        }

        sealed.extend_from_slice(&tag);
        let plain = Zeroizing::new(
            self.cipher()
                .decrypt(GenericArray::from_slice(&iv), sealed.as_slice())
                .map_err(|_| EncryptionError::TagMismatch)?,
        );

        String::from_utf8(plain.to_vec()).map_err(|_| EncryptionError::TagMismatch)
    }

    pub fn decrypt_secret(&self, secret: &EncryptedSecret) -> Result<String, EncryptionError> {
        self.decrypt(&secret.ciphertext, &secret.iv, &secret.tag)
    }

    fn cipher(&self) -> Aes256Gcm16 {
        Aes256Gcm16::new(GenericArray::from_slice(self.key.as_slice()))
    }
}

/// Accepts either 32 raw bytes or base64 that decodes to 32 bytes.
fn parse_secret_key(secret: &str) -> Result<[u8; KEY_LEN], EncryptionError> {
    if secret.len() == KEY_LEN {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(secret.as_bytes());
        return Ok(key);
    }

    let decoded = Zeroizing::new(
        base64::engine::general_purpose::STANDARD
            .decode(secret)
            .map_err(|_| {
                EncryptionError::InvalidKey(format!(
                    "expected {} raw bytes or base64 of {} bytes",
                    KEY_LEN, KEY_LEN
                ))
            })?,
    );

    if decoded.len() != KEY_LEN {
        return Err(EncryptionError::InvalidKey(format!(
            "decoded key is {} bytes, expected {}",
            decoded.len(),
            KEY_LEN
        )));
    }

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&decoded);
    Ok(key)
}

fn derive_key(hostname: &str, username: &str) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(MACHINE_KEY_LABEL.as_bytes());
    hasher.update(b":");
    hasher.update(hostname.as_bytes());
    hasher.update(b":");
    hasher.update(username.as_bytes());
    hasher.finalize().into()
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, EncryptionError> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| EncryptionError::Malformed {
            field,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new([7u8; KEY_LEN])
    }

    fn flip_first_byte(b64: &str) -> String {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut bytes = engine.decode(b64).unwrap();
        bytes[0] ^= 0x01;
        engine.encode(bytes)
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        for password in ["admin", "p@ss w0rd!", "パスワード", "x"] {
            let secret = codec.encrypt(password).unwrap();
            assert_eq!(codec.decrypt_secret(&secret).unwrap(), password);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let codec = codec();
        let a = codec.encrypt("same").unwrap();
        let b = codec.encrypt("same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        assert!(matches!(
            codec().encrypt(""),
            Err(EncryptionError::EmptyPlaintext)
        ));
    }

    #[test]
    fn test_tampering_detected() {
        let codec = codec();
        let secret = codec.encrypt("router-password").unwrap();

        let bad_ct = flip_first_byte(&secret.ciphertext);
        assert!(codec.decrypt(&bad_ct, &secret.iv, &secret.tag).is_err());

        let bad_iv = flip_first_byte(&secret.iv);
        assert!(codec.decrypt(&secret.ciphertext, &bad_iv, &secret.tag).is_err());

        let bad_tag = flip_first_byte(&secret.tag);
        assert!(matches!(
            codec.decrypt(&secret.ciphertext, &secret.iv, &bad_tag),
            Err(EncryptionError::TagMismatch)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let secret = codec().encrypt("router-password").unwrap();
        let other = CredentialCodec::new([8u8; KEY_LEN]);
        assert!(matches!(
            other.decrypt_secret(&secret),
            Err(EncryptionError::TagMismatch)
        ));
    }

    #[test]
    fn test_malformed_fields() {
        let codec = codec();
        let secret = codec.encrypt("pw").unwrap();
        assert!(matches!(
            codec.decrypt("%%%", &secret.iv, &secret.tag),
            Err(EncryptionError::Malformed { field: "ciphertext", .. })
        ));
        assert!(matches!(
            codec.decrypt(&secret.ciphertext, "AAAA", &secret.tag),
            Err(EncryptionError::Malformed { field: "iv", .. })
        ));
        assert!(matches!(
            codec.decrypt(&secret.ciphertext, &secret.iv, "AAAA"),
            Err(EncryptionError::Malformed { field: "tag", .. })
        ));
    }

    #[test]
    fn test_secret_key_formats() {
        let raw = "0123456789abcdef0123456789abcdef";
        assert_eq!(parse_secret_key(raw).unwrap(), *b"0123456789abcdef0123456789abcdef");

        let b64 = base64::engine::general_purpose::STANDARD.encode([3u8; KEY_LEN]);
        assert_eq!(parse_secret_key(&b64).unwrap(), [3u8; KEY_LEN]);

        assert!(parse_secret_key("too-short").is_err());
    }

    #[test]
    fn test_config_fallback_is_machine_derived() {
        let codec = CredentialCodec::from_config(&CryptoConfig { secret_key: None }).unwrap();
        assert_eq!(codec.source(), KeySource::MachineDerived);

        let secret = codec.encrypt("pw").unwrap();
        let again = CredentialCodec::machine_derived();
        assert_eq!(again.decrypt_secret(&secret).unwrap(), "pw");
    }

    #[test]
    fn test_derived_key_depends_on_machine() {
        assert_ne!(derive_key("host-a", "root"), derive_key("host-b", "root"));
        assert_eq!(derive_key("host-a", "root"), derive_key("host-a", "root"));
    }
}
