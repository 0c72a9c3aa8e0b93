//! Router client error taxonomy

use thiserror::Error;

use crate::crypto::EncryptionError;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Invalid router address: {0}")]
    InvalidAddress(String),

    #[error("Validation failed for field '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Remote command exited with status {exit_code}: {stderr}")]
    CommandExecution { exit_code: i32, stderr: String },

    #[error("RPC endpoint returned HTTP {http_status}")]
    RpcTransport { http_status: u16 },

    #[error("RPC call timed out")]
    RpcTimeout,

    #[error("RPC call failed: {0}")]
    RpcFault(String),

    #[error("Router unreachable: {hint}")]
    RouterUnreachable { hint: String },

    /// The section exists on the router but a later step failed.
    #[error("Rule {native_id} was created but is incomplete: {source}")]
    IncompleteRule {
        native_id: String,
        #[source]
        source: Box<RouterError>,
    },
}

impl RouterError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        RouterError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Caller mistakes are never worth resubmitting unchanged.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RouterError::Validation { .. }
                | RouterError::Encryption(_)
                | RouterError::InvalidAddress(_)
        )
    }
}

impl From<EncryptionError> for RouterError {
    fn from(e: EncryptionError) -> Self {
        RouterError::Encryption(e.to_string())
    }
}
