//! Credential encryption helper

use axum::{extract::State, Json};

use crate::api::ApiState;
use crate::error::AppError;
use crate::models::EncryptPasswordRequest;

/// POST /api/crypto/encrypt - Encrypt a router password for its record
pub async fn encrypt_password(
    State(state): State<ApiState>,
    Json(req): Json<EncryptPasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let secret = state.routers.codec().encrypt(&req.password)?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "encrypted_password": secret.ciphertext,
        "encryption_iv": secret.iv,
        "encryption_tag": secret.tag,
    })))
}
