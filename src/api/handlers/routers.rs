//! Router API handlers
//!
//! Connection testing and port-forwarding CRUD. Every request builds its own
//! client, binds a transport and drops the client (and its credential) when done.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::ApiState;
use crate::error::AppError;
use crate::models::{SetEnabledRequest, TestRouterRequest};
use crate::router::{RouterClient, RuleInput, RulePatch};

fn client_for(state: &ApiState, router_id: &str) -> Result<RouterClient, AppError> {
    state
        .routers
        .client(router_id)
        .ok_or_else(|| AppError::NotFound(format!("Router {} not found", router_id)))?
        .map_err(AppError::from)
}

/// GET /api/routers - List configured routers
pub async fn list_routers(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let routers = state.routers.list();
    Json(serde_json::json!({
        "ok": true,
        "total": routers.len(),
        "routers": routers,
    }))
}

/// POST /api/routers/test - Test a router that is not configured
pub async fn test_adhoc_router(
    State(state): State<ApiState>,
    Json(req): Json<TestRouterRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state
        .routers
        .test_connection(
            &req.host,
            req.port,
            &req.username,
            &req.password,
            req.transport,
        )
        .await?;

    Ok(Json(serde_json::json!(result)))
}

/// POST /api/routers/:id/test - Test a configured router
pub async fn test_router(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = client_for(&state, &id)?;
    Ok(Json(serde_json::json!(client.test_connection().await)))
}

/// GET /api/routers/:id/rules - Port forwards currently on the router
pub async fn list_rules(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = client_for(&state, &id)?;
    let rules = client.list_rules().await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "mode": client.mode().await,
        "total": rules.len(),
        "rules": rules,
    })))
}

/// POST /api/routers/:id/rules - Create a port forward
pub async fn add_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<RuleInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = client_for(&state, &id)?;
    let outcome = client.add_rule(&req).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "nativeId": outcome.native_id,
        "warning": outcome.warning,
    })))
}

/// PUT /api/routers/:id/rules/:native_id - Partial update
pub async fn update_rule(
    State(state): State<ApiState>,
    Path((id, native_id)): Path<(String, String)>,
    Json(req): Json<RulePatch>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = client_for(&state, &id)?;
    let outcome = client.update_rule(&native_id, &req).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "nativeId": outcome.native_id,
        "warning": outcome.warning,
    })))
}

/// DELETE /api/routers/:id/rules/:native_id
pub async fn delete_rule(
    State(state): State<ApiState>,
    Path((id, native_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = client_for(&state, &id)?;
    let outcome = client.delete_rule(&native_id).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "message": format!("Rule {} deleted", native_id),
        "warning": outcome.warning,
    })))
}

/// PUT /api/routers/:id/rules/:native_id/enabled
pub async fn set_rule_enabled(
    State(state): State<ApiState>,
    Path((id, native_id)): Path<(String, String)>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let client = client_for(&state, &id)?;
    let outcome = client.set_enabled(&native_id, req.enabled).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "nativeId": outcome.native_id,
        "enabled": req.enabled,
        "warning": outcome.warning,
    })))
}
