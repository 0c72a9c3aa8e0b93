//! API module - HTTP handlers and routes

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::router::RouterManager;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub routers: Arc<RouterManager>,
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Routers
        .route("/api/routers", get(handlers::list_routers))
        .route("/api/routers/test", post(handlers::test_adhoc_router))
        .route("/api/routers/:id/test", post(handlers::test_router))
        // Port forwarding rules
        .route(
            "/api/routers/:id/rules",
            get(handlers::list_rules).post(handlers::add_rule),
        )
        .route(
            "/api/routers/:id/rules/:native_id",
            put(handlers::update_rule).delete(handlers::delete_rule),
        )
        .route(
            "/api/routers/:id/rules/:native_id/enabled",
            put(handlers::set_rule_enabled),
        )
        // Credential helper
        .route("/api/crypto/encrypt", post(handlers::encrypt_password))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CredentialCodec, KEY_LEN};
    use crate::models::RouterRecord;
    use crate::router::ClientOptions;
    use serde_json::{json, Value};

    async fn spawn_api() -> String {
        let record = RouterRecord {
            id: "home".to_string(),
            name: "Home".to_string(),
            host: "192.0.2.1".to_string(),
            port: None,
            username: "root".to_string(),
            encrypted_password: None,
            encryption_iv: None,
            encryption_tag: None,
            transport: None,
        };
        let state = ApiState {
            routers: Arc::new(RouterManager::new(
                vec![record],
                Arc::new(CredentialCodec::new([5u8; KEY_LEN])),
                ClientOptions::default(),
            )),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_and_router_list() {
        let base = spawn_api().await;
        let http = reqwest::Client::new();

        let health: Value = http.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "ok");

        let list: Value = http
            .get(format!("{}/api/routers", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list["total"], 1);
        assert_eq!(list["routers"][0]["id"], "home");
        assert_eq!(list["routers"][0]["has_password"], false);
    }

    #[tokio::test]
    async fn test_unknown_router_is_404() {
        let base = spawn_api().await;
        let resp = reqwest::get(format!("{}/api/routers/nope/rules", base)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_invalid_rule_rejected_without_contacting_router() {
        let base = spawn_api().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/routers/home/rules", base))
            .json(&json!({
                "name": "web",
                "protocol": "tcp",
                "externalPort": 80,
                "internalIp": "999.1.1.1",
                "internalPort": 80
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["field"], "internalIp");
    }

    #[tokio::test]
    async fn test_encrypt_password_round_trips() {
        let base = spawn_api().await;
        let body: Value = reqwest::Client::new()
            .post(format!("{}/api/crypto/encrypt", base))
            .json(&json!({ "password": "hunter2" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let codec = CredentialCodec::new([5u8; KEY_LEN]);
        let plain = codec
            .decrypt(
                body["encrypted_password"].as_str().unwrap(),
                body["encryption_iv"].as_str().unwrap(),
                body["encryption_tag"].as_str().unwrap(),
            )
            .unwrap();
        assert_eq!(plain, "hunter2");
    }
}
