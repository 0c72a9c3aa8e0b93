//! portdash - port dashboard backend
//!
//! Serves the router port-forwarding API for the dashboard frontend.

use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portdash::api::{self, ApiState};
use portdash::config::Config;
use portdash::crypto::CredentialCodec;
use portdash::router::{ClientOptions, RouterManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portdash=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting portdash...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    let codec = Arc::new(CredentialCodec::from_config(&config.crypto)?);

    // Report records this key cannot open
    for record in &config.routers {
        if let Err(e) = record.credential(&codec) {
            tracing::warn!("Router {} credential unusable: {}", record.id, e);
        }
    }

    let routers = Arc::new(RouterManager::new(
        config.routers,
        codec,
        ClientOptions::from(&config.router),
    ));

    let cors = CorsLayer::permissive();
    let app = api::routes(ApiState { routers }).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
