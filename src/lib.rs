//! portdash - port dashboard backend
//!
//! Manages port forwarding on OpenWrt routers over SSH/UCI or Luci JSON-RPC,
//! picking whichever transport the router answers on.

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod router;
