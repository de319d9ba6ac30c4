//! Client for the upstream agent gateway.
//!
//! [`GatewayClient`] keeps one long-lived event stream open in the background,
//! reconnecting with capped exponential backoff, and offers request/response
//! calls ([`call`](GatewayClient::call), [`invoke_tool`](GatewayClient::invoke_tool))
//! that share its view of whether the credential is still good.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use mcc_gateway::{GatewayClient, GatewayConfig};
//!
//! let gateway = GatewayClient::new(GatewayConfig::default())?;
//! gateway.start();
//! let jobs = gateway
//!     .invoke_tool("cron", serde_json::json!({"action": "list"}))
//!     .await?;
//! println!("{jobs} ({})", gateway.status().state);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
pub mod machine;

pub use client::GatewayClient;
pub use config::{ConfigError, GatewayConfig};
pub use mcc_core::{Backoff, ConnectionState, ConnectionStatus, ErrorKind, GatewayError};
