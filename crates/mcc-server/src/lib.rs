//! Mission Control console server.
//!
//! A small REST layer over [`mcc_gateway::GatewayClient`]: gateway status and
//! events, an overview of agents and sessions, cron job management, memory
//! search with a local markdown fallback, memory export/import/clear, a skill
//! catalogue, and an audit log of every mutating action. Bound beyond
//! loopback, the API sits behind a password login.

pub mod audit;
pub mod auth;
pub mod config;
pub mod host;
pub mod markdown;
pub mod normalize;
pub mod routes;
pub mod skills;

pub use audit::{AuditError, AuditRecord, AuditStore, Outcome};
pub use auth::SessionAuth;
pub use config::{AppConfig, Cli, ConfigError, Paths};
pub use routes::{ApiError, AppState, router};
