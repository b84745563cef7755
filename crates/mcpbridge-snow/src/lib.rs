//! # mcpbridge ServiceNow
//!
//! Connector service for ServiceNow incident management. Inbound REST calls
//! are translated into Table API requests authenticated with HTTP Basic
//! credentials.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod server;
pub mod table;

pub use server::{AppState, router, serve};
pub use table::{IncidentCreate, SnowClient, SnowError, SnowSettings};

/// Service errors raised outside the request path.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
