//! # mcpbridge M365
//!
//! Connector service for Microsoft 365 family account management. Inbound
//! REST calls are translated into Microsoft Graph requests authenticated
//! with an OAuth2 client-credentials bearer token.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod graph;
mod server;

pub use graph::{GraphClient, GraphError, GraphSettings, PasswordResetRequest};
pub use server::{AppState, router, serve};

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
