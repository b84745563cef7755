//! # mcpbridge Core
//!
//! Shared glue for the mcpbridge connector services.
//!
//! This crate provides:
//! - Env-file configuration store (`KEY=VALUE` lines, merge-on-update)
//! - Secret wrapper that prevents accidental logging
//! - Activity records served by the activity endpoints
//! - Shared HTTP API types and error mapping

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
pub mod api;
pub mod envfile;
pub mod secrets;

pub use activity::Activity;
pub use api::{Ack, ApiError, ConfigUpdate};
pub use envfile::{EnvFile, EnvFileError};
pub use secrets::Secret;
