//! Core library for Relay
//!
//! This crate contains the shared domain types consumed by the execution
//! core, including:
//! - Work units (the features/reviews automation is keyed against)
//! - Execution mode and stored authentication configuration
//! - Quota snapshots

pub mod auth;
pub mod error;
pub mod work;

pub use auth::{AuthConfig, AuthMethod, AuthStore, ExecutionMode, QuotaSnapshot};
pub use error::Error;
pub use work::{WorkKind, WorkUnit};

pub type Result<T> = std::result::Result<T, Error>;
