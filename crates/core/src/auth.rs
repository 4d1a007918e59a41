//! Stored authentication state, execution-mode preference and quota snapshots
//!
//! Credential storage itself lives outside this workspace; the execution
//! core only consumes a resolved [`AuthConfig`] through the [`AuthStore`]
//! trait. Callers must treat the lookup as fallible and bounded - the
//! provider router falls back to a deterministic default mode when the
//! store is slow or unavailable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which mechanism carries out an execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// In-process streaming call against the structured backend API
    Streaming,
    /// Spawned external CLI agent parsed as a line-delimited protocol
    Subprocess,
}

impl ExecutionMode {
    /// Parse an execution mode from a stored string
    pub fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "streaming" | "api" | "sdk" => Ok(Self::Streaming),
            "subprocess" | "cli" => Ok(Self::Subprocess),
            _ => Err(Error::InvalidExecutionMode(s.to_string())),
        }
    }

    /// Canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Subprocess => "subprocess",
        }
    }
}

/// How the user authenticates with the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Direct API key (billed per token)
    ApiKey,
    /// Subscription login handled by the CLI agent itself
    Subscription,
}

/// Resolved authentication state supplied by external storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How the user authenticates
    pub method: AuthMethod,
    /// API key, present for [`AuthMethod::ApiKey`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Stored execution-mode preference, if the user set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_mode: Option<ExecutionMode>,
}

impl AuthConfig {
    /// The mode this configuration implies when no explicit preference
    /// is stored: an API key can drive the streaming path, a subscription
    /// only works through the CLI agent.
    pub fn implied_mode(&self) -> ExecutionMode {
        if let Some(mode) = self.preferred_mode {
            return mode;
        }
        match self.method {
            AuthMethod::ApiKey => ExecutionMode::Streaming,
            AuthMethod::Subscription => ExecutionMode::Subprocess,
        }
    }
}

/// Point-in-time view of backend quota/usage state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Whether the quota is currently exhausted
    pub exhausted: bool,
    /// When the quota window resets, if the source supplies it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    /// Human-readable detail from the quota source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When this snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    /// Snapshot reporting available quota
    pub fn available() -> Self {
        Self {
            exhausted: false,
            resets_at: None,
            detail: None,
            taken_at: Utc::now(),
        }
    }

    /// Snapshot reporting exhausted quota with an optional reset time
    pub fn exhausted(resets_at: Option<DateTime<Utc>>) -> Self {
        Self {
            exhausted: true,
            resets_at,
            detail: None,
            taken_at: Utc::now(),
        }
    }
}

/// Bounded lookup of stored authentication state
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Load the current auth configuration
    async fn load(&self) -> crate::Result<AuthConfig>;
}
