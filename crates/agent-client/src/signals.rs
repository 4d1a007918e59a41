//! Best-effort detection of quota and authentication signals
//!
//! Backends report credit exhaustion and credential problems as natural
//! language, not structured errors. The phrase lists here are tunable
//! heuristics: detection is advisory and never fails a stream by itself,
//! it only upgrades an existing failure into a categorized one.

use crate::error::AgentError;

/// A categorized signal found in backend text output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSignal {
    /// Usage/credit/rate limit exhaustion
    QuotaExhausted,
    /// Rejected or missing credential
    AuthFailure,
}

const QUOTA_PHRASES: &[&str] = &[
    "credit balance is too low",
    "usage limit reached",
    "usage limit exceeded",
    "quota exceeded",
    "rate limit",
    "out of credits",
    "overloaded_error",
];

const AUTH_PHRASES: &[&str] = &[
    "invalid api key",
    "authentication_error",
    "authentication failed",
    "unauthorized",
    "not logged in",
    "please run /login",
];

/// Scan text for a known quota or auth signal.
///
/// Quota phrases take precedence: rate-limit wording on an authenticated
/// account is far more common than a credential failure that happens to
/// mention limits.
pub fn detect_signal(text: &str) -> Option<BackendSignal> {
    let lower = text.to_lowercase();
    if QUOTA_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(BackendSignal::QuotaExhausted);
    }
    if AUTH_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(BackendSignal::AuthFailure);
    }
    None
}

/// Turn a failed process exit into the most specific error available
pub fn classify_failure(code: Option<i32>, text: &str) -> AgentError {
    match detect_signal(text) {
        Some(BackendSignal::QuotaExhausted) => AgentError::QuotaExhausted {
            message: first_line(text),
        },
        Some(BackendSignal::AuthFailure) => AgentError::AuthFailed {
            message: first_line(text),
        },
        None => AgentError::ProcessFailed {
            code,
            message: if text.trim().is_empty() {
                "Agent process failed without error output".to_string()
            } else {
                text.trim().to_string()
            },
        },
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("(no detail)")
        .to_string()
}
