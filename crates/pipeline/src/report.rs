//! Step results and issues

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of a pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and its verdict is positive
    Passed,
    /// The step ran and its verdict is negative
    Failed,
    /// The step could not be executed (mechanism failure)
    Error,
}

/// Normalized issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Map a backend-supplied severity label onto the closed set.
    ///
    /// Case-insensitive; unknown labels default to low rather than
    /// inflating severity.
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("critical") | Some("high") => Self::High,
            Some("medium") => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// One structured problem report extracted from a step's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable identity hash for cross-iteration deduplication
    pub hash: String,
    /// Human summary of the problem
    pub summary: String,
    /// `path:line` location, when the backend supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Normalized severity
    pub severity: Severity,
}

/// Result of executing one pipeline step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step verdict
    pub status: StepStatus,
    /// Raw response text, retained even when parsing failed
    pub output: String,
    /// Extracted issues, in report order
    pub issues: Vec<Issue>,
    /// Step-specific parsed extras (metrics, suggestions, ...)
    pub metadata: Map<String, Value>,
}

impl StepResult {
    /// Create a result with an explicit verdict
    pub fn completed(
        status: StepStatus,
        output: impl Into<String>,
        issues: Vec<Issue>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            status,
            output: output.into(),
            issues,
            metadata,
        }
    }

    /// Create an error result from a mechanism failure
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Error,
            output: message.into(),
            issues: Vec::new(),
            metadata: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Severity::from_label(Some("CRITICAL")), Severity::High);
        assert_eq!(Severity::from_label(Some("High")), Severity::High);
        assert_eq!(Severity::from_label(Some("medium")), Severity::Medium);
        assert_eq!(Severity::from_label(Some("info")), Severity::Low);
        assert_eq!(Severity::from_label(None), Severity::Low);
    }

    #[test]
    fn test_error_result_is_empty() {
        let result = StepResult::error("spawn failed");
        assert_eq!(result.status, StepStatus::Error);
        assert!(result.issues.is_empty());
        assert!(result.metadata.is_empty());
        assert_eq!(result.output, "spawn failed");
    }
}
