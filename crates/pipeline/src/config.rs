//! Pipeline step configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Closed set of analysis step types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Review,
    Security,
    Performance,
    Test,
    Custom,
}

impl StepType {
    /// Canonical string representation, also the default issue category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Test => "test",
            Self::Custom => "custom",
        }
    }
}

/// A finding reported in an earlier iteration, carried as memory so the
/// backend is told not to repeat it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorFinding {
    /// Stable issue hash from the earlier iteration
    pub hash: String,
    /// Summary as previously reported
    pub summary: String,
    /// `path:line` location, if it had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Configuration for one pipeline step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step type
    pub step_type: StepType,
    /// Review: focus areas to emphasize
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_areas: Vec<String>,
    /// Security: checklist items to verify
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<String>,
    /// Performance: named thresholds (e.g. "p95 latency" -> "200ms")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, String>,
    /// Test: minimum acceptable coverage percentage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_target: Option<u8>,
    /// Custom: free-form template with `{{unit.*}}` placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Iteration memory: findings already reported for this unit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory: Vec<PriorFinding>,
}

impl StepConfig {
    fn empty(step_type: StepType) -> Self {
        Self {
            step_type,
            focus_areas: Vec::new(),
            checklist: Vec::new(),
            thresholds: BTreeMap::new(),
            coverage_target: None,
            template: None,
            memory: Vec::new(),
        }
    }

    /// A review step with the given focus areas
    pub fn review(focus_areas: Vec<String>) -> Self {
        Self {
            focus_areas,
            ..Self::empty(StepType::Review)
        }
    }

    /// A security step with the given checklist
    pub fn security(checklist: Vec<String>) -> Self {
        Self {
            checklist,
            ..Self::empty(StepType::Security)
        }
    }

    /// A performance step with named thresholds
    pub fn performance(thresholds: BTreeMap<String, String>) -> Self {
        Self {
            thresholds,
            ..Self::empty(StepType::Performance)
        }
    }

    /// A test step with an optional coverage target
    pub fn test(coverage_target: Option<u8>) -> Self {
        Self {
            coverage_target,
            ..Self::empty(StepType::Test)
        }
    }

    /// A custom step driven by a user-supplied template
    pub fn custom(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Self::empty(StepType::Custom)
        }
    }

    /// Attach iteration memory from earlier runs
    pub fn with_memory(mut self, memory: Vec<PriorFinding>) -> Self {
        self.memory = memory;
        self
    }
}
