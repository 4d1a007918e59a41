//! Work units - the features and reviews automation runs against

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of work a unit represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// A feature to implement
    Feature,
    /// A review target (existing code/change to assess)
    Review,
}

/// A caller-supplied unit of work that pipeline steps and resume
/// schedules are keyed against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Unique work unit ID
    pub id: Uuid,
    /// Short human title
    pub title: String,
    /// Longer description of the work
    pub description: String,
    /// Free-form category (e.g. "backend", "ui", "infra")
    pub category: String,
    /// Kind of work
    pub kind: WorkKind,
    /// When the unit was created
    pub created_at: DateTime<Utc>,
}

impl WorkUnit {
    /// Create a new work unit
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        kind: WorkKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            kind,
            created_at: Utc::now(),
        }
    }

    /// Stable string key for registries (scheduler timers, dedup memory)
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_unit_creation() {
        let unit = WorkUnit::new("Add login", "Add login form", "ui", WorkKind::Feature);
        assert!(!unit.id.is_nil());
        assert_eq!(unit.key(), unit.id.to_string());
        assert_eq!(unit.kind, WorkKind::Feature);
    }
}
