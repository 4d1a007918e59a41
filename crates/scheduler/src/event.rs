//! Notification events emitted by the scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a scheduled unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeEventKind {
    /// Automation paused because quota is exhausted
    Paused {
        reason: String,
        resume_at: DateTime<Utc>,
    },

    /// The timer fired but quota is still exhausted; re-armed
    ReArmed { resume_at: DateTime<Utc> },

    /// Quota recovered; automation may run again
    Resumed,

    /// The pause was cancelled manually
    Cancelled,
}

/// A scheduler notification for one work unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeEvent {
    /// Work-unit key this event belongs to
    pub unit_key: String,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
    /// The event payload
    #[serde(flatten)]
    pub kind: ResumeEventKind,
}

impl ResumeEvent {
    pub fn new(unit_key: impl Into<String>, kind: ResumeEventKind) -> Self {
        Self {
            unit_key: unit_key.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}
