//! Step Pipeline - configurable analysis steps over agent output
//!
//! A pipeline step builds a natural-language prompt from its
//! configuration, drives it through the provider router, extracts a
//! structured verdict and findings from the response, and deduplicates
//! findings across repeated iterations via stable issue hashes.

mod config;
mod dedup;
mod error;
mod extract;
mod prompt;
mod report;
mod runner;

pub use config::{PriorFinding, StepConfig, StepType};
pub use dedup::{issue_hash, seen_hashes};
pub use error::{PipelineError, Result};
pub use extract::{extract_json_object, parse_step_output, ParsedOutput, RawFinding};
pub use prompt::build_prompt;
pub use report::{Issue, Severity, StepResult, StepStatus};
pub use runner::{QueryBackend, RunnerSettings, StepRunner};
