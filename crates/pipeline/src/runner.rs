//! Pipeline step runner
//!
//! Builds the prompt for a step, drives it through the provider router,
//! and parses the response into a structured result. Mechanism failures
//! become `status: error` results; cancellation stays a distinct error so
//! callers never log it as a genuine failure. There is no retry here -
//! callers decide whether to re-invoke.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use agent_client::{
    AgentError, CanonicalMessage, ExecutionRequest, MessageStream, ProviderRouter, ResultSubtype,
};
use relay_core::{ExecutionMode, WorkUnit};

use crate::config::StepConfig;
use crate::dedup::{issue_hash, seen_hashes};
use crate::error::{PipelineError, Result};
use crate::extract::parse_step_output;
use crate::prompt::build_prompt;
use crate::report::{Issue, Severity, StepResult, StepStatus};

/// Backend seam for the runner; implemented by [`ProviderRouter`]
pub trait QueryBackend: Send + Sync {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = MessageStream> + Send + '_>>;
}

impl QueryBackend for ProviderRouter {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = MessageStream> + Send + '_>> {
        Box::pin(ProviderRouter::execute(self, request))
    }
}

/// Execution settings shared by every step this runner executes
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Target model identifier
    pub model: String,
    /// Working directory the agent operates in
    pub working_dir: PathBuf,
    /// Turn limit, if bounded
    pub max_turns: Option<u32>,
    /// Tool allow-list; empty means backend default
    pub allowed_tools: Vec<String>,
    /// Execution-mode override, if forced
    pub mode_override: Option<ExecutionMode>,
}

/// Runs analysis steps over work units
pub struct StepRunner {
    backend: Arc<dyn QueryBackend>,
    settings: RunnerSettings,
}

impl StepRunner {
    pub fn new(backend: Arc<dyn QueryBackend>, settings: RunnerSettings) -> Self {
        Self { backend, settings }
    }

    /// Execute one step over one work unit.
    ///
    /// Returns `Err` only for cancellation and invalid configuration;
    /// every mechanism failure is reported inside the result.
    pub async fn execute(
        &self,
        unit: &WorkUnit,
        config: &StepConfig,
        cancel: CancellationToken,
    ) -> Result<StepResult> {
        let prompt = build_prompt(unit, config)?;
        info!(
            "Running {} step for unit {}",
            config.step_type.as_str(),
            unit.id
        );

        let mut request = ExecutionRequest::new(
            prompt,
            self.settings.model.clone(),
            self.settings.working_dir.clone(),
        )
        .with_allowed_tools(self.settings.allowed_tools.clone())
        .with_cancel(cancel);
        if let Some(max_turns) = self.settings.max_turns {
            request = request.with_max_turns(max_turns);
        }
        if let Some(mode) = self.settings.mode_override {
            request = request.with_mode(mode);
        }

        let mut stream = self.backend.execute(request).await;
        let mut accumulated = String::new();
        let mut final_text: Option<String> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(msg @ CanonicalMessage::Assistant { .. }) => {
                    if let Some(text) = msg.text() {
                        if !accumulated.is_empty() {
                            accumulated.push('\n');
                        }
                        accumulated.push_str(&text);
                    }
                }
                Ok(CanonicalMessage::Result { subtype, text }) => match subtype {
                    ResultSubtype::Success => {
                        if !text.trim().is_empty() {
                            final_text = Some(text);
                        }
                    }
                    ResultSubtype::Error => {
                        let message = if text.trim().is_empty() {
                            "Backend reported a failed result".to_string()
                        } else {
                            text
                        };
                        return Ok(StepResult::error(message));
                    }
                },
                Ok(CanonicalMessage::Error { message }) => {
                    return Ok(StepResult::error(message));
                }
                Err(AgentError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => return Ok(StepResult::error(e.to_string())),
            }
        }

        let text = final_text.unwrap_or(accumulated);
        Ok(self.shape_result(config, text))
    }

    fn shape_result(&self, config: &StepConfig, text: String) -> StepResult {
        let parsed = parse_step_output(&text);
        let seen = seen_hashes(&config.memory);
        let default_category = config.step_type.as_str();

        let mut issues = Vec::new();
        for finding in &parsed.findings {
            let category = finding.category.as_deref().unwrap_or(default_category);
            let hash = issue_hash(
                &finding.summary,
                finding.file.as_deref(),
                finding.line,
                category,
            );
            if seen.contains(&hash) {
                debug!("Suppressing already-reported issue {}", hash);
                continue;
            }
            let location = finding.file.as_ref().map(|file| match finding.line {
                Some(line) => format!("{}:{}", file, line),
                None => file.clone(),
            });
            issues.push(Issue {
                hash,
                summary: finding.summary.clone(),
                location,
                severity: Severity::from_label(finding.severity.as_deref()),
            });
        }

        let status = match explicit_verdict(&parsed.extras) {
            Some(true) => StepStatus::Passed,
            Some(false) => StepStatus::Failed,
            None => {
                if issues.iter().any(|i| i.severity == Severity::High) {
                    StepStatus::Failed
                } else {
                    StepStatus::Passed
                }
            }
        };

        StepResult::completed(status, text, issues, parsed.extras)
    }
}

/// A verdict the backend stated outright, when present
fn explicit_verdict(extras: &serde_json::Map<String, Value>) -> Option<bool> {
    if let Some(passed) = extras.get("passed").and_then(Value::as_bool) {
        return Some(passed);
    }
    match extras.get("status").and_then(Value::as_str) {
        Some("passed") | Some("pass") => Some(true),
        Some("failed") | Some("fail") => Some(false),
        _ => None,
    }
}
