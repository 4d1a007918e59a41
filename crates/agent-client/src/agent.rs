//! CLI agent kinds and subprocess configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::router::ExecutionRequest;

/// Wire protocol spoken by a CLI agent on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    /// One JSON value per newline-terminated line
    JsonLines,
    /// Entire stdout captured as one block until exit
    PlainText,
}

/// Supported CLI agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    ClaudeCode,
    GeminiCli,
    Codex,
}

impl AgentKind {
    /// Parse an agent kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "claude-code" | "claudecode" | "claude" => Ok(Self::ClaudeCode),
            "gemini-cli" | "geminicli" | "gemini" => Ok(Self::GeminiCli),
            "codex" => Ok(Self::Codex),
            _ => Err(AgentError::spawn_failed(format!(
                "Unknown agent kind: {}",
                s
            ))),
        }
    }

    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::GeminiCli => "gemini-cli",
            Self::Codex => "codex",
        }
    }

    /// Get the command to run this agent
    pub fn command(&self) -> &'static str {
        match self {
            Self::ClaudeCode => {
                if cfg!(target_os = "windows") {
                    "claude.cmd"
                } else {
                    "claude"
                }
            }
            Self::GeminiCli => "gemini",
            Self::Codex => "codex",
        }
    }

    /// Wire protocol this agent speaks on stdout
    pub fn protocol(&self) -> WireProtocol {
        match self {
            Self::ClaudeCode | Self::Codex => WireProtocol::JsonLines,
            Self::GeminiCli => WireProtocol::PlainText,
        }
    }

    /// Build the argument list for one execution request.
    ///
    /// The prompt itself is fed through stdin, not argv.
    pub fn build_args(&self, request: &ExecutionRequest) -> Vec<String> {
        match self {
            Self::ClaudeCode => {
                let mut args = vec![
                    "-p".to_string(),
                    "--output-format".to_string(),
                    "stream-json".to_string(),
                    "--verbose".to_string(),
                    "--model".to_string(),
                    request.model.clone(),
                ];
                if let Some(max_turns) = request.max_turns {
                    args.push("--max-turns".to_string());
                    args.push(max_turns.to_string());
                }
                if !request.allowed_tools.is_empty() {
                    args.push("--allowedTools".to_string());
                    args.push(request.allowed_tools.join(","));
                }
                args
            }
            Self::GeminiCli => vec!["-m".to_string(), request.model.clone()],
            Self::Codex => vec![
                "exec".to_string(),
                "--json".to_string(),
                "--model".to_string(),
                request.model.clone(),
            ],
        }
    }
}

/// Startup and idle watchdog windows for a subprocess run
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// Maximum time from spawn to first output/activity
    pub startup: Duration,
    /// Maximum gap between successive output/activity events
    pub idle: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(30),
            idle: Duration::from_secs(300),
        }
    }
}

/// Configuration for one subprocess run
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Protocol spoken on stdout
    pub protocol: WireProtocol,
    /// Working directory for the agent
    pub working_dir: PathBuf,
    /// Additional environment variables
    pub env: Vec<(String, String)>,
    /// Watchdog windows
    pub timeouts: TimeoutPolicy,
}

impl SubprocessConfig {
    /// Build a config for a known agent kind and request
    pub fn for_agent(kind: AgentKind, request: &ExecutionRequest, timeouts: TimeoutPolicy) -> Self {
        Self {
            program: kind.command().to_string(),
            args: kind.build_args(request),
            protocol: kind.protocol(),
            working_dir: request.working_dir.clone(),
            env: Vec::new(),
            timeouts,
        }
    }
}
