//! Provider router
//!
//! Picks one of the two execution mechanisms for a request and returns a
//! uniform message stream. Mode resolution never blocks indefinitely and
//! never fails: an explicit override wins, otherwise a bounded lookup of
//! stored authentication state supplies the default, and a failed lookup
//! falls back deterministically to the subprocess path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use relay_core::{AuthConfig, AuthStore, ExecutionMode};

use crate::agent::{AgentKind, SubprocessConfig, TimeoutPolicy};
use crate::message::MessageStream;
use crate::process::SubprocessClient;
use crate::streaming::StreamingClient;

/// Bound on the stored-auth lookup during mode resolution
const MODE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Author of a prior conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior turn of conversation context.
///
/// Carried by the streaming path only; the subprocess path is single-shot
/// and ignores history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// One dispatched execution request. Immutable once dispatched.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// The prompt to execute
    pub prompt: String,
    /// Optional system prompt
    pub system_prompt: Option<String>,
    /// Target model identifier
    pub model: String,
    /// Working directory for the agent
    pub working_dir: PathBuf,
    /// Turn limit, if bounded
    pub max_turns: Option<u32>,
    /// Tool allow-list; empty means backend default
    pub allowed_tools: Vec<String>,
    /// Prior conversation turns, oldest first (streaming path only)
    pub history: Vec<ChatTurn>,
    /// Explicit execution-mode override
    pub mode_override: Option<ExecutionMode>,
    /// Shared cancellation handle
    pub cancel: CancellationToken,
}

impl ExecutionRequest {
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
            working_dir: working_dir.into(),
            max_turns: None,
            allowed_tools: Vec::new(),
            history: Vec::new(),
            mode_override: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode_override = Some(mode);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Routes execution requests to the streaming or subprocess mechanism
pub struct ProviderRouter {
    auth: Arc<dyn AuthStore>,
    streaming: StreamingClient,
    agent: AgentKind,
    timeouts: TimeoutPolicy,
}

impl ProviderRouter {
    pub fn new(auth: Arc<dyn AuthStore>, streaming: StreamingClient, agent: AgentKind) -> Self {
        Self {
            auth,
            streaming,
            agent,
            timeouts: TimeoutPolicy::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Resolve the execution mode for a request.
    ///
    /// Returns the mode together with whatever auth state the bounded
    /// lookup produced; the streaming path still needs the credential.
    pub async fn resolve_mode(
        &self,
        request: &ExecutionRequest,
    ) -> (ExecutionMode, Option<AuthConfig>) {
        let config = match tokio::time::timeout(MODE_RESOLVE_TIMEOUT, self.auth.load()).await {
            Ok(Ok(config)) => Some(config),
            Ok(Err(e)) => {
                warn!("Auth lookup failed, using fallback mode: {}", e);
                None
            }
            Err(_) => {
                warn!("Auth lookup timed out, using fallback mode");
                None
            }
        };

        let mode = request
            .mode_override
            .or_else(|| config.as_ref().map(AuthConfig::implied_mode))
            .unwrap_or(ExecutionMode::Subprocess);
        debug!("Resolved execution mode: {}", mode.as_str());
        (mode, config)
    }

    /// Dispatch a request, returning one lazy canonical message stream.
    ///
    /// Routing itself does not fail; failures surface only from the
    /// chosen mechanism, as items of the returned stream.
    pub async fn execute(&self, request: ExecutionRequest) -> MessageStream {
        let (mode, auth) = self.resolve_mode(&request).await;
        match mode {
            ExecutionMode::Streaming => {
                let api_key = auth.and_then(|c| c.api_key);
                self.streaming.execute(&request, api_key)
            }
            ExecutionMode::Subprocess => {
                let config =
                    SubprocessConfig::for_agent(self.agent, &request, self.timeouts.clone());
                SubprocessClient::execute(
                    config,
                    request.system_prompt.clone(),
                    request.prompt.clone(),
                    request.cancel.clone(),
                )
            }
        }
    }
}
