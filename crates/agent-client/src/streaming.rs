//! Streaming query client
//!
//! Drives the in-process structured backend over its streaming HTTP
//! endpoint and retags its native frames as canonical messages. No
//! watchdogs live here - the backend manages its own liveness - and the
//! credential is an explicit per-call parameter, never ambient process
//! state, so concurrent requests with different keys cannot race.

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::message::{CanonicalMessage, MessageStream, StreamItem};
use crate::normalizer;
use crate::router::{ChatTurn, ExecutionRequest};
use crate::signals::{self, BackendSignal};

#[derive(Serialize)]
struct StreamRequestBody {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_turns: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    allowed_tools: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    history: Vec<ChatTurn>,
    working_dir: String,
    stream: bool,
}

/// Client for the structured streaming backend
#[derive(Clone)]
pub struct StreamingClient {
    client: Client,
    base_url: String,
}

impl StreamingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            // Direct backend connection; never routed through a proxy
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
        }
    }

    /// Execute a request and stream its canonicalized messages
    pub fn execute(&self, request: &ExecutionRequest, api_key: Option<String>) -> MessageStream {
        let (tx, stream) = MessageStream::channel(256);
        let client = self.client.clone();
        let url = format!("{}/v1/agent/stream", self.base_url);
        let body = StreamRequestBody {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system_prompt.clone(),
            max_turns: request.max_turns,
            allowed_tools: request.allowed_tools.clone(),
            history: request.history.clone(),
            working_dir: request.working_dir.to_string_lossy().to_string(),
            stream: true,
        };
        let cancel = request.cancel.clone();

        tokio::spawn(async move {
            if let Err(e) = run_stream(client, url, body, api_key, cancel, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        stream
    }
}

async fn run_stream(
    client: Client,
    url: String,
    body: StreamRequestBody,
    api_key: Option<String>,
    cancel: CancellationToken,
    tx: &mpsc::Sender<StreamItem>,
) -> crate::Result<()> {
    info!("Streaming request to {} (model {})", url, body.model);

    let mut builder = client.post(&url).json(&body);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        res = builder.send() => res?,
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(match signals::detect_signal(&text) {
            Some(BackendSignal::QuotaExhausted) => AgentError::QuotaExhausted { message: text },
            Some(BackendSignal::AuthFailure) => AgentError::AuthFailed { message: text },
            None => AgentError::Backend {
                message: format!("{}: {}", status, text),
            },
        });
    }

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut yielded = 0usize;
    let mut saw_terminal = false;

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            item = stream.next() => item,
        };
        let chunk = match item {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(AgentError::Stream(format!("Stream error: {}", e))),
            None => break,
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(idx) = buffer.find("\n\n") {
            let frame = buffer.drain(..idx + 2).collect::<String>();
            let frame = frame.trim();
            let Some(data) = frame.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                buffer.clear();
                break;
            }
            let Some(value) = normalizer::parse_json_line(data) else {
                debug!("Skipping unparseable stream frame");
                continue;
            };
            if let Some(msg) = normalizer::to_message(value) {
                if msg.is_terminal() {
                    saw_terminal = true;
                }
                yielded += 1;
                if tx.send(Ok(msg)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    if yielded == 0 {
        return Err(AgentError::MissingOutput);
    }
    if !saw_terminal {
        let _ = tx.send(Ok(CanonicalMessage::success(""))).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_serialization_omits_empty_fields() {
        let body = StreamRequestBody {
            model: "sonnet".to_string(),
            prompt: "p".to_string(),
            system: None,
            max_turns: None,
            allowed_tools: Vec::new(),
            history: Vec::new(),
            working_dir: "/tmp".to_string(),
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("max_turns").is_none());
        assert!(json.get("allowed_tools").is_none());
        assert!(json.get("history").is_none());
        assert_eq!(json["stream"], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_history_turns_serialize_with_roles() {
        let body = StreamRequestBody {
            model: "sonnet".to_string(),
            prompt: "and now?".to_string(),
            system: None,
            max_turns: None,
            allowed_tools: Vec::new(),
            history: vec![
                ChatTurn::user("review this diff"),
                ChatTurn::assistant("two issues found"),
            ],
            working_dir: "/tmp".to_string(),
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["history"][0]["role"], "user");
        assert_eq!(json["history"][1]["role"], "assistant");
        assert_eq!(json["history"][1]["content"], "two issues found");
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let client = StreamingClient::new("http://127.0.0.1:9");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ExecutionRequest::new("prompt", "sonnet", "/tmp").with_cancel(cancel);
        let stream = client.execute(&request, Some("sk-test".to_string()));
        let err = stream.collect().await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
