//! Canonical message model
//!
//! All backend mechanisms - CLI agent subprocesses and the streaming API -
//! are normalized into one typed message sequence. A `result` or terminal
//! `error` always ends the sequence.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::AgentError;

/// One item of a message stream: a message, or a mechanism-level failure
pub type StreamItem = std::result::Result<CanonicalMessage, AgentError>;

/// A block of assistant content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain assistant text
    Text { text: String },
    /// A tool invocation the assistant made
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
}

/// Subtype of a terminal result message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    Error,
}

/// The normalized, backend-agnostic unit of streamed output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalMessage {
    /// Assistant output, in emission order
    Assistant { content: Vec<ContentBlock> },

    /// Terminal result carrying the final text
    Result {
        subtype: ResultSubtype,
        text: String,
    },

    /// Terminal error reported by the backend itself
    Error { message: String },
}

impl CanonicalMessage {
    /// Create an assistant message with a single text block
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create a successful terminal result
    pub fn success(text: impl Into<String>) -> Self {
        Self::Result {
            subtype: ResultSubtype::Success,
            text: text.into(),
        }
    }

    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this message ends the sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }

    /// Concatenated text content, if any
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Assistant { content } => {
                let text: Vec<&str> = content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        ContentBlock::ToolUse { .. } => None,
                    })
                    .collect();
                if text.is_empty() {
                    None
                } else {
                    Some(text.join("\n"))
                }
            }
            Self::Result { text, .. } => Some(text.clone()),
            Self::Error { message } => Some(message.clone()),
        }
    }
}

/// A lazy, finite, non-restartable sequence of canonical messages
///
/// Backed by an mpsc channel; the producing task owns the sender and the
/// sequence ends when the sender is dropped.
pub struct MessageStream {
    rx: mpsc::Receiver<StreamItem>,
}

impl MessageStream {
    /// Create a stream together with its producing sender
    pub fn channel(buffer: usize) -> (mpsc::Sender<StreamItem>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// Next item in emission order; `None` once the sequence is complete
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Drain the stream, failing on the first mechanism-level error
    pub async fn collect(mut self) -> crate::Result<Vec<CanonicalMessage>> {
        let mut messages = Vec::new();
        while let Some(item) = self.next().await {
            messages.push(item?);
        }
        Ok(messages)
    }
}
