//! Agent Client - uniform streaming access to AI agent backends
//!
//! This crate routes an execution request to one of two mechanisms -
//! an in-process streaming call against the structured backend API, or a
//! spawned CLI agent whose output is parsed as a line-delimited message
//! protocol - and exposes both behind one lazy canonical message stream.

mod agent;
mod error;
mod message;
mod normalizer;
mod process;
mod router;
mod signals;
mod streaming;

pub use agent::{AgentKind, SubprocessConfig, TimeoutPolicy, WireProtocol};
pub use error::{AgentError, Result};
pub use message::{CanonicalMessage, ContentBlock, MessageStream, ResultSubtype, StreamItem};
pub use normalizer::{from_plain_output, parse_json_line, parse_json_lines, to_message};
pub use process::SubprocessClient;
pub use router::{ChatTurn, ExecutionRequest, ProviderRouter, TurnRole};
pub use signals::{detect_signal, BackendSignal};
pub use streaming::StreamingClient;
