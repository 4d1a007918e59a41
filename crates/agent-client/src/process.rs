//! Subprocess stream supervisor
//!
//! Spawns a CLI agent, feeds it the prompt over stdin, and turns its
//! process lifecycle into the canonical message sequence. Two watchdogs
//! supervise liveness: a startup window (spawn to first activity) and an
//! idle window (gap between activity events). Stderr lines count as
//! activity but are never parsed as protocol - slow tools that log
//! progress to stderr must not be killed as hung.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{SubprocessConfig, WireProtocol};
use crate::error::AgentError;
use crate::message::{CanonicalMessage, MessageStream, StreamItem};
use crate::normalizer;
use crate::signals;

/// Maximum stderr lines retained for error reporting
const STDERR_TAIL_LINES: usize = 50;

/// Executes requests by spawning a CLI agent subprocess
pub struct SubprocessClient;

impl SubprocessClient {
    /// Spawn the configured agent and stream its canonicalized output.
    ///
    /// The returned stream is lazy and finite; mechanism failures arrive
    /// as the final `Err` item. Messages already yielded are never
    /// revoked by a later failure.
    pub fn execute(
        config: SubprocessConfig,
        system_prompt: Option<String>,
        prompt: String,
        cancel: CancellationToken,
    ) -> MessageStream {
        let (tx, stream) = MessageStream::channel(256);
        tokio::spawn(async move {
            if let Err(e) = supervise(config, system_prompt, prompt, cancel, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        stream
    }
}

/// One wakeup of the supervision loop
enum Wakeup {
    Cancelled,
    Stdout(std::io::Result<Option<String>>),
    Stderr(std::io::Result<Option<String>>),
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
}

async fn supervise(
    config: SubprocessConfig,
    system_prompt: Option<String>,
    prompt: String,
    cancel: CancellationToken,
    tx: &mpsc::Sender<StreamItem>,
) -> crate::Result<()> {
    info!(
        "Spawning {} in {:?} ({} args)",
        config.program,
        config.working_dir,
        config.args.len()
    );

    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .current_dir(&config.working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|e| {
        AgentError::spawn_failed_with_source(format!("Failed to spawn {}: {}", config.program, e), e)
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| AgentError::spawn_failed("Failed to capture stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AgentError::spawn_failed("Failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AgentError::spawn_failed("Failed to capture stderr"))?;

    // Feed the prompt from a separate task so a full stdin pipe can never
    // deadlock against our stdout reads.
    let input = {
        let mut s = String::new();
        if let Some(system) = system_prompt {
            s.push_str(&system);
            s.push('\n');
        }
        s.push_str(&prompt);
        s.push('\n');
        s
    };
    tokio::spawn(async move {
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            debug!("Failed to write prompt to agent stdin: {}", e);
        }
        let _ = stdin.shutdown().await;
    });

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_done = false;
    let mut err_done = false;

    let mut seen_activity = false;
    let mut yielded = 0usize;
    let mut saw_terminal = false;
    let mut plain_buf = String::new();
    let mut stderr_tail: Vec<String> = Vec::new();

    loop {
        let window = if seen_activity {
            config.timeouts.idle
        } else {
            config.timeouts.startup
        };

        // Cancellation first: it must win over buffered output and over a
        // timeout that becomes ready in the same instant.
        let wakeup = tokio::select! {
            biased;
            _ = cancel.cancelled() => Wakeup::Cancelled,
            line = out_lines.next_line(), if !out_done => Wakeup::Stdout(line),
            line = err_lines.next_line(), if !err_done => Wakeup::Stderr(line),
            status = child.wait(), if out_done && err_done => Wakeup::Exited(status),
            _ = tokio::time::sleep(window) => Wakeup::TimedOut,
        };

        match wakeup {
            Wakeup::Cancelled => {
                info!("Cancellation requested, killing {}", config.program);
                kill(&mut child).await;
                return Err(AgentError::Cancelled);
            }
            Wakeup::Stdout(Ok(Some(line))) => {
                seen_activity = true;
                match config.protocol {
                    WireProtocol::JsonLines => {
                        if let Some(value) = normalizer::parse_json_line(&line) {
                            if let Some(msg) = normalizer::to_message(value) {
                                if msg.is_terminal() {
                                    saw_terminal = true;
                                }
                                yielded += 1;
                                if tx.send(Ok(msg)).await.is_err() {
                                    warn!("Message stream dropped, killing {}", config.program);
                                    kill(&mut child).await;
                                    return Ok(());
                                }
                            }
                        }
                    }
                    WireProtocol::PlainText => {
                        plain_buf.push_str(&line);
                        plain_buf.push('\n');
                    }
                }
            }
            Wakeup::Stdout(Ok(None)) => out_done = true,
            Wakeup::Stdout(Err(e)) => {
                kill(&mut child).await;
                return Err(e.into());
            }
            Wakeup::Stderr(Ok(Some(line))) => {
                // Liveness only, never protocol
                seen_activity = true;
                debug!("agent stderr: {}", line);
                if stderr_tail.len() == STDERR_TAIL_LINES {
                    stderr_tail.remove(0);
                }
                stderr_tail.push(line);
            }
            Wakeup::Stderr(Ok(None)) | Wakeup::Stderr(Err(_)) => err_done = true,
            Wakeup::Exited(status) => {
                let status = status?;
                return finalize(
                    &config,
                    status,
                    yielded,
                    saw_terminal,
                    &plain_buf,
                    &stderr_tail,
                    tx,
                )
                .await;
            }
            Wakeup::TimedOut => {
                warn!(
                    "{} watchdog fired for {}, killing process",
                    if seen_activity { "Idle" } else { "Startup" },
                    config.program
                );
                kill(&mut child).await;
                return Err(if seen_activity {
                    AgentError::IdleTimeout {
                        seconds: config.timeouts.idle.as_secs(),
                    }
                } else {
                    AgentError::StartupTimeout {
                        seconds: config.timeouts.startup.as_secs(),
                    }
                });
            }
        }
    }
}

async fn finalize(
    config: &SubprocessConfig,
    status: std::process::ExitStatus,
    yielded: usize,
    saw_terminal: bool,
    plain_buf: &str,
    stderr_tail: &[String],
    tx: &mpsc::Sender<StreamItem>,
) -> crate::Result<()> {
    let stderr_text = stderr_tail.join("\n");

    match config.protocol {
        WireProtocol::JsonLines => {
            if !status.success() {
                return Err(signals::classify_failure(status.code(), &stderr_text));
            }
            if yielded == 0 {
                return Err(AgentError::MissingOutput);
            }
            if !saw_terminal {
                // Protocol invariant: a result always ends the sequence
                let _ = tx.send(Ok(CanonicalMessage::success(""))).await;
            }
            Ok(())
        }
        WireProtocol::PlainText => {
            let messages = normalizer::from_plain_output(plain_buf, &stderr_text, status.code())?;
            for msg in messages {
                if tx.send(Ok(msg)).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to kill agent process: {}", e);
    }
    let _ = child.wait().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::agent::TimeoutPolicy;
    use crate::message::ResultSubtype;
    use std::time::Duration;

    fn sh(script: &str, protocol: WireProtocol, startup_ms: u64, idle_ms: u64) -> SubprocessConfig {
        SubprocessConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            protocol,
            working_dir: std::env::temp_dir(),
            env: Vec::new(),
            timeouts: TimeoutPolicy {
                startup: Duration::from_millis(startup_ms),
                idle: Duration::from_millis(idle_ms),
            },
        }
    }

    fn run(config: SubprocessConfig) -> MessageStream {
        SubprocessClient::execute(config, None, "test prompt".to_string(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_json_lines_in_order() {
        let script = r#"printf '{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}\n{"type":"result","subtype":"success","result":"done"}\n'"#;
        let stream = run(sh(script, WireProtocol::JsonLines, 2000, 2000));
        let messages = stream.collect().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text().unwrap(), "hello");
        assert_eq!(
            messages[1],
            CanonicalMessage::Result {
                subtype: ResultSubtype::Success,
                text: "done".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_lines_do_not_abort_stream() {
        let script = r#"printf 'not json\n{"type":"result","subtype":"success","result":"ok"}\n'"#;
        let stream = run(sh(script, WireProtocol::JsonLines, 2000, 2000));
        let messages = stream.collect().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_terminal());
    }

    #[tokio::test]
    async fn test_no_activity_startup_timeout() {
        let stream = run(sh("sleep 5", WireProtocol::JsonLines, 200, 5000));
        let err = stream.collect().await.unwrap_err();
        assert!(matches!(err, AgentError::StartupTimeout { .. }));
    }

    #[tokio::test]
    async fn test_idle_timeout_after_first_output_keeps_yielded_messages() {
        let script = r#"printf '{"type":"assistant","message":{"content":[{"type":"text","text":"one"}]}}\n'; sleep 5"#;
        let mut stream = run(sh(script, WireProtocol::JsonLines, 2000, 200));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text().unwrap(), "one");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::IdleTimeout { .. }));
    }

    #[tokio::test]
    async fn test_stderr_activity_defeats_idle_watchdog() {
        // Logs to stderr every 100ms, only produces stdout at the end
        let script = r#"i=0; while [ $i -lt 6 ]; do echo tick >&2; sleep 0.1; i=$((i+1)); done; printf '{"type":"result","subtype":"success","result":"ok"}\n'"#;
        let stream = run(sh(script, WireProtocol::JsonLines, 1000, 300));
        let messages = stream.collect().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_terminal());
    }

    #[tokio::test]
    async fn test_stderr_only_successful_exit_is_not_a_timeout() {
        let script = "echo working >&2; exit 0";
        let stream = run(sh(script, WireProtocol::JsonLines, 1000, 1000));
        let err = stream.collect().await.unwrap_err();
        assert!(!err.is_timeout());
        assert!(matches!(err, AgentError::MissingOutput));
    }

    #[tokio::test]
    async fn test_startup_window_longer_than_idle_window() {
        // Only output arrives after the idle window but inside startup
        let script = r#"sleep 0.5; printf '{"type":"result","subtype":"success","result":"late"}\n'"#;
        let stream = run(sh(script, WireProtocol::JsonLines, 1500, 150));
        let messages = stream.collect().await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_beats_timeout() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = SubprocessClient::execute(
            sh("sleep 5", WireProtocol::JsonLines, 1, 1),
            None,
            "prompt".to_string(),
            cancel,
        );
        let err = stream.collect().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let script = "echo boom >&2; exit 3";
        let stream = run(sh(script, WireProtocol::JsonLines, 2000, 2000));
        let err = stream.collect().await.unwrap_err();
        match err {
            AgentError::ProcessFailed { code, message } => {
                assert_eq!(code, Some(3));
                assert!(message.contains("boom"));
            }
            other => panic!("Expected ProcessFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_capture() {
        let stream = run(sh("echo reviewed, no issues", WireProtocol::PlainText, 2000, 2000));
        let messages = stream.collect().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text().unwrap(), "reviewed, no issues");
        assert!(messages[1].is_terminal());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut config = sh("true", WireProtocol::JsonLines, 1000, 1000);
        config.program = "/nonexistent/agent-binary".to_string();
        let stream = run(config);
        let err = stream.collect().await.unwrap_err();
        assert!(matches!(err, AgentError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_quota_phrase_in_failure_is_categorized() {
        let script = "echo 'Your credit balance is too low' >&2; exit 1";
        let stream = run(sh(script, WireProtocol::JsonLines, 2000, 2000));
        let err = stream.collect().await.unwrap_err();
        assert!(matches!(err, AgentError::QuotaExhausted { .. }));
    }
}
