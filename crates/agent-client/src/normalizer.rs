//! Message normalizer
//!
//! Canonicalizes raw backend output into [`CanonicalMessage`] values.
//! Line-delimited JSON is parsed one value per line with garbage lines
//! skipped; captured plain-text output is converted into exactly one
//! assistant + result pair, or a single error message.

use serde_json::Value;
use tracing::debug;

use crate::error::AgentError;
use crate::message::{CanonicalMessage, ContentBlock, ResultSubtype};

/// Parse one newline-terminated line as a JSON value.
///
/// Returns `None` for partial or garbage lines; the stream must tolerate
/// those without aborting.
pub fn parse_json_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Skipping unparseable protocol line: {}", e);
            None
        }
    }
}

/// Parse a block of line-delimited JSON, preserving line order
pub fn parse_json_lines(input: &str) -> Vec<Value> {
    input.lines().filter_map(parse_json_line).collect()
}

/// Shape a wire value into a canonical message.
///
/// Values lacking a recognizable message shape are ignored (`None`).
pub fn to_message(value: Value) -> Option<CanonicalMessage> {
    match value.get("type").and_then(Value::as_str)? {
        "assistant" => {
            let content = value
                .get("message")
                .and_then(|m| m.get("content"))
                .or_else(|| value.get("content"));
            let blocks = match content {
                Some(Value::Array(items)) => items.iter().filter_map(content_block).collect(),
                Some(Value::String(text)) => vec![ContentBlock::Text { text: text.clone() }],
                _ => Vec::new(),
            };
            if blocks.is_empty() {
                return None;
            }
            Some(CanonicalMessage::Assistant { content: blocks })
        }
        "result" => {
            let subtype = match value.get("subtype").and_then(Value::as_str) {
                Some("success") | None => ResultSubtype::Success,
                Some(_) => ResultSubtype::Error,
            };
            let text = value
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(CanonicalMessage::Result { subtype, text })
        }
        "error" => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| {
                    value
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                })
                .unwrap_or("Unknown backend error")
                .to_string();
            Some(CanonicalMessage::Error { message })
        }
        // system/user/progress frames carry no assistant output
        _ => None,
    }
}

fn content_block(item: &Value) -> Option<ContentBlock> {
    match item.get("type").and_then(Value::as_str)? {
        "text" => Some(ContentBlock::Text {
            text: item.get("text").and_then(Value::as_str)?.to_string(),
        }),
        "tool_use" => Some(ContentBlock::ToolUse {
            name: item.get("name").and_then(Value::as_str)?.to_string(),
            input: item.get("input").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

/// Convert captured plain-text subprocess output into canonical messages.
///
/// Zero exit with non-empty stdout yields exactly one assistant message
/// followed by one successful result. Non-zero exit, or stderr-only
/// output, yields a single error message. Zero exit with no output at all
/// is a missing-output failure, not an empty success.
pub fn from_plain_output(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
) -> crate::Result<Vec<CanonicalMessage>> {
    let success = exit_code == Some(0);
    let text = stdout.trim();

    if success && !text.is_empty() {
        return Ok(vec![
            CanonicalMessage::assistant_text(text),
            CanonicalMessage::success(text),
        ]);
    }

    let err_text = stderr.trim();
    if success && err_text.is_empty() {
        return Err(AgentError::MissingOutput);
    }

    let message = if err_text.is_empty() {
        format!("Agent process failed with exit code {:?}", exit_code)
    } else {
        err_text.to_string()
    };
    Ok(vec![CanonicalMessage::error(message)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_line_parse_preserves_order() {
        let input = "{\"type\":\"start\"}\n{\"type\":\"done\",\"ok\":true}\n";
        let values = parse_json_lines(input);
        assert_eq!(
            values,
            vec![json!({"type": "start"}), json!({"type": "done", "ok": true})]
        );
    }

    #[test]
    fn test_garbage_lines_are_skipped() {
        let input = "{\"type\":\"start\"}\nnot json at all\n{\"truncated\":\n{\"type\":\"done\"}\n";
        let values = parse_json_lines(input);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], json!({"type": "start"}));
        assert_eq!(values[1], json!({"type": "done"}));
    }

    #[test]
    fn test_assistant_message_shaping() {
        let value = json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "Looking at the diff."},
                    {"type": "tool_use", "name": "grep", "input": {"pattern": "fn main"}}
                ]
            }
        });
        let msg = to_message(value).unwrap();
        match msg {
            CanonicalMessage::Assistant { content } => {
                assert_eq!(content.len(), 2);
                assert!(matches!(content[1], ContentBlock::ToolUse { .. }));
            }
            _ => panic!("Expected assistant message"),
        }
    }

    #[test]
    fn test_result_subtypes() {
        let ok = to_message(json!({"type": "result", "subtype": "success", "result": "done"}));
        assert_eq!(ok, Some(CanonicalMessage::success("done")));

        let failed =
            to_message(json!({"type": "result", "subtype": "error_max_turns", "result": ""}));
        match failed.unwrap() {
            CanonicalMessage::Result { subtype, .. } => {
                assert_eq!(subtype, ResultSubtype::Error)
            }
            _ => panic!("Expected result message"),
        }
    }

    #[test]
    fn test_unrecognized_shapes_are_ignored() {
        assert!(to_message(json!({"type": "system", "session_id": "abc"})).is_none());
        assert!(to_message(json!({"ok": true})).is_none());
        assert!(to_message(json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_plain_output_success() {
        let messages = from_plain_output("All checks passed.\n", "", Some(0)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            CanonicalMessage::assistant_text("All checks passed.")
        );
        assert!(messages[1].is_terminal());
    }

    #[test]
    fn test_plain_output_stderr_only_is_error() {
        let messages = from_plain_output("", "warning: model overloaded\n", Some(0)).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], CanonicalMessage::Error { .. }));
    }

    #[test]
    fn test_plain_output_empty_success_is_missing_output() {
        let err = from_plain_output("", "", Some(0)).unwrap_err();
        assert!(matches!(err, AgentError::MissingOutput));
    }

    #[test]
    fn test_plain_output_nonzero_exit() {
        let messages = from_plain_output("partial\n", "segfault\n", Some(139)).unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            CanonicalMessage::Error { message } => assert_eq!(message, "segfault"),
            other => panic!("Expected error message, got {:?}", other),
        }
    }
}
