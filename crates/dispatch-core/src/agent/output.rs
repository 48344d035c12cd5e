//! Agent output parsing for the three supported wire formats.
//!
//! `stream-json` is NDJSON with Claude-style message types: lines that
//! do not look like JSON objects are progress noise and skipped, the
//! final `result` message carries the reply text, and any message may
//! carry the native session id. `json` is a single document; `text` is
//! passed through as-is.

use serde::Deserialize;
use serde_json::Value;

use crate::config::OutputFormat;
use crate::error::{FailureKind, InvocationError};

// ─── Stream Protocol Types ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct StreamMessage {
    #[serde(rename = "type", default)]
    msg_type: String,
    session_id: Option<String>,
    result: Option<String>,
    is_error: Option<bool>,
}

/// Reply text and session metadata extracted from one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub text: String,
    pub native_session_id: Option<String>,
    /// Set when the agent itself reported failure despite exiting zero.
    pub agent_reported_error: bool,
}

/// Extract the reply from raw stdout according to the agent's format.
pub fn parse_output(format: OutputFormat, stdout: &str) -> Result<ParsedOutput, InvocationError> {
    match format {
        OutputFormat::Text => Ok(ParsedOutput {
            text: stdout.trim().to_string(),
            native_session_id: None,
            agent_reported_error: false,
        }),
        OutputFormat::Json => parse_json(stdout),
        OutputFormat::StreamJson => parse_stream_json(stdout),
    }
}

fn parse_stream_json(stdout: &str) -> Result<ParsedOutput, InvocationError> {
    let mut session_id: Option<String> = None;
    let mut result: Option<(String, bool)> = None;
    let mut parsed_any = false;

    for line in stdout.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        let message: StreamMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(_) => continue,
        };
        parsed_any = true;
        if message.session_id.is_some() {
            session_id = message.session_id;
        }
        if message.msg_type == "result" {
            result = Some((
                message.result.unwrap_or_default(),
                message.is_error.unwrap_or(false),
            ));
        }
    }

    if !parsed_any {
        return Err(InvocationError::new(
            FailureKind::Parse,
            format!(
                "Expected stream-json output but no line parsed: '{}'",
                truncate(stdout.trim(), 120)
            ),
        ));
    }

    match result {
        Some((text, is_error)) => Ok(ParsedOutput {
            text,
            native_session_id: session_id,
            agent_reported_error: is_error,
        }),
        None => Err(InvocationError::new(
            FailureKind::Parse,
            "Stream ended without a result message".to_string(),
        )),
    }
}

fn parse_json(stdout: &str) -> Result<ParsedOutput, InvocationError> {
    let value: Value = serde_json::from_str(stdout.trim()).map_err(|e| {
        InvocationError::new(
            FailureKind::Parse,
            format!(
                "Expected JSON output but got '{}': {}",
                truncate(stdout.trim(), 120),
                e
            ),
        )
    })?;

    let text = ["result", "response", "text"]
        .iter()
        .find_map(|field| value.get(field).and_then(Value::as_str))
        .map(|s| s.to_string())
        .unwrap_or_else(|| value.to_string());

    let native_session_id = ["session_id", "sessionId"]
        .iter()
        .find_map(|field| value.get(field).and_then(Value::as_str))
        .map(|s| s.to_string());

    let agent_reported_error = value
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(ParsedOutput {
        text,
        native_session_id,
        agent_reported_error,
    })
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_passthrough_trims() {
        let out = parse_output(OutputFormat::Text, "  hello\n").unwrap();
        assert_eq!(out.text, "hello");
        assert_eq!(out.native_session_id, None);
    }

    #[test]
    fn test_stream_json_extracts_result_and_session() {
        let stdout = concat!(
            "Starting up...\n",
            r#"{"type":"system","subtype":"init","session_id":"abc-123"}"#,
            "\n",
            r#"{"type":"assistant","message":{"role":"assistant","content":[]}}"#,
            "\n",
            r#"{"type":"result","subtype":"success","result":"done","is_error":false}"#,
            "\n",
        );
        let out = parse_output(OutputFormat::StreamJson, stdout).unwrap();
        assert_eq!(out.text, "done");
        assert_eq!(out.native_session_id.as_deref(), Some("abc-123"));
        assert!(!out.agent_reported_error);
    }

    #[test]
    fn test_stream_json_error_result() {
        let stdout = r#"{"type":"result","result":"rate limited","is_error":true}"#;
        let out = parse_output(OutputFormat::StreamJson, stdout).unwrap();
        assert!(out.agent_reported_error);
        assert_eq!(out.text, "rate limited");
    }

    #[test]
    fn test_stream_json_nothing_parsable() {
        let err = parse_output(OutputFormat::StreamJson, "plain text only\n").unwrap_err();
        assert_eq!(err.kind, FailureKind::Parse);
    }

    #[test]
    fn test_stream_json_missing_result_message() {
        let err =
            parse_output(OutputFormat::StreamJson, r#"{"type":"system","session_id":"x"}"#)
                .unwrap_err();
        assert!(err.message.contains("without a result"));
    }

    #[test]
    fn test_json_field_priority() {
        let out = parse_output(
            OutputFormat::Json,
            r#"{"result":"first","response":"second","session_id":"s1"}"#,
        )
        .unwrap();
        assert_eq!(out.text, "first");
        assert_eq!(out.native_session_id.as_deref(), Some("s1"));

        let out = parse_output(OutputFormat::Json, r#"{"response":"second"}"#).unwrap();
        assert_eq!(out.text, "second");

        let out = parse_output(OutputFormat::Json, r#"{"text":"third","sessionId":"s2"}"#).unwrap();
        assert_eq!(out.text, "third");
        assert_eq!(out.native_session_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_json_without_text_field_keeps_document() {
        let out = parse_output(OutputFormat::Json, r#"{"status":"ok"}"#).unwrap();
        assert_eq!(out.text, r#"{"status":"ok"}"#);
    }

    #[test]
    fn test_json_invalid_fails() {
        let err = parse_output(OutputFormat::Json, "not json").unwrap_err();
        assert_eq!(err.kind, FailureKind::Parse);
    }
}
