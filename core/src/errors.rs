//! Command rejection taxonomy and session error formatting.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use weft_utils::cap_chars;

const SESSION_ERROR_BADGE: &str = "[Session error]";
const MAX_ERROR_DETAIL_CHARS: usize = 400;

/// Why a session command was refused. Every message names what the caller
/// can do next.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("session is {status}; start the session first")]
    NotRunning { status: &'static str },
    #[error("a prompt is already in flight; wait for it to finish or cancel it")]
    PromptInFlight,
    #[error("{count} permission request(s) pending; answer them before prompting again")]
    PermissionPending { count: usize },
    #[error("prompt is empty; add text or an attachment")]
    EmptyPrompt,
    #[error("no pending permission request `{0}`; it may already have been answered")]
    UnknownPermission(String),
    #[error("unknown config option `{0}`; wait for the agent to announce its options")]
    UnknownOption(String),
    #[error("`{value}` is not a valid choice for `{option}`; pick one of the advertised values")]
    InvalidChoice { option: String, value: String },
    #[error("this agent exposes no {0} control; hide the setting")]
    ControlUnsupported(&'static str),
    #[error("session failed to start: {0}; start it again")]
    Lifecycle(String),
    #[error("agent transport rejected the request: {0}; restart the session")]
    Transport(String),
}

/// Outcome of a session command as reported across the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: &CommandError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<(), CommandError>> for CommandResult {
    fn from(result: Result<(), CommandError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(error) => Self::failed(&error),
        }
    }
}

#[must_use]
pub fn split_api_error(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("API error ")?;
    let (status, body) = rest.split_once(": ")?;
    Some((status.trim().to_string(), body.trim().to_string()))
}

/// Pull a human message out of a JSON error body, if there is one.
pub fn extract_error_message(raw: &str) -> Option<String> {
    let body = split_api_error(raw).map_or_else(|| raw.trim().to_string(), |(_, body)| body);
    let payload: Value = serde_json::from_str(&body).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.pointer("/error").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

/// Render a `session_error` payload as the text of an error feed message.
#[must_use]
pub fn format_session_error(raw: &str) -> String {
    let trimmed = raw.trim();
    let status = split_api_error(trimmed).map(|(status, _)| status);
    let detail = extract_error_message(trimmed)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            if trimmed.is_empty() {
                "unknown error".to_string()
            } else {
                trimmed.to_string()
            }
        });

    let mut content = String::from(SESSION_ERROR_BADGE);
    content.push_str("\n\n");
    match status {
        Some(status) => {
            content.push_str("The agent reported an error (");
            content.push_str(&status);
            content.push_str(").");
        }
        None => content.push_str("The agent reported an error."),
    }
    content.push_str("\n\nDetails: ");
    content.push_str(&cap_chars(detail.trim(), MAX_ERROR_DETAIL_CHARS, "…"));
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_json_message() {
        let raw = r#"API error 429: {"error":{"message":"rate limited"}}"#;
        assert_eq!(extract_error_message(raw).as_deref(), Some("rate limited"));
        let formatted = format_session_error(raw);
        assert!(formatted.starts_with(SESSION_ERROR_BADGE));
        assert!(formatted.contains("(429)"));
        assert!(formatted.ends_with("Details: rate limited"));
    }

    #[test]
    fn plain_text_errors_pass_through() {
        let formatted = format_session_error("agent process exited with code 1");
        assert!(formatted.ends_with("Details: agent process exited with code 1"));
        assert!(format_session_error("   ").ends_with("Details: unknown error"));
    }

    #[test]
    fn command_result_serializes_camel_case() {
        let ok = serde_json::to_value(CommandResult::ok()).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true}));

        let failed: CommandResult = Err(CommandError::PromptInFlight).into();
        assert!(!failed.success);
        assert!(failed.error.unwrap().contains("cancel"));
    }
}
