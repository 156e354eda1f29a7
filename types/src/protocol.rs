//! Tolerant parsing of decoded ACP event objects.
//!
//! Agents disagree on casing and nesting, so parsing works over
//! `serde_json::Value` and tries several key spellings instead of deriving a
//! strict schema. Events whose top-level type is unknown, or which lack the
//! one field they cannot do without, are rejected with a
//! [`ProtocolShapeError`]; unknown `sessionUpdate` kinds are kept as
//! [`SessionUpdate::Unknown`] so the caller can log them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::content::{ContentBlock, MessageKind, Role};
use crate::feed::{PlanEntry, PlanEntryPriority, PlanEntryStatus};
use crate::ids::TerminalId;
use crate::permission::PermissionRequest;
use crate::tool::ToolCallUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolShapeError {
    #[error("event is not a JSON object")]
    NotAnObject,
    #[error("event has no type")]
    MissingType,
    #[error("unknown event type `{0}`")]
    UnknownType(String),
    #[error("`{event}` event is missing `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },
}

/// A slash command advertised by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableCommand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    MessageChunk {
        role: Role,
        message_kind: Option<MessageKind>,
        blocks: Vec<ContentBlock>,
    },
    Plan {
        entries: Vec<PlanEntry>,
    },
    ToolCall(ToolCallUpdate),
    ToolCallUpdate(ToolCallUpdate),
    /// Raw option objects; normalization happens in the resolver.
    ConfigOptions(Vec<Value>),
    ModelUpdate {
        current_model_id: Option<String>,
    },
    AvailableCommands(Vec<AvailableCommand>),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AcpEvent {
    SessionStarted {
        session_id: Option<String>,
        agent_capabilities: Option<Value>,
        config_options: Vec<Value>,
    },
    SessionUpdate(SessionUpdate),
    PermissionRequest(PermissionRequest),
    TerminalOutput {
        terminal_id: TerminalId,
        chunk: String,
    },
    PromptEnd {
        stop_reason: Option<String>,
    },
    SessionError {
        error: String,
    },
    SessionExit,
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    field(obj, keys).and_then(Value::as_str).map(str::to_string)
}

fn array_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<Value> {
    field(obj, keys)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

impl AcpEvent {
    pub fn from_value(value: &Value) -> Result<Self, ProtocolShapeError> {
        let obj = value.as_object().ok_or(ProtocolShapeError::NotAnObject)?;
        let kind = match obj.get("type").and_then(Value::as_str) {
            Some(kind) => kind,
            None if field(obj, &["sessionUpdate", "session_update"]).is_some() => {
                return SessionUpdate::from_object(obj).map(Self::SessionUpdate);
            }
            None => return Err(ProtocolShapeError::MissingType),
        };

        match kind {
            "session_started" => Ok(Self::SessionStarted {
                session_id: string_field(obj, &["sessionId", "session_id"]),
                agent_capabilities: field(obj, &["agentCapabilities", "agent_capabilities"])
                    .cloned(),
                config_options: array_field(obj, &["configOptions", "config_options"]),
            }),
            "session_update" => {
                let update = obj
                    .get("update")
                    .or_else(|| obj.get("params").and_then(|params| params.get("update")))
                    .and_then(Value::as_object)
                    .unwrap_or(obj);
                SessionUpdate::from_object(update).map(Self::SessionUpdate)
            }
            "tool_call" => ToolCallUpdate::from_value(value)
                .map(|update| Self::SessionUpdate(SessionUpdate::ToolCall(update)))
                .ok_or(ProtocolShapeError::MissingField {
                    event: "tool_call",
                    field: "toolCallId",
                }),
            "tool_call_update" => ToolCallUpdate::from_value(value)
                .map(|update| Self::SessionUpdate(SessionUpdate::ToolCallUpdate(update)))
                .ok_or(ProtocolShapeError::MissingField {
                    event: "tool_call_update",
                    field: "toolCallId",
                }),
            "permission_request" => PermissionRequest::from_value(value)
                .map(Self::PermissionRequest)
                .ok_or(ProtocolShapeError::MissingField {
                    event: "permission_request",
                    field: "requestId",
                }),
            "terminal_output" => {
                let terminal_id = string_field(obj, &["terminalId", "terminal_id"]).ok_or(
                    ProtocolShapeError::MissingField {
                        event: "terminal_output",
                        field: "terminalId",
                    },
                )?;
                Ok(Self::TerminalOutput {
                    terminal_id: TerminalId::new(terminal_id),
                    chunk: string_field(obj, &["chunk", "data", "output"]).unwrap_or_default(),
                })
            }
            "prompt_end" => Ok(Self::PromptEnd {
                stop_reason: string_field(obj, &["stopReason", "stop_reason"]),
            }),
            "session_error" => Ok(Self::SessionError {
                error: error_text(obj.get("error")),
            }),
            "session_exit" => Ok(Self::SessionExit),
            other => Err(ProtocolShapeError::UnknownType(other.to_string())),
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionUpdate(_) => "session_update",
            Self::PermissionRequest(_) => "permission_request",
            Self::TerminalOutput { .. } => "terminal_output",
            Self::PromptEnd { .. } => "prompt_end",
            Self::SessionError { .. } => "session_error",
            Self::SessionExit => "session_exit",
        }
    }
}

fn error_text(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(obj)) => string_field(obj, &["message", "error"])
            .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        Some(Value::Null) | None => "unknown session error".to_string(),
        Some(other) => other.to_string(),
    }
}

impl SessionUpdate {
    fn from_object(obj: &Map<String, Value>) -> Result<Self, ProtocolShapeError> {
        let kind = string_field(obj, &["sessionUpdate", "session_update", "type", "kind"]).ok_or(
            ProtocolShapeError::MissingField {
                event: "session_update",
                field: "sessionUpdate",
            },
        )?;
        let value = Value::Object(obj.clone());

        let update = match kind.as_str() {
            "agent_message_chunk" | "agent_message" => Self::message(obj, Role::Assistant, None),
            "user_message_chunk" | "user_message" => Self::message(obj, Role::User, None),
            "thought_message" | "thought_message_chunk" | "agent_thought_chunk" => {
                Self::message(obj, Role::Assistant, Some(MessageKind::Thought))
            }
            "plan" => Self::Plan {
                entries: plan_entries(obj),
            },
            "tool_call" => {
                Self::ToolCall(ToolCallUpdate::from_value(&value).ok_or(
                    ProtocolShapeError::MissingField {
                        event: "tool_call",
                        field: "toolCallId",
                    },
                )?)
            }
            "tool_call_update" => Self::ToolCallUpdate(ToolCallUpdate::from_value(&value).ok_or(
                ProtocolShapeError::MissingField {
                    event: "tool_call_update",
                    field: "toolCallId",
                },
            )?),
            "config_option_update" | "config_options_update" => {
                let mut options = array_field(obj, &["configOptions", "config_options", "options"]);
                if options.is_empty()
                    && let Some(single) = field(obj, &["configOption", "config_option", "option"])
                {
                    options.push(single.clone());
                }
                Self::ConfigOptions(options)
            }
            "model_update" | "current_model_update" => Self::ModelUpdate {
                current_model_id: string_field(
                    obj,
                    &["currentModelId", "current_model_id", "modelId", "model_id"],
                ),
            },
            "available_commands_update" => Self::AvailableCommands(
                array_field(obj, &["availableCommands", "available_commands", "commands"])
                    .iter()
                    .filter_map(|command| serde_json::from_value(command.clone()).ok())
                    .collect(),
            ),
            _ => Self::Unknown(kind),
        };
        Ok(update)
    }

    fn message(obj: &Map<String, Value>, role: Role, message_kind: Option<MessageKind>) -> Self {
        let blocks = match obj.get("content") {
            Some(Value::Array(items)) => items.iter().filter_map(ContentBlock::from_value).collect(),
            Some(single) => ContentBlock::from_value(single).into_iter().collect(),
            None => string_field(obj, &["text"])
                .map(ContentBlock::text)
                .into_iter()
                .collect(),
        };
        Self::MessageChunk {
            role,
            message_kind,
            blocks,
        }
    }
}

fn plan_entries(obj: &Map<String, Value>) -> Vec<PlanEntry> {
    array_field(obj, &["entries", "plan", "items"])
        .iter()
        .filter_map(|entry| {
            let content = match entry {
                Value::String(text) => text.clone(),
                Value::Object(entry) => string_field(entry, &["content", "title", "text"])?,
                _ => return None,
            };
            let text = |key: &str| entry.get(key).and_then(Value::as_str);
            Some(PlanEntry {
                content,
                priority: text("priority").and_then(|raw| match raw {
                    "high" => Some(PlanEntryPriority::High),
                    "medium" => Some(PlanEntryPriority::Medium),
                    "low" => Some(PlanEntryPriority::Low),
                    _ => None,
                }),
                status: match text("status") {
                    Some("in_progress" | "inProgress" | "running") => PlanEntryStatus::InProgress,
                    Some("completed" | "done") => PlanEntryStatus::Completed,
                    _ => PlanEntryStatus::Pending,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_message_chunk() {
        let event = AcpEvent::from_value(&json!({
            "type": "session_update",
            "update": {
                "sessionUpdate": "agent_message_chunk",
                "content": {"type": "text", "text": "Hel"}
            }
        }))
        .unwrap();
        assert_eq!(
            event,
            AcpEvent::SessionUpdate(SessionUpdate::MessageChunk {
                role: Role::Assistant,
                message_kind: None,
                blocks: vec![ContentBlock::text("Hel")],
            })
        );
    }

    #[test]
    fn bare_update_without_type_is_accepted() {
        let event = AcpEvent::from_value(&json!({
            "sessionUpdate": "agent_thought_chunk",
            "content": {"type": "text", "text": "hmm"}
        }))
        .unwrap();
        assert!(matches!(
            event,
            AcpEvent::SessionUpdate(SessionUpdate::MessageChunk {
                message_kind: Some(MessageKind::Thought),
                ..
            })
        ));
    }

    #[test]
    fn terminal_output_accepts_data_alias() {
        let event = AcpEvent::from_value(&json!({
            "type": "terminal_output",
            "terminal_id": "term-1",
            "data": "ok\n"
        }))
        .unwrap();
        assert_eq!(
            event,
            AcpEvent::TerminalOutput {
                terminal_id: TerminalId::new("term-1"),
                chunk: "ok\n".into(),
            }
        );
    }

    #[test]
    fn plan_entries_are_lenient() {
        let event = AcpEvent::from_value(&json!({
            "type": "session_update",
            "update": {
                "sessionUpdate": "plan",
                "entries": [
                    {"content": "Read code", "priority": "high", "status": "completed"},
                    {"content": "Write fix", "status": "bogus"},
                    "Ship it",
                    42
                ]
            }
        }))
        .unwrap();
        let AcpEvent::SessionUpdate(SessionUpdate::Plan { entries }) = event else {
            panic!("expected plan");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, PlanEntryStatus::Completed);
        assert_eq!(entries[1].status, PlanEntryStatus::Pending);
        assert_eq!(entries[2].content, "Ship it");
    }

    #[test]
    fn session_error_text_from_object() {
        let event = AcpEvent::from_value(&json!({
            "type": "session_error",
            "error": {"code": -32000, "message": "agent crashed"}
        }))
        .unwrap();
        assert_eq!(
            event,
            AcpEvent::SessionError {
                error: "agent crashed".into()
            }
        );
    }

    #[test]
    fn shape_errors() {
        assert_eq!(
            AcpEvent::from_value(&json!([1, 2])),
            Err(ProtocolShapeError::NotAnObject)
        );
        assert_eq!(
            AcpEvent::from_value(&json!({"type": "telemetry"})),
            Err(ProtocolShapeError::UnknownType("telemetry".into()))
        );
        assert!(matches!(
            AcpEvent::from_value(&json!({"type": "tool_call", "title": "x"})),
            Err(ProtocolShapeError::MissingField { field: "toolCallId", .. })
        ));
        let unknown = AcpEvent::from_value(&json!({
            "type": "session_update",
            "update": {"sessionUpdate": "mode_changed"}
        }))
        .unwrap();
        assert_eq!(
            unknown,
            AcpEvent::SessionUpdate(SessionUpdate::Unknown("mode_changed".into()))
        );
    }

    #[test]
    fn single_config_option_update_is_wrapped() {
        let event = AcpEvent::from_value(&json!({
            "type": "session_update",
            "update": {
                "sessionUpdate": "config_option_update",
                "configOption": {"id": "model", "currentValue": "sonnet"}
            }
        }))
        .unwrap();
        let AcpEvent::SessionUpdate(SessionUpdate::ConfigOptions(options)) = event else {
            panic!("expected config options");
        };
        assert_eq!(options.len(), 1);
    }
}
