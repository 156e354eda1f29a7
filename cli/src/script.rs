//! Replay scripts: JSON lines mixing inbound events and user commands.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use weft_core::CommandResult;
use weft_engine::SessionController;
use weft_types::{ContentBlock, PermissionOutcome, RequestId, ThinkingBudgetLevel};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ScriptCommand {
    Start,
    Prompt {
        text: String,
    },
    Cancel,
    /// Answer a permission request. No `optionId` means the user dismissed it.
    #[serde(rename_all = "camelCase")]
    Permission {
        request_id: String,
        #[serde(default)]
        option_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetOption {
        option_id: String,
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    SetModel {
        model_id: String,
    },
    SetEffort {
        level: ThinkingBudgetLevel,
    },
}

impl ScriptCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Prompt { .. } => "prompt",
            Self::Cancel => "cancel",
            Self::Permission { .. } => "permission",
            Self::SetOption { .. } => "set_option",
            Self::SetModel { .. } => "set_model",
            Self::SetEffort { .. } => "set_effort",
        }
    }

    pub fn run(self, controller: &mut SessionController, now_ms: i64) -> CommandResult {
        match self {
            Self::Start => controller.start_session(now_ms),
            Self::Prompt { text } => controller.send_prompt(vec![ContentBlock::text(text)], now_ms),
            Self::Cancel => controller.cancel(now_ms),
            Self::Permission {
                request_id,
                option_id,
            } => {
                let outcome = match option_id {
                    Some(option_id) => PermissionOutcome::Selected { option_id },
                    None => PermissionOutcome::Cancelled,
                };
                controller.respond_permission(&RequestId::new(request_id), outcome)
            }
            Self::SetOption { option_id, value } => controller.set_config_option(&option_id, &value),
            Self::SetModel { model_id } => controller.set_model(&model_id),
            Self::SetEffort { level } => controller.set_effort(level),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Event(Value),
    Command(ScriptCommand),
}

/// Parse one script line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ScriptStep>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed).context("line is not JSON")?;
    if value.get("command").is_some() {
        let command = serde_json::from_value(value).context("unrecognized command")?;
        return Ok(Some(ScriptStep::Command(command)));
    }
    Ok(Some(ScriptStep::Event(value)))
}
