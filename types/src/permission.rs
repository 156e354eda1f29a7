use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;
use crate::tool::ToolCallUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    pub option_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl PermissionOption {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let string = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };
        let option_id = string(&["optionId", "option_id", "id"])?;
        Some(Self {
            name: string(&["name", "label"]).unwrap_or_else(|| option_id.clone()),
            kind: string(&["kind"]),
            option_id,
        })
    }
}

/// A pending request for the user to approve an agent action.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRequest {
    pub request_id: RequestId,
    /// The tool call the request is about, if the agent attached one.
    pub tool_call: Option<ToolCallUpdate>,
    pub options: Vec<PermissionOption>,
}

impl PermissionRequest {
    /// Parse `{requestId, params: {toolCall, options}}`. Fields are also read
    /// from the top level when `params` is absent.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let request_id = match ["requestId", "request_id", "id"]
            .iter()
            .find_map(|key| obj.get(*key))?
        {
            Value::String(id) if !id.is_empty() => RequestId::new(id.as_str()),
            Value::Number(n) => RequestId::new(n.to_string()),
            _ => return None,
        };
        let params = obj.get("params").and_then(Value::as_object).unwrap_or(obj);
        let tool_call = ["toolCall", "tool_call"]
            .iter()
            .find_map(|key| params.get(*key))
            .and_then(ToolCallUpdate::from_value);
        let options = params
            .get("options")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(PermissionOption::from_value).collect())
            .unwrap_or_default();
        Some(Self {
            request_id,
            tool_call,
            options,
        })
    }
}

/// The user's answer to a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcome {
    #[serde(rename_all = "camelCase")]
    Selected { option_id: String },
    Cancelled,
}
