use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a feed item, unique within one session's feed.
    FeedId
);
string_id!(
    /// Agent-assigned tool call identifier.
    ToolCallId
);
string_id!(TerminalId);
string_id!(
    /// Permission request identifier. Numeric JSON-RPC ids are stringified.
    RequestId
);
string_id!(
    /// Task/session identity used to key sessions and their stored records.
    SessionKey
);

impl FeedId {
    #[must_use]
    pub fn for_message(sequence: u64) -> Self {
        Self(format!("msg-{sequence}"))
    }

    #[must_use]
    pub fn for_plan(sequence: u64) -> Self {
        Self(format!("plan-{sequence}"))
    }

    #[must_use]
    pub fn for_tool_call(id: &ToolCallId) -> Self {
        Self(format!("tool-{id}"))
    }

    #[must_use]
    pub fn for_permission(id: &RequestId) -> Self {
        Self(format!("perm-{id}"))
    }

    /// The counter value baked into a `msg-N` or `plan-N` id.
    #[must_use]
    pub fn allocated_sequence(&self) -> Option<u64> {
        self.0
            .strip_prefix("msg-")
            .or_else(|| self.0.strip_prefix("plan-"))?
            .parse()
            .ok()
    }
}

/// Identifier of a collapsed group of tool calls and thoughts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
