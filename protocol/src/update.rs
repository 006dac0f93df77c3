use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::content::ContentBlock;

/// One raw update pushed by the backend while a turn runs. Field presence is
/// deliberately loose: backend versions add and omit fields freely, so every
/// kind-specific field is optional and unknown kinds parse to [`Unknown`]
/// instead of failing the whole stream.
///
/// [`Unknown`]: SessionUpdate::Unknown
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "sessionUpdate", rename_all = "camelCase")]
pub enum SessionUpdate {
    #[serde(rename_all = "camelCase")]
    AgentMessageChunk {
        #[serde(default)]
        content: Option<ContentBlock>,
    },
    #[serde(rename_all = "camelCase")]
    AgentThoughtChunk {
        #[serde(default)]
        content: Option<ContentBlock>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        #[serde(default)]
        tool_call_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        raw_input: Option<Value>,
        #[serde(default)]
        status: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCallUpdate {
        #[serde(default)]
        tool_call_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        raw_input: Option<Value>,
        #[serde(default)]
        raw_output: Option<Value>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        content: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Plan {
        #[serde(default)]
        entries: Vec<Value>,
    },
    #[serde(other)]
    Unknown,
}

impl SessionUpdate {
    /// Parse a raw transport payload. The discriminator is normally
    /// `sessionUpdate`; older backends used `kind`, which is accepted as a
    /// fallback. Non-objects and records without a discriminator yield
    /// `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.contains_key("sessionUpdate") {
            return serde_json::from_value(value.clone()).ok();
        }
        let discriminator = object.get("kind")?.as_str()?.to_string();
        let mut object = object.clone();
        object.remove("kind");
        object.insert("sessionUpdate".to_string(), Value::String(discriminator));
        serde_json::from_value(Value::Object(object)).ok()
    }
}
