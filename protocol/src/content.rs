use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Content block attached to a streaming chunk. Only text blocks carry
/// information this layer consumes; every other block type is tolerated and
/// ignored so newer backends do not break older bridges.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotations: Option<Value>,
    },
    #[serde(other)]
    Other,
}

/// Whether a content block's audience annotation admits assistant-facing
/// text. Backends disagree on the annotation shape, so three are accepted:
/// a flat string array (`["assistant"]`), an object with an `audience`
/// array, or that object nested one level under `value`. An absent or empty
/// audience admits the text.
pub fn audience_includes_assistant(annotations: Option<&Value>) -> bool {
    let Some(annotations) = annotations else {
        return true;
    };
    let audience = match annotations {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("audience").or_else(|| {
            map.get("value")
                .and_then(Value::as_object)
                .and_then(|value| value.get("audience"))
        }) {
            Some(Value::Array(entries)) => entries,
            // An object without a recognizable audience list gates nothing.
            _ => return true,
        },
        _ => return true,
    };
    if audience.is_empty() {
        return true;
    }
    audience
        .iter()
        .filter_map(Value::as_str)
        .any(|role| role == "assistant")
}
