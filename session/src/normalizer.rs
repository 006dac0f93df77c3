use std::collections::HashMap;

use serde_json::Value;
use tether_protocol::ContentBlock;
use tether_protocol::PlanItem;
use tether_protocol::SessionMessage;
use tether_protocol::SessionUpdate;
use tether_protocol::ToolCallStatus;
use tether_protocol::audience_includes_assistant;
use tether_utils_text_merge::StreamTextBuffer;
use tracing::debug;

const FALLBACK_TOOL_NAME: &str = "Tool";

/// Registered tool invocation, keyed by the backend's `toolCallId`. The
/// registry lives for the whole session rather than one turn: late updates
/// referencing a call from an earlier turn still resolve to the right name.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Where a derived tool name came from. Title and raw-input derivations are
/// "strong": they may overwrite a previously registered name. A name derived
/// from the update's `kind` only fills in when the existing name is a
/// placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameSource {
    Title,
    RawInputName,
    RawInputTool,
    Kind,
    Default,
}

impl NameSource {
    fn is_strong(self) -> bool {
        matches!(self, Self::Title | Self::RawInputName | Self::RawInputTool)
    }
}

fn is_placeholder_tool_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("tool")
        || trimmed.eq_ignore_ascii_case("unknown")
        || trimmed.eq_ignore_ascii_case("other")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn derive_tool_name(
    title: Option<&str>,
    raw_input: Option<&Value>,
    kind: Option<&str>,
) -> (String, NameSource) {
    if let Some(title) = non_empty(title) {
        return (title.to_string(), NameSource::Title);
    }
    let raw_input = raw_input.and_then(Value::as_object);
    if let Some(name) = raw_input
        .and_then(|input| input.get("name"))
        .and_then(Value::as_str)
        .and_then(|name| non_empty(Some(name)))
    {
        return (name.to_string(), NameSource::RawInputName);
    }
    if let Some(tool) = raw_input
        .and_then(|input| input.get("tool"))
        .and_then(Value::as_str)
        .and_then(|tool| non_empty(Some(tool)))
    {
        return (tool.to_string(), NameSource::RawInputTool);
    }
    if let Some(kind) = kind.filter(|kind| !is_placeholder_tool_name(kind)) {
        return (kind.trim().to_string(), NameSource::Kind);
    }
    (FALLBACK_TOOL_NAME.to_string(), NameSource::Default)
}

/// Converts raw protocol updates into canonical [`SessionMessage`]s.
///
/// Streamed text accumulates in a [`StreamTextBuffer`] and is only surfaced
/// by [`flush_text`], which the turn driver calls right before signaling
/// completion. Tool-call updates are emitted immediately, so consumers see
/// tool context before any prose that references it.
///
/// [`flush_text`]: UpdateNormalizer::flush_text
#[derive(Debug, Default)]
pub struct UpdateNormalizer {
    text: StreamTextBuffer,
    tools: HashMap<String, ToolCallRecord>,
}

impl UpdateNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one raw update to zero or more canonical messages.
    pub fn normalize(&mut self, update: SessionUpdate) -> Vec<SessionMessage> {
        match update {
            SessionUpdate::AgentMessageChunk { content } => {
                if let Some(ContentBlock::Text { text, annotations }) = content
                    && audience_includes_assistant(annotations.as_ref())
                {
                    self.text.push(&text);
                }
                Vec::new()
            }
            // Reasoning is not surfaced at this layer.
            SessionUpdate::AgentThoughtChunk { .. } => Vec::new(),
            SessionUpdate::ToolCall {
                tool_call_id,
                title,
                kind,
                raw_input,
                status,
            } => self.handle_tool_call(tool_call_id, title, kind, raw_input, status),
            SessionUpdate::ToolCallUpdate {
                tool_call_id,
                title,
                kind,
                raw_input,
                raw_output,
                status,
                content,
            } => self.handle_tool_call_update(
                tool_call_id,
                title,
                kind,
                raw_input,
                raw_output,
                status,
                content,
            ),
            SessionUpdate::Plan { entries } => {
                let items: Vec<PlanItem> = entries.iter().filter_map(PlanItem::from_entry).collect();
                if items.is_empty() {
                    Vec::new()
                } else {
                    vec![SessionMessage::Plan { items }]
                }
            }
            SessionUpdate::Unknown => {
                debug!("dropping update of unknown kind");
                Vec::new()
            }
        }
    }

    /// Surface the buffered text, if any, and reset the buffer.
    pub fn flush_text(&mut self) -> Option<SessionMessage> {
        if self.text.is_empty() {
            return None;
        }
        Some(SessionMessage::Text {
            text: self.text.take(),
        })
    }

    /// Look up the registered record for a tool-call id.
    pub fn tool_record(&self, tool_call_id: &str) -> Option<&ToolCallRecord> {
        self.tools.get(tool_call_id)
    }

    fn handle_tool_call(
        &mut self,
        tool_call_id: String,
        title: Option<String>,
        kind: Option<String>,
        raw_input: Option<Value>,
        status: Option<String>,
    ) -> Vec<SessionMessage> {
        if tool_call_id.trim().is_empty() {
            debug!("dropping toolCall without a toolCallId");
            return Vec::new();
        }
        let (name, _) = derive_tool_name(title.as_deref(), raw_input.as_ref(), kind.as_deref());
        let input = raw_input.unwrap_or(Value::Null);
        self.tools.insert(
            tool_call_id.clone(),
            ToolCallRecord {
                id: tool_call_id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
        );
        vec![SessionMessage::ToolCall {
            id: tool_call_id,
            name,
            input,
            status: ToolCallStatus::from_wire(status.as_deref()),
        }]
    }

    #[expect(clippy::too_many_arguments)]
    fn handle_tool_call_update(
        &mut self,
        tool_call_id: String,
        title: Option<String>,
        kind: Option<String>,
        raw_input: Option<Value>,
        raw_output: Option<Value>,
        status: Option<String>,
        content: Option<Value>,
    ) -> Vec<SessionMessage> {
        if tool_call_id.trim().is_empty() {
            debug!("dropping toolCallUpdate without a toolCallId");
            return Vec::new();
        }
        let status = ToolCallStatus::from_wire(status.as_deref());
        let mut messages = Vec::new();

        if let Some(input) = raw_input {
            let (derived, source) =
                derive_tool_name(title.as_deref(), Some(&input), kind.as_deref());
            // A weak kind-derived name must not clobber a previously
            // established strong name.
            let name = match self.tools.get(&tool_call_id) {
                Some(existing) if !source.is_strong() && !is_placeholder_tool_name(&existing.name) => {
                    existing.name.clone()
                }
                _ => derived,
            };
            self.tools.insert(
                tool_call_id.clone(),
                ToolCallRecord {
                    id: tool_call_id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
            );
            messages.push(SessionMessage::ToolCall {
                id: tool_call_id.clone(),
                name,
                input,
                status,
            });
        } else if let Some(record) = self.tools.get(&tool_call_id)
            && matches!(status, ToolCallStatus::Pending | ToolCallStatus::InProgress)
        {
            // Status-only refresh: re-emit with the registered name and
            // input, no registry mutation.
            messages.push(SessionMessage::ToolCall {
                id: record.id.clone(),
                name: record.name.clone(),
                input: record.input.clone(),
                status,
            });
        }

        if let Some(result_status) = status.result_status() {
            if self.tools.contains_key(&tool_call_id) {
                messages.push(SessionMessage::ToolResult {
                    id: tool_call_id,
                    output: raw_output.or(content).unwrap_or(Value::Null),
                    status: result_status,
                });
            } else {
                debug!(
                    tool_call_id = %tool_call_id,
                    "dropping tool result for an id that was never announced"
                );
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tether_protocol::PlanPriority;
    use tether_protocol::PlanStepStatus;
    use tether_protocol::ToolResultStatus;

    fn text_chunk(text: &str) -> SessionUpdate {
        SessionUpdate::AgentMessageChunk {
            content: Some(ContentBlock::Text {
                text: text.to_string(),
                annotations: None,
            }),
        }
    }

    fn tool_call(id: &str, title: Option<&str>, raw_input: Option<Value>) -> SessionUpdate {
        SessionUpdate::ToolCall {
            tool_call_id: id.to_string(),
            title: title.map(str::to_string),
            kind: None,
            raw_input,
            status: Some("pending".to_string()),
        }
    }

    fn status_update(id: &str, status: &str) -> SessionUpdate {
        SessionUpdate::ToolCallUpdate {
            tool_call_id: id.to_string(),
            title: None,
            kind: None,
            raw_input: None,
            raw_output: None,
            status: Some(status.to_string()),
            content: None,
        }
    }

    #[test]
    fn text_chunks_buffer_until_flushed() {
        let mut normalizer = UpdateNormalizer::new();
        assert_eq!(normalizer.normalize(text_chunk("Hello")), vec![]);
        assert_eq!(normalizer.normalize(text_chunk("Hello, world")), vec![]);
        assert_eq!(
            normalizer.flush_text(),
            Some(SessionMessage::Text {
                text: "Hello, world".to_string(),
            })
        );
        // Flushed exactly once; the buffer is empty afterwards.
        assert_eq!(normalizer.flush_text(), None);
    }

    #[test]
    fn text_gated_to_non_assistant_audience_is_dropped() {
        let mut normalizer = UpdateNormalizer::new();
        let update = SessionUpdate::AgentMessageChunk {
            content: Some(ContentBlock::Text {
                text: "internal".to_string(),
                annotations: Some(json!({"audience": ["user"]})),
            }),
        };
        assert_eq!(normalizer.normalize(update), vec![]);
        assert_eq!(normalizer.flush_text(), None);
    }

    #[test]
    fn thought_chunks_are_dropped() {
        let mut normalizer = UpdateNormalizer::new();
        let update = SessionUpdate::AgentThoughtChunk {
            content: Some(ContentBlock::Text {
                text: "thinking".to_string(),
                annotations: None,
            }),
        };
        assert_eq!(normalizer.normalize(update), vec![]);
        assert_eq!(normalizer.flush_text(), None);
    }

    #[test]
    fn tool_call_without_id_is_dropped() {
        let mut normalizer = UpdateNormalizer::new();
        assert_eq!(normalizer.normalize(tool_call("  ", Some("Read"), None)), vec![]);
    }

    #[test]
    fn tool_name_derivation_priority() {
        let mut normalizer = UpdateNormalizer::new();

        let from_title = normalizer.normalize(tool_call(
            "t1",
            Some("Read"),
            Some(json!({"name": "read_file"})),
        ));
        assert_eq!(
            from_title,
            vec![SessionMessage::ToolCall {
                id: "t1".to_string(),
                name: "Read".to_string(),
                input: json!({"name": "read_file"}),
                status: ToolCallStatus::Pending,
            }]
        );

        let from_input_name =
            normalizer.normalize(tool_call("t2", None, Some(json!({"name": "read_file"}))));
        let [SessionMessage::ToolCall { name, .. }] = from_input_name.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "read_file");

        let from_input_tool =
            normalizer.normalize(tool_call("t3", None, Some(json!({"tool": "grep"}))));
        let [SessionMessage::ToolCall { name, .. }] = from_input_tool.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "grep");

        let from_kind = normalizer.normalize(SessionUpdate::ToolCall {
            tool_call_id: "t4".to_string(),
            title: None,
            kind: Some("edit".to_string()),
            raw_input: None,
            status: None,
        });
        let [SessionMessage::ToolCall { name, input, .. }] = from_kind.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "edit");
        assert_eq!(input, &Value::Null);

        let fallback = normalizer.normalize(SessionUpdate::ToolCall {
            tool_call_id: "t5".to_string(),
            title: None,
            kind: Some("Other".to_string()),
            raw_input: None,
            status: None,
        });
        let [SessionMessage::ToolCall { name, .. }] = fallback.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "Tool");
    }

    #[test]
    fn status_only_refresh_keeps_registered_name() {
        let mut normalizer = UpdateNormalizer::new();
        normalizer.normalize(tool_call("tool-1", Some("Read"), Some(json!({"path": "x"}))));

        let refreshed = normalizer.normalize(status_update("tool-1", "in_progress"));
        assert_eq!(
            refreshed,
            vec![SessionMessage::ToolCall {
                id: "tool-1".to_string(),
                name: "Read".to_string(),
                input: json!({"path": "x"}),
                status: ToolCallStatus::InProgress,
            }]
        );
    }

    #[test]
    fn weak_kind_name_does_not_clobber_strong_name() {
        let mut normalizer = UpdateNormalizer::new();
        normalizer.normalize(tool_call("tool-1", Some("Read"), None));

        let updated = normalizer.normalize(SessionUpdate::ToolCallUpdate {
            tool_call_id: "tool-1".to_string(),
            title: None,
            kind: Some("fetch".to_string()),
            raw_input: Some(json!({"url": "https://example.com"})),
            raw_output: None,
            status: Some("in_progress".to_string()),
            content: None,
        });
        let [SessionMessage::ToolCall { name, input, .. }] = updated.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "Read");
        assert_eq!(input, &json!({"url": "https://example.com"}));
    }

    #[test]
    fn strong_name_overwrites_and_placeholder_gets_replaced() {
        let mut normalizer = UpdateNormalizer::new();
        normalizer.normalize(SessionUpdate::ToolCall {
            tool_call_id: "tool-1".to_string(),
            title: None,
            kind: Some("unknown".to_string()),
            raw_input: None,
            status: None,
        });
        assert_eq!(
            normalizer.tool_record("tool-1").map(|r| r.name.clone()),
            Some("Tool".to_string())
        );

        // Placeholder name: even a weak kind derivation may replace it.
        let updated = normalizer.normalize(SessionUpdate::ToolCallUpdate {
            tool_call_id: "tool-1".to_string(),
            title: None,
            kind: Some("fetch".to_string()),
            raw_input: Some(json!({})),
            raw_output: None,
            status: None,
            content: None,
        });
        let [SessionMessage::ToolCall { name, .. }] = updated.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "fetch");

        // Strong title derivation overwrites unconditionally.
        let updated = normalizer.normalize(SessionUpdate::ToolCallUpdate {
            tool_call_id: "tool-1".to_string(),
            title: Some("Fetch URL".to_string()),
            kind: None,
            raw_input: Some(json!({})),
            raw_output: None,
            status: None,
            content: None,
        });
        let [SessionMessage::ToolCall { name, .. }] = updated.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "Fetch URL");
    }

    #[test]
    fn completed_update_emits_call_then_result() {
        let mut normalizer = UpdateNormalizer::new();
        normalizer.normalize(tool_call("tool-1", Some("Read"), None));

        let messages = normalizer.normalize(SessionUpdate::ToolCallUpdate {
            tool_call_id: "tool-1".to_string(),
            title: None,
            kind: None,
            raw_input: Some(json!({"path": "x"})),
            raw_output: Some(json!({"ok": true})),
            status: Some("completed".to_string()),
            content: None,
        });
        assert_eq!(
            messages,
            vec![
                SessionMessage::ToolCall {
                    id: "tool-1".to_string(),
                    name: "Read".to_string(),
                    input: json!({"path": "x"}),
                    status: ToolCallStatus::Completed,
                },
                SessionMessage::ToolResult {
                    id: "tool-1".to_string(),
                    output: json!({"ok": true}),
                    status: ToolResultStatus::Completed,
                },
            ]
        );
    }

    #[test]
    fn result_output_falls_back_to_content() {
        let mut normalizer = UpdateNormalizer::new();
        normalizer.normalize(tool_call("tool-1", Some("Read"), None));

        let messages = normalizer.normalize(SessionUpdate::ToolCallUpdate {
            tool_call_id: "tool-1".to_string(),
            title: None,
            kind: None,
            raw_input: None,
            raw_output: None,
            status: Some("failed".to_string()),
            content: Some(json!("boom")),
        });
        assert_eq!(
            messages,
            vec![SessionMessage::ToolResult {
                id: "tool-1".to_string(),
                output: json!("boom"),
                status: ToolResultStatus::Failed,
            }]
        );
    }

    #[test]
    fn result_for_unannounced_id_is_dropped() {
        let mut normalizer = UpdateNormalizer::new();
        assert_eq!(normalizer.normalize(status_update("ghost", "completed")), vec![]);
    }

    #[test]
    fn plan_entries_are_filtered_individually() {
        let mut normalizer = UpdateNormalizer::new();
        let messages = normalizer.normalize(SessionUpdate::Plan {
            entries: vec![
                json!({"content": "valid", "priority": "high", "status": "pending"}),
                json!({"content": "", "priority": "high", "status": "pending"}),
                json!({"content": "bad status", "priority": "low", "status": "paused"}),
                json!(null),
            ],
        });
        assert_eq!(
            messages,
            vec![SessionMessage::Plan {
                items: vec![PlanItem {
                    content: "valid".to_string(),
                    priority: PlanPriority::High,
                    status: PlanStepStatus::Pending,
                }],
            }]
        );

        let empty = normalizer.normalize(SessionUpdate::Plan {
            entries: vec![json!({"content": " ", "priority": "low", "status": "pending"})],
        });
        assert_eq!(empty, vec![]);
    }

    #[test]
    fn registry_persists_across_flushes() {
        let mut normalizer = UpdateNormalizer::new();
        normalizer.normalize(tool_call("tool-1", Some("Read"), None));
        normalizer.normalize(text_chunk("turn one"));
        let _ = normalizer.flush_text();

        // A later turn can still resolve the id registered earlier.
        let refreshed = normalizer.normalize(status_update("tool-1", "in_progress"));
        let [SessionMessage::ToolCall { name, .. }] = refreshed.as_slice() else {
            panic!("expected one tool_call");
        };
        assert_eq!(name, "Read");
    }
}
