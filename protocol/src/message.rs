use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Canonical message emitted to the session store, in the order the raw
/// updates were processed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: Value,
        status: ToolCallStatus,
    },
    ToolResult {
        id: String,
        output: Value,
        status: ToolResultStatus,
    },
    Plan {
        items: Vec<PlanItem>,
    },
    TurnComplete,
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ToolCallStatus {
    /// Normalize a wire status. Anything unrecognized, including an absent
    /// status, maps to `Pending`.
    pub fn from_wire(status: Option<&str>) -> Self {
        match status.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("in_progress") => Self::InProgress,
            Some(s) if s.eq_ignore_ascii_case("inProgress") => Self::InProgress,
            Some(s) if s.eq_ignore_ascii_case("completed") => Self::Completed,
            Some(s) if s.eq_ignore_ascii_case("failed") => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// The terminal result status this call status corresponds to, if any.
    pub fn result_status(self) -> Option<ToolResultStatus> {
        match self {
            Self::Completed => Some(ToolResultStatus::Completed),
            Self::Failed => Some(ToolResultStatus::Failed),
            Self::Pending | Self::InProgress => None,
        }
    }
}

/// Result statuses are a strict subset of call statuses: a `tool_result`
/// is never pending or in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlanItem {
    pub content: String,
    pub priority: PlanPriority,
    pub status: PlanStepStatus,
}

impl PlanItem {
    /// Validate one raw plan entry. Entries that are not objects, have an
    /// empty trimmed `content`, or carry an unknown priority or status are
    /// rejected individually.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let entry = entry.as_object()?;
        let content = entry.get("content")?.as_str()?.trim();
        if content.is_empty() {
            return None;
        }
        let priority = PlanPriority::from_wire(entry.get("priority")?.as_str()?)?;
        let status = PlanStepStatus::from_wire(entry.get("status")?.as_str()?)?;
        Some(Self {
            content: content.to_string(),
            priority,
            status,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPriority {
    High,
    Medium,
    Low,
}

impl PlanPriority {
    fn from_wire(priority: &str) -> Option<Self> {
        match priority {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

impl PlanStepStatus {
    fn from_wire(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}
