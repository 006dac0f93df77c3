use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::permissions::PermissionStatus;

/// Projection of a pending approval request into shared session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionRequestState {
    pub tool: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
}

/// Terminal audit record for a finalized approval request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedPermissionRequest {
    pub tool: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: PermissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Value>,
}

/// Approval-request slice of the session's shared state. A request id lives
/// in at most one of the two maps at any time; the move between them happens
/// inside a single [`AgentStateCell::update`] application.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentState {
    pub requests: HashMap<String, PermissionRequestState>,
    pub completed_requests: HashMap<String, CompletedPermissionRequest>,
}

#[derive(Debug, Default)]
struct VersionedState {
    version: u64,
    state: AgentState,
}

/// Owned, versioned state value. All mutation goes through [`update`], which
/// applies a closure to the current value and bumps the version, so readers
/// can cheaply detect whether anything changed between snapshots. There is
/// no other way to touch the state; callers never lock it directly.
///
/// [`update`]: AgentStateCell::update
#[derive(Debug, Default)]
pub struct AgentStateCell {
    inner: Mutex<VersionedState>,
}

impl AgentStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transactional update and return the new version.
    pub fn update<F>(&self, apply: F) -> u64
    where
        F: FnOnce(&mut AgentState),
    {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard.state);
        guard.version += 1;
        guard.version
    }

    pub fn snapshot(&self) -> AgentState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }
}
