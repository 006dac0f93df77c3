use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::state::AgentStateCell;
use crate::state::CompletedPermissionRequest;
use crate::state::PermissionRequestState;

/// JSON-RPC method name the coordinator answers on.
pub const PERMISSION_METHOD: &str = "permission";

/// Terminal state of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Approved,
    Denied,
    Canceled,
}

/// Resolution details produced by the strategy when a response arrives, or
/// synthesized by bulk cancellation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionCompletion {
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

impl PermissionCompletion {
    pub fn with_status(status: PermissionStatus) -> Self {
        Self {
            status,
            reason: None,
            mode: None,
            decision: None,
            allow_tools: None,
            answers: None,
        }
    }

    pub fn approved() -> Self {
        Self::with_status(PermissionStatus::Approved)
    }

    pub fn denied() -> Self {
        Self::with_status(PermissionStatus::Denied)
    }
}

/// Inbound `permission` RPC payload: the request id plus whatever resolution
/// fields the client chose to send. The extra fields are interpreted by the
/// injected [`PermissionStrategy`], not here.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionResponse {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Error delivered through a pending continuation when its request is
/// canceled rather than resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PermissionRejected {
    pub message: String,
}

pub type PermissionResult = Result<PermissionCompletion, PermissionRejected>;

/// Read-only view of a pending request handed to the strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPermission {
    pub id: String,
    pub tool_name: String,
    pub input: Value,
}

/// Behavior injected at construction. `handle_response` is required; the
/// remaining hooks default to trace logging or nothing.
pub trait PermissionStrategy: Send + Sync {
    /// Convert a raw RPC response into the terminal completion for
    /// `pending`.
    fn handle_response(
        &self,
        response: &PermissionResponse,
        pending: &PendingPermission,
    ) -> PermissionCompletion;

    /// A response arrived for an id with no pending entry. Late and
    /// duplicate responses are expected under upstream retry semantics, so
    /// the default just logs.
    fn on_missing_response(&self, response: &PermissionResponse) {
        debug!(id = %response.id, "permission response without a pending request");
    }

    fn on_request_registered(&self, _id: &str) {}

    fn on_response_received(&self, _id: &str) {}
}

/// Default strategy: a boolean `approved` field decides the status, and the
/// well-known optional fields are passed through verbatim.
#[derive(Debug, Default)]
pub struct DecisionFieldStrategy;

impl PermissionStrategy for DecisionFieldStrategy {
    fn handle_response(
        &self,
        response: &PermissionResponse,
        _pending: &PendingPermission,
    ) -> PermissionCompletion {
        let approved = response
            .fields
            .get("approved")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let string_field = |key: &str| {
            response
                .fields
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        PermissionCompletion {
            status: if approved {
                PermissionStatus::Approved
            } else {
                PermissionStatus::Denied
            },
            reason: string_field("reason"),
            mode: string_field("mode"),
            decision: string_field("decision"),
            allow_tools: response
                .fields
                .get("allowTools")
                .and_then(Value::as_array)
                .map(|tools| {
                    tools
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                }),
            answers: response.fields.get("answers").cloned(),
        }
    }
}

/// Substring rules that let designated low-risk tools bypass interactive
/// approval. Matching is case-insensitive on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApprovalRules {
    /// Matched against the tool name.
    pub name_hints: Vec<String>,
    /// Matched against the tool-call id.
    pub id_hints: Vec<String>,
}

impl Default for AutoApprovalRules {
    fn default() -> Self {
        Self {
            name_hints: vec![
                "change_title".to_string(),
                "memory".to_string(),
                "think".to_string(),
            ],
            id_hints: Vec::new(),
        }
    }
}

impl AutoApprovalRules {
    fn matches(&self, tool_name: &str, tool_call_id: &str) -> bool {
        let name = tool_name.to_lowercase();
        let id = tool_call_id.to_lowercase();
        self.name_hints
            .iter()
            .any(|hint| name.contains(&hint.to_lowercase()))
            || self
                .id_hints
                .iter()
                .any(|hint| id.contains(&hint.to_lowercase()))
    }
}

/// Options for [`PermissionCoordinator::cancel_pending_requests`].
#[derive(Debug, Clone)]
pub struct CancelOptions {
    /// Recorded as the `reason` on every canceled audit entry.
    pub completed_reason: String,
    /// Message carried by the rejection delivered to every continuation.
    pub reject_message: String,
    pub decision: Option<String>,
}

pub type RpcFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
pub type RpcHandler = Arc<dyn Fn(Value) -> RpcFuture + Send + Sync>;

/// Transport-side registry the coordinator installs its RPC handler into.
/// The coordinator never owns transport itself.
pub trait HandlerRegistry {
    fn register_handler(&self, method: &str, handler: RpcHandler);
}

struct PendingEntry {
    tool_name: String,
    input: Value,
    responder: oneshot::Sender<PermissionResult>,
}

/// Owns the lifecycle of tool-approval requests for one session.
///
/// Requests may stay pending indefinitely without blocking update
/// processing; only the tool awaiting approval is gated. Every request ends
/// in exactly one of approved, denied, or canceled, and its projection moves
/// atomically from `requests` to `completed_requests` in the shared
/// [`AgentStateCell`].
pub struct PermissionCoordinator {
    pending: Mutex<HashMap<String, PendingEntry>>,
    state: Arc<AgentStateCell>,
    strategy: Arc<dyn PermissionStrategy>,
    auto_approval: AutoApprovalRules,
}

impl PermissionCoordinator {
    pub fn new(state: Arc<AgentStateCell>, strategy: Arc<dyn PermissionStrategy>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            state,
            strategy,
            auto_approval: AutoApprovalRules::default(),
        }
    }

    pub fn with_auto_approval_rules(mut self, rules: AutoApprovalRules) -> Self {
        self.auto_approval = rules;
        self
    }

    /// Advisory auto-approval check. `Some(Approved)` means the caller may
    /// skip creating a pending request entirely; `None` means fall through
    /// to interactive approval.
    pub fn resolve_auto_approval(
        &self,
        tool_name: &str,
        tool_call_id: &str,
        rule_overrides: Option<&AutoApprovalRules>,
    ) -> Option<PermissionStatus> {
        let rules = rule_overrides.unwrap_or(&self.auto_approval);
        rules
            .matches(tool_name, tool_call_id)
            .then_some(PermissionStatus::Approved)
    }

    /// Register an approval request and project it into shared state. The
    /// returned receiver fires exactly once, with the completion or with the
    /// cancellation rejection.
    pub fn add_pending_request(
        &self,
        id: &str,
        tool_name: &str,
        input: Value,
    ) -> oneshot::Receiver<PermissionResult> {
        let (responder, receiver) = oneshot::channel();
        {
            let mut pending = self.lock_pending();
            pending.insert(
                id.to_string(),
                PendingEntry {
                    tool_name: tool_name.to_string(),
                    input: input.clone(),
                    responder,
                },
            );
        }
        self.state.update(|state| {
            state.requests.insert(
                id.to_string(),
                PermissionRequestState {
                    tool: tool_name.to_string(),
                    arguments: input,
                    created_at: Utc::now(),
                },
            );
        });
        self.strategy.on_request_registered(id);
        receiver
    }

    /// Handle an inbound `permission` RPC response.
    pub fn handle_response(&self, response: PermissionResponse) {
        let entry = self.lock_pending().remove(&response.id);
        let Some(entry) = entry else {
            self.strategy.on_missing_response(&response);
            return;
        };
        self.strategy.on_response_received(&response.id);
        let pending = PendingPermission {
            id: response.id.clone(),
            tool_name: entry.tool_name,
            input: entry.input,
        };
        let completion = self.strategy.handle_response(&response, &pending);
        self.finalize_request(&response.id, &completion);
        // The receiver may have been dropped; resolution is still terminal.
        let _ = entry.responder.send(Ok(completion));
    }

    /// Atomically move a request's projection to `completed_requests`.
    /// No-op when the id was already finalized or never projected, so a
    /// double finalize (e.g. response racing cancellation) is harmless.
    pub fn finalize_request(&self, id: &str, completion: &PermissionCompletion) {
        let completion = completion.clone();
        self.state.update(move |state| {
            let Some(request) = state.requests.remove(id) else {
                return;
            };
            state.completed_requests.insert(
                id.to_string(),
                CompletedPermissionRequest {
                    tool: request.tool,
                    arguments: request.arguments,
                    created_at: request.created_at,
                    completed_at: Utc::now(),
                    status: completion.status,
                    reason: completion.reason,
                    mode: completion.mode,
                    decision: completion.decision,
                    allow_tools: completion.allow_tools,
                    answers: completion.answers,
                },
            );
        });
    }

    /// Reject every pending continuation and mark every drained request's
    /// projection canceled. Only the ids drained from the table here are
    /// swept: a request added while cancellation runs keeps both its fresh
    /// pending entry and its projection.
    pub fn cancel_pending_requests(&self, options: &CancelOptions) {
        let drained: Vec<(String, PendingEntry)> = {
            let mut pending = self.lock_pending();
            pending.drain().collect()
        };
        let mut canceled_ids = Vec::with_capacity(drained.len());
        for (id, entry) in drained {
            let _ = entry.responder.send(Err(PermissionRejected {
                message: options.reject_message.clone(),
            }));
            canceled_ids.push(id);
        }

        let completed_reason = options.completed_reason.clone();
        let decision = options.decision.clone();
        self.state.update(move |state| {
            for id in canceled_ids {
                let Some(request) = state.requests.remove(&id) else {
                    continue;
                };
                state.completed_requests.insert(
                    id,
                    CompletedPermissionRequest {
                        tool: request.tool,
                        arguments: request.arguments,
                        created_at: request.created_at,
                        completed_at: Utc::now(),
                        status: PermissionStatus::Canceled,
                        reason: Some(completed_reason.clone()),
                        mode: None,
                        decision: decision.clone(),
                        allow_tools: None,
                        answers: None,
                    },
                );
            }
        });
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Install the async `permission` handler on the transport's registry.
    pub fn register_rpc_handler(self: &Arc<Self>, registry: &dyn HandlerRegistry) {
        let coordinator = Arc::clone(self);
        registry.register_handler(
            PERMISSION_METHOD,
            Arc::new(move |params: Value| {
                let coordinator = Arc::clone(&coordinator);
                Box::pin(async move {
                    let response: PermissionResponse = serde_json::from_value(params)
                        .map_err(|err| anyhow::anyhow!("malformed permission response: {err}"))?;
                    coordinator.handle_response(response);
                    Ok(json!({}))
                }) as RpcFuture
            }),
        );
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("pending-permission table mutex poisoned; continuing");
                poisoned.into_inner()
            }
        }
    }
}
