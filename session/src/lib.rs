//! In-memory coordination for a single agent session: normalizing the raw
//! update stream from the backend subprocess into canonical messages,
//! deciding when a turn is complete, and managing pending tool-approval
//! requests.
//!
//! Each session owns its own [`UpdateNormalizer`], [`Session`] turn driver,
//! and [`PermissionCoordinator`]; there is no process-wide state. The only
//! shared value is [`AgentStateCell`], mutated exclusively through its
//! apply-closure `update` API.

mod normalizer;
mod permissions;
mod state;
mod turn;

pub use normalizer::ToolCallRecord;
pub use normalizer::UpdateNormalizer;
pub use permissions::AutoApprovalRules;
pub use permissions::CancelOptions;
pub use permissions::DecisionFieldStrategy;
pub use permissions::HandlerRegistry;
pub use permissions::PERMISSION_METHOD;
pub use permissions::PendingPermission;
pub use permissions::PermissionCompletion;
pub use permissions::PermissionCoordinator;
pub use permissions::PermissionRejected;
pub use permissions::PermissionResponse;
pub use permissions::PermissionResult;
pub use permissions::PermissionStatus;
pub use permissions::PermissionStrategy;
pub use permissions::RpcFuture;
pub use permissions::RpcHandler;
pub use state::AgentState;
pub use state::AgentStateCell;
pub use state::CompletedPermissionRequest;
pub use state::PermissionRequestState;
pub use turn::Session;
pub use turn::TurnOutcome;
pub use turn::TurnTimingConfig;
pub use turn::TurnTimingProfile;
pub use turn::drive_turn;
