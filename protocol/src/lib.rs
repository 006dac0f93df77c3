//! Wire-facing data model for the agent bridge: the raw session updates
//! consumed from the backend transport and the canonical messages delivered
//! to the session store.

mod content;
mod message;
mod update;

pub use content::ContentBlock;
pub use content::audience_includes_assistant;
pub use message::PlanItem;
pub use message::PlanPriority;
pub use message::PlanStepStatus;
pub use message::SessionMessage;
pub use message::ToolCallStatus;
pub use message::ToolResultStatus;
pub use update::SessionUpdate;
