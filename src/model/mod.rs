mod hook_event;
mod ids;
mod message;
mod session;

pub use hook_event::{HookEvent, HookEventName};
pub use ids::{SessionId, ToolName, ToolUseId};
pub use message::{Message, PermissionRequest, Role, TokenUsage, ToolCall, ToolStatus};
pub use session::{Session, SessionStatus};
