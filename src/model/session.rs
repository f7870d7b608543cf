use chrono::{DateTime, Utc};
use std::fmt;

use super::ids::SessionId;
use super::message::{Message, PermissionRequest, ToolCall};

/// Status state machine driven by hook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No turn in flight; waiting for the user.
    #[default]
    Idle,
    /// Prompt submitted, agent has not reached a tool yet.
    Thinking,
    /// A tool is executing; `Session::current_tool` is set.
    Tool,
    /// Tool finished, agent still producing its turn.
    Active,
    /// Blocked on a permission decision; `Session::pending_permission` is set.
    NeedsInput,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Thinking => write!(f, "thinking"),
            SessionStatus::Tool => write!(f, "tool"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::NeedsInput => write!(f, "needs input"),
        }
    }
}

/// In-memory projection of one tracked agent process: latest hook-derived
/// status merged with the latest transcript-derived conversation history.
///
/// Derived state only: destroyed with its owning view, never persisted.
#[derive(Debug, Clone)]
pub struct Session {
    /// Owning tmux session name (the event-file stem).
    pub name: String,
    /// Agent session ID, pinned by the first event that carries one. Once
    /// pinned, events with a different non-empty ID are ignored so two agent
    /// processes sharing a pane cannot corrupt each other's state.
    pub id: Option<SessionId>,
    pub cwd: String,
    pub permission_mode: String,
    pub status: SessionStatus,
    /// Valid only while `status == Tool`.
    pub current_tool: Option<ToolCall>,
    /// Valid only while `status == NeedsInput`.
    pub pending_permission: Option<PermissionRequest>,
    pub last_update: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            cwd: String::new(),
            permission_mode: String::new(),
            status: SessionStatus::Idle,
            current_tool: None,
            pending_permission: None,
            last_update: Utc::now(),
            messages: Vec::new(),
        }
    }
}
