use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use super::ids::{ToolName, ToolUseId};

/// One conversation turn, reconciled from the transcript stream.
///
/// Identity (`id`) is the transcript-local UUID for user turns and the
/// agent-assigned message ID (falling back to the UUID) for assistant
/// turns. The transcript re-emits in-progress assistant turns; a later
/// record with the same identity replaces the retained one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub complete: bool,
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn user(id: impl Into<String>, timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            timestamp,
            text: text.into(),
            tool_calls: Vec::new(),
            complete: true,
            usage: None,
        }
    }

    pub fn assistant(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            timestamp,
            text: String::new(),
            tool_calls: Vec::new(),
            complete: false,
            usage: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One tool invocation, keyed by the agent-provided use-id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: ToolUseId,
    pub name: ToolName,
    /// One-line human summary derived from the tool input (command preview,
    /// file basename, search pattern).
    pub summary: String,
    pub status: ToolStatus,
    pub result: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<ToolUseId>, name: impl Into<ToolName>, summary: String) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            summary,
            status: ToolStatus::Pending,
            result: None,
        }
    }

    pub fn running(mut self) -> Self {
        self.status = ToolStatus::Running;
        self
    }

    pub fn complete(&mut self, result: Option<String>) {
        self.status = ToolStatus::Complete;
        self.result = result;
    }

    pub fn fail(&mut self, result: Option<String>) {
        self.status = ToolStatus::Failed;
        self.result = result;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Pending => write!(f, "pending"),
            ToolStatus::Running => write!(f, "running"),
            ToolStatus::Complete => write!(f, "complete"),
            ToolStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Token counters from an assistant record's `usage` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_creation_input_tokens == 0
            && self.cache_read_input_tokens == 0
    }

    /// Approximate context-window occupancy for the turn.
    pub fn context_window(&self) -> u64 {
        self.input_tokens + self.cache_creation_input_tokens + self.cache_read_input_tokens
    }
}

/// Ephemeral permission prompt, populated while a session needs input.
///
/// `message` may arrive separately (via a Notification event) from the
/// tool details, in either order.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRequest {
    pub tool_name: ToolName,
    pub tool_input: Value,
    pub message: Option<String>,
    pub suggestions: Option<Value>,
}

impl PermissionRequest {
    /// Placeholder carrying only the human message, for when the
    /// notification outruns the PermissionRequest event.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            tool_name: ToolName::new(""),
            tool_input: Value::Null,
            message: Some(message.into()),
            suggestions: None,
        }
    }
}
