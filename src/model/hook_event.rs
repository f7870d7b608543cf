use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Lifecycle points reported by the instrumentation hook.
///
/// Closed enumeration over the names the hook script emits today. Names we
/// have never seen deserialize to `Unknown` instead of failing the line, so
/// a newer hook script cannot crash the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum HookEventName {
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    PermissionRequest,
    Notification,
    Stop,
    SubagentStop,
    SessionStart,
    SessionEnd,
    Unknown,
}

impl From<String> for HookEventName {
    fn from(name: String) -> Self {
        match name.as_str() {
            "UserPromptSubmit" => Self::UserPromptSubmit,
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            "PermissionRequest" => Self::PermissionRequest,
            "Notification" => Self::Notification,
            "Stop" => Self::Stop,
            "SubagentStop" => Self::SubagentStop,
            "SessionStart" => Self::SessionStart,
            "SessionEnd" => Self::SessionEnd,
            _ => Self::Unknown,
        }
    }
}

/// One record from a per-session hook-event stream.
///
/// Every field except `hook_event_name` is optional on the wire; absent
/// fields deserialize to their zero value. `ts` and `tmux_session` are
/// appended by the producing hook script, not by the agent itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HookEvent {
    pub hook_event_name: HookEventName,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub permission_mode: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_use_id: String,
    #[serde(default)]
    pub tool_response: Value,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub notification_type: String,
    #[serde(default, alias = "permission_suggestions")]
    pub suggestions: Value,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub tmux_session: String,
    /// Parsed form of `ts`, filled in by the reader after deserialization.
    #[serde(skip, default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl HookEvent {
    /// Parse the hook-supplied `ts` string into `timestamp`, falling back to
    /// the current time when absent or malformed.
    pub fn derive_timestamp(&mut self) {
        self.timestamp = self
            .ts
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now());
    }
}
