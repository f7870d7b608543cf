use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard};

use tracing::debug;

use crate::error::WatcherError;
use crate::model::{
    HookEvent, HookEventName, Message, PermissionRequest, Session, SessionId, SessionStatus,
    ToolCall,
};
use crate::watcher::{tool_input_summary, tool_response_summary, TranscriptReader};

/// State machine over one tracked tmux session.
///
/// Hook events drive status and the ephemeral fields; the transcript drives
/// conversation history. The two streams carry no ordering guarantee
/// relative to each other, so every transition must be correct whichever
/// side is observed first.
///
/// Shared between the watcher's event thread, a timer-driven transcript
/// poller, and the render loop: the session state sits behind a `RwLock`
/// (renderers read-lock), the transcript reader behind its own mutex so
/// polling I/O never blocks renders, and the dirty flag is atomic. No lock
/// is ever taken while another is held.
pub struct SessionView {
    session: RwLock<Session>,
    transcript: Mutex<Option<TranscriptReader>>,
    cwd_filter: Mutex<Option<String>>,
    dirty: AtomicBool,
}

impl SessionView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            session: RwLock::new(Session::new(name)),
            transcript: Mutex::new(None),
            cwd_filter: Mutex::new(None),
            dirty: AtomicBool::new(false),
        }
    }

    /// Only ingest events whose working directory matches `path`.
    /// Events without a cwd still pass; they carry no evidence either way.
    pub fn set_cwd_filter(&self, path: impl Into<String>) {
        *self
            .cwd_filter
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.into());
    }

    /// Read-locked snapshot for renderers.
    pub fn session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Path of the transcript currently being tracked, if any.
    pub fn transcript_path(&self) -> Option<PathBuf> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.path().to_path_buf())
    }

    /// Apply one hook event to the state machine.
    ///
    /// Rejected (silently, with no field mutation) when the cwd filter
    /// mismatches or when the session is pinned to a different non-empty
    /// ID; two agent processes sharing a tmux pane must not corrupt each
    /// other. Unknown event names are accepted as a no-op transition.
    pub fn update_from_hook_event(&self, event: &HookEvent) {
        {
            let filter = self
                .cwd_filter
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(ref want) = *filter {
                if !event.cwd.is_empty() && event.cwd != *want {
                    return;
                }
            }
        }

        {
            let mut session = self
                .session
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(ref pinned) = session.id {
                if !event.session_id.is_empty() && event.session_id != pinned.as_str() {
                    debug!(
                        session = %session.name,
                        pinned = %pinned,
                        got = %event.session_id,
                        "dropping event from foreign agent session"
                    );
                    return;
                }
            }

            self.apply_transition(&mut session, event);

            if session.id.is_none() && !event.session_id.is_empty() {
                session.id = Some(SessionId::new(event.session_id.clone()));
            }
            if !event.cwd.is_empty() {
                session.cwd = event.cwd.clone();
            }
            if !event.permission_mode.is_empty() {
                session.permission_mode = event.permission_mode.clone();
            }
            session.last_update = event.timestamp;
        }

        // Transcript swap happens outside the session lock; the reader has
        // its own mutex and a new path implies a fresh offset/index.
        if !event.transcript_path.is_empty() {
            let mut transcript = self
                .transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let stale = transcript
                .as_ref()
                .map_or(true, |r| r.path() != std::path::Path::new(&event.transcript_path));
            if stale {
                *transcript = Some(TranscriptReader::new(event.transcript_path.clone()));
            }
        }

        self.dirty.store(true, Ordering::SeqCst);
    }

    fn apply_transition(&self, session: &mut Session, event: &HookEvent) {
        match event.hook_event_name {
            HookEventName::UserPromptSubmit => {
                session.status = SessionStatus::Thinking;
                // Seed the prompt ahead of the transcript for responsiveness.
                // The next transcript poll replaces the whole list, which may
                // briefly double-show the prompt once the transcript's own
                // record lands; that window is accepted, not a bug to patch
                // here.
                session.messages.push(Message::user(
                    local_identity("prompt", event),
                    event.timestamp,
                    event.prompt.clone(),
                ));
            }
            HookEventName::PreToolUse => {
                session.status = SessionStatus::Tool;
                let call = ToolCall::new(
                    event.tool_use_id.clone(),
                    event.tool_name.clone(),
                    tool_input_summary(&event.tool_name, &event.tool_input),
                )
                .running();
                seed_tool_call(session, event, call.clone());
                session.current_tool = Some(call);
            }
            HookEventName::PostToolUse => {
                session.status = SessionStatus::Active;
                let matches_current = session
                    .current_tool
                    .as_ref()
                    .is_some_and(|c| c.id.as_str() == event.tool_use_id);
                if matches_current {
                    let result = tool_response_summary(&event.tool_response);
                    complete_tool_call(session, &event.tool_use_id, result);
                }
                session.current_tool = None;
            }
            HookEventName::PermissionRequest => {
                session.status = SessionStatus::NeedsInput;
                // A permission_prompt notification may have landed first;
                // keep its message.
                let message = session
                    .pending_permission
                    .take()
                    .and_then(|p| p.message);
                session.pending_permission = Some(PermissionRequest {
                    tool_name: event.tool_name.clone().into(),
                    tool_input: event.tool_input.clone(),
                    message,
                    suggestions: (!event.suggestions.is_null())
                        .then(|| event.suggestions.clone()),
                });
            }
            HookEventName::Notification => {
                if event.notification_type == "permission_prompt" {
                    session.status = SessionStatus::NeedsInput;
                    match session.pending_permission.as_mut() {
                        Some(pending) => pending.message = Some(event.message.clone()),
                        None => {
                            session.pending_permission =
                                Some(PermissionRequest::message_only(event.message.clone()));
                        }
                    }
                }
            }
            HookEventName::Stop | HookEventName::SubagentStop => {
                session.status = SessionStatus::Idle;
                session.current_tool = None;
                session.pending_permission = None;
            }
            HookEventName::SessionStart
            | HookEventName::SessionEnd
            | HookEventName::Unknown => {}
        }
    }

    /// Poll the active transcript and, on change, replace the message list
    /// wholesale. The transcript is the single source of truth for history;
    /// seeded entries only bridge its latency.
    pub fn poll_transcript(&self) -> Result<(), WatcherError> {
        let messages = {
            let mut transcript = self
                .transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(reader) = transcript.as_mut() else {
                return Ok(());
            };
            if !reader.poll()? {
                return Ok(());
            }
            reader.messages()
        };

        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .messages = messages;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Identity for a seeded message. Never collides with transcript identities
/// (UUIDs / agent message IDs), so transcript reconciliation simply drops it
/// on the next wholesale replace.
fn local_identity(kind: &str, event: &HookEvent) -> String {
    format!("local-{kind}-{}", event.timestamp.timestamp_micros())
}

/// Mirror a hook-announced tool call into the seeded history so renderers
/// see it (and its completion) before the transcript catches up.
fn seed_tool_call(session: &mut Session, event: &HookEvent, call: ToolCall) {
    if let Some(last) = session
        .messages
        .last_mut()
        .filter(|m| m.role == crate::model::Role::Assistant && !m.complete)
    {
        last.tool_calls.push(call);
    } else {
        let mut message = Message::assistant(local_identity("turn", event), event.timestamp);
        message.tool_calls.push(call);
        session.messages.push(message);
    }
}

fn complete_tool_call(session: &mut Session, use_id: &str, result: Option<String>) {
    for message in session.messages.iter_mut().rev() {
        if let Some(call) = message
            .tool_calls
            .iter_mut()
            .find(|c| c.id.as_str() == use_id)
        {
            call.complete(result);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HookEventName, ToolStatus};
    use chrono::Utc;
    use serde_json::json;

    fn event(name: HookEventName) -> HookEvent {
        let mut e: HookEvent =
            serde_json::from_str(r#"{"hook_event_name":"Stop"}"#).unwrap();
        e.hook_event_name = name;
        e.timestamp = Utc::now();
        e
    }

    #[test]
    fn prompt_seeds_user_message_and_thinks() {
        let view = SessionView::new("work");
        let mut e = event(HookEventName::UserPromptSubmit);
        e.prompt = "fix the tests".into();

        view.update_from_hook_event(&e);

        let session = view.session();
        assert_eq!(session.status, SessionStatus::Thinking);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].text, "fix the tests");
    }

    #[test]
    fn permission_request_then_notification_merges() {
        let view = SessionView::new("work");
        let mut req = event(HookEventName::PermissionRequest);
        req.tool_name = "Bash".into();
        req.tool_input = json!({"command": "rm -rf build"});
        view.update_from_hook_event(&req);

        let mut note = event(HookEventName::Notification);
        note.notification_type = "permission_prompt".into();
        note.message = "Claude needs permission to use Bash".into();
        view.update_from_hook_event(&note);

        let session = view.session();
        assert_eq!(session.status, SessionStatus::NeedsInput);
        let pending = session.pending_permission.as_ref().unwrap();
        assert_eq!(pending.tool_name.as_str(), "Bash");
        assert_eq!(
            pending.message.as_deref(),
            Some("Claude needs permission to use Bash")
        );
    }

    #[test]
    fn notification_before_request_keeps_message() {
        let view = SessionView::new("work");
        let mut note = event(HookEventName::Notification);
        note.notification_type = "permission_prompt".into();
        note.message = "Allow Bash?".into();
        view.update_from_hook_event(&note);

        // Placeholder with only the message.
        assert!(view.session().pending_permission.as_ref().unwrap().tool_name.is_empty());

        let mut req = event(HookEventName::PermissionRequest);
        req.tool_name = "Bash".into();
        view.update_from_hook_event(&req);

        let session = view.session();
        let pending = session.pending_permission.as_ref().unwrap();
        assert_eq!(pending.tool_name.as_str(), "Bash");
        assert_eq!(pending.message.as_deref(), Some("Allow Bash?"));
    }

    #[test]
    fn non_permission_notification_is_status_neutral() {
        let view = SessionView::new("work");
        let mut note = event(HookEventName::Notification);
        note.notification_type = "info".into();
        note.message = "compacting".into();
        view.update_from_hook_event(&note);

        let session = view.session();
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(session.pending_permission.is_none());
    }

    #[test]
    fn unknown_event_refreshes_but_does_not_transition() {
        let view = SessionView::new("work");
        let mut e = event(HookEventName::Unknown);
        e.cwd = "/repo".into();
        e.session_id = "s1".into();
        view.update_from_hook_event(&e);

        let session = view.session();
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.cwd, "/repo");
        assert_eq!(session.id.as_ref().unwrap().as_str(), "s1");
        assert!(view.is_dirty());
    }

    #[test]
    fn mismatched_post_tool_use_does_not_complete_history() {
        let view = SessionView::new("work");
        let mut pre = event(HookEventName::PreToolUse);
        pre.tool_name = "Bash".into();
        pre.tool_use_id = "t1".into();
        view.update_from_hook_event(&pre);

        let mut post = event(HookEventName::PostToolUse);
        post.tool_use_id = "t-other".into();
        view.update_from_hook_event(&post);

        let session = view.session();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.current_tool.is_none());
        assert_eq!(
            session.messages[0].tool_calls[0].status,
            ToolStatus::Running
        );
    }

    #[test]
    fn cwd_filter_rejects_mismatched_events() {
        let view = SessionView::new("work");
        view.set_cwd_filter("/repo/a");

        let mut e = event(HookEventName::UserPromptSubmit);
        e.cwd = "/repo/b".into();
        view.update_from_hook_event(&e);
        assert_eq!(view.session().status, SessionStatus::Idle);
        assert!(!view.is_dirty());

        e.cwd = "/repo/a".into();
        view.update_from_hook_event(&e);
        assert_eq!(view.session().status, SessionStatus::Thinking);
    }

    #[test]
    fn transcript_swap_on_new_path() {
        let view = SessionView::new("work");
        assert!(view.transcript_path().is_none());

        let mut e = event(HookEventName::SessionStart);
        e.transcript_path = "/tmp/a.jsonl".into();
        view.update_from_hook_event(&e);
        assert_eq!(view.transcript_path().unwrap(), PathBuf::from("/tmp/a.jsonl"));

        // Same path: reader kept (offset preserved).
        view.update_from_hook_event(&e);
        assert_eq!(view.transcript_path().unwrap(), PathBuf::from("/tmp/a.jsonl"));

        e.transcript_path = "/tmp/b.jsonl".into();
        view.update_from_hook_event(&e);
        assert_eq!(view.transcript_path().unwrap(), PathBuf::from("/tmp/b.jsonl"));
    }
}
