use std::path::PathBuf;

use crate::watcher::EVENT_FILE_SUFFIX;

/// Resolved filesystem locations. Pure data, no I/O.
///
/// The events directory is an injected value: callers pass it to the
/// watcher constructor rather than reading a global at use sites.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory the hook script appends per-session event files into.
    /// Example: /tmp/cmux/<tmux-session-name>.jsonl
    pub events_dir: PathBuf,
}

impl Paths {
    /// Default location shared with the hook scripts.
    ///
    /// Always /tmp (not $TMPDIR): the hooks run in the agent's environment
    /// where TMPDIR can differ, and both sides must agree on the path.
    pub fn resolve() -> Self {
        Self {
            events_dir: PathBuf::from("/tmp").join("cmux"),
        }
    }

    pub fn with_events_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            events_dir: dir.into(),
        }
    }

    /// Event file for one tmux session.
    pub fn event_file(&self, session_name: &str) -> PathBuf {
        self.events_dir
            .join(format!("{session_name}{EVENT_FILE_SUFFIX}"))
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve()
    }
}
