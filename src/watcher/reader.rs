use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::WatcherError;
use crate::model::HookEvent;

pub type EventCallback = Arc<dyn Fn(&HookEvent) + Send + Sync>;

/// Incremental tailer for one per-session hook-event JSONL file.
///
/// Tracks a byte offset and only ever consumes complete lines: a write that
/// ends mid-line stays unconsumed until a later poll sees its newline. The
/// tail of the file is read wholesale rather than through a bounded line
/// scanner, so multi-megabyte tool outputs parse like any other line.
///
/// Offset state and callbacks live behind reader-private locks, so pollers
/// of different sessions never contend with each other.
pub struct EventReader {
    path: PathBuf,
    state: Mutex<TailState>,
    callbacks: Mutex<Vec<EventCallback>>,
}

struct TailState {
    offset: u64,
}

impl EventReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(TailState { offset: 0 }),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a callback invoked synchronously for every parsed event, in
    /// registration order. Append-only; safe to call before the watcher
    /// starts polling.
    pub fn on_event(&self, callback: impl Fn(&HookEvent) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Read and parse all complete lines appended since the last poll.
    ///
    /// A missing file is "no data yet" (the hook may not have run), not an
    /// error. Malformed JSON lines are skipped but still consumed, so a
    /// given byte range is parsed exactly once per reader instance.
    pub fn poll(&self) -> Result<Vec<HookEvent>, WatcherError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        // File shrank below our offset: it was truncated or replaced.
        let file_len = file.metadata()?.len();
        if file_len < state.offset {
            debug!(path = %self.path.display(), "event file truncated, re-reading");
            state.offset = 0;
        }

        file.seek(SeekFrom::Start(state.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut events = Vec::new();
        let mut start = 0usize;
        while let Some(pos) = buf[start..].iter().position(|&b| b == b'\n') {
            let line = &buf[start..start + pos];
            // line bytes + the newline itself
            state.offset += pos as u64 + 1;
            start += pos + 1;

            let line = trim_ascii(line);
            if line.is_empty() {
                continue;
            }

            let mut event: HookEvent = match serde_json::from_slice(line) {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping malformed event line");
                    continue;
                }
            };
            event.derive_timestamp();
            for callback in &callbacks {
                callback(&event);
            }
            events.push(event);
        }

        Ok(events)
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
