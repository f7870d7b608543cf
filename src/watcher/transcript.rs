use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::WatcherError;
use crate::model::{Message, TokenUsage, ToolCall};

/// Cheap substring gate for progress records. They can be multi-megabyte
/// and carry no message content, so they must be dropped before full JSON
/// parsing, not after.
const PROGRESS_MARKER: &str = r#""type":"progress""#;

/// Incremental tailer for one conversation-transcript JSONL file.
///
/// Same offset discipline as `EventReader`, different schema: `user` and
/// `assistant` records become `Message` values, keyed by identity. The
/// transcript re-emits an in-progress assistant turn many times while the
/// agent streams; a record whose identity is already retained overwrites
/// the retained message in place, keeping its original position, so the
/// final snapshot of each turn wins without duplication.
///
/// Not internally synchronized; owned by the view behind its own lock.
pub struct TranscriptReader {
    path: PathBuf,
    offset: u64,
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct TranscriptRecord {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    message: Value,
}

impl TranscriptReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            messages: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordered snapshot of the reconciled conversation.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Drop all offset/index/message state so the next poll re-reads from
    /// scratch. Used when the transcript path itself changes hands.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.messages.clear();
        self.index.clear();
    }

    /// Consume newly appended complete lines; returns whether the retained
    /// message list changed. A missing file is "no data yet".
    pub fn poll(&mut self) -> Result<bool, WatcherError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let file_len = file.metadata()?.len();
        if file_len < self.offset {
            debug!(path = %self.path.display(), "transcript truncated, re-reading");
            self.reset();
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut changed = false;
        let mut start = 0usize;
        while let Some(pos) = buf[start..].iter().position(|&b| b == b'\n') {
            let line = &buf[start..start + pos];
            self.offset += pos as u64 + 1;
            start += pos + 1;

            let line = match std::str::from_utf8(line) {
                Ok(s) => s.trim(),
                Err(_) => continue,
            };
            if line.is_empty() || line.contains(PROGRESS_MARKER) {
                continue;
            }

            let record: TranscriptRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping malformed transcript line");
                    continue;
                }
            };

            changed |= match record.kind.as_str() {
                "user" => self.apply_user(&record),
                "assistant" => self.apply_assistant(&record),
                _ => false,
            };
        }

        Ok(changed)
    }

    fn apply_assistant(&mut self, record: &TranscriptRecord) -> bool {
        // Streaming snapshots of one turn share the agent message ID; the
        // transcript-local UUID only identifies the line.
        let identity = record
            .message
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(&record.uuid);
        if identity.is_empty() {
            return false;
        }

        let mut message = Message::assistant(identity, parse_timestamp(&record.timestamp));

        if let Some(blocks) = record.message.get("content").and_then(Value::as_array) {
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            message.text.push_str(text);
                        }
                    }
                    Some("tool_use") => {
                        let name = block.get("name").and_then(Value::as_str).unwrap_or("unknown");
                        let id = block.get("id").and_then(Value::as_str).unwrap_or("");
                        let input = block.get("input").cloned().unwrap_or(Value::Null);
                        message
                            .tool_calls
                            .push(ToolCall::new(id, name, tool_input_summary(name, &input)));
                    }
                    _ => {}
                }
            }
        }

        message.complete =
            record.message.get("stop_reason").and_then(Value::as_str) == Some("end_turn");
        message.usage = record
            .message
            .get("usage")
            .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok())
            .filter(|u| !u.is_empty());

        self.upsert(message);
        true
    }

    fn apply_user(&mut self, record: &TranscriptRecord) -> bool {
        if record.uuid.is_empty() {
            return false;
        }

        let mut changed = false;
        let mut text = String::new();
        match record.message.get("content") {
            Some(Value::String(s)) => text.push_str(s),
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(t) = block.get("text").and_then(Value::as_str) {
                                text.push_str(t);
                            }
                        }
                        Some("tool_result") => {
                            changed |= self.attach_tool_result(block);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        // A pure tool-result record carries no conversation text; attaching
        // the result above is all it contributes. Emitting a message for it
        // would duplicate the turn.
        if !text.is_empty() {
            self.upsert(Message::user(
                &record.uuid,
                parse_timestamp(&record.timestamp),
                text,
            ));
            changed = true;
        }
        changed
    }

    /// Route a `tool_result` block to the retained `ToolCall` it answers.
    fn attach_tool_result(&mut self, block: &Value) -> bool {
        let use_id = match block.get("tool_use_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id,
            _ => return false,
        };
        let result = tool_result_text(block);
        let failed = block.get("is_error").and_then(Value::as_bool).unwrap_or(false);

        for message in self.messages.iter_mut().rev() {
            if let Some(call) = message
                .tool_calls
                .iter_mut()
                .find(|c| c.id.as_str() == use_id)
            {
                if failed {
                    call.fail(result);
                } else {
                    call.complete(result);
                }
                return true;
            }
        }
        false
    }

    fn upsert(&mut self, message: Message) {
        match self.index.get(&message.id) {
            Some(&pos) => self.messages[pos] = message,
            None => {
                self.index.insert(message.id.clone(), self.messages.len());
                self.messages.push(message);
            }
        }
    }
}

fn parse_timestamp(ts: &str) -> DateTime<Utc> {
    ts.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
}

fn tool_result_text(block: &Value) -> Option<String> {
    let text = match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(truncate_str(&text, 400))
    }
}

/// One-line human summary of a tool invocation, keyed by tool name: the
/// command for shells, the file basename for file tools, the pattern for
/// searches.
pub fn tool_input_summary(tool_name: &str, input: &Value) -> String {
    let summary = match tool_name {
        "Bash" => input
            .get("command")
            .and_then(Value::as_str)
            .map(first_line)
            .unwrap_or_default(),
        "Read" | "Edit" | "Write" | "NotebookEdit" => input
            .get("file_path")
            .and_then(Value::as_str)
            .map(basename)
            .unwrap_or_default(),
        "Glob" | "Grep" => input
            .get("pattern")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "Task" => input
            .get("description")
            .or_else(|| input.get("prompt"))
            .and_then(Value::as_str)
            .map(first_line)
            .unwrap_or_default(),
        "WebFetch" => input
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "WebSearch" => input
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => input
            .get("command")
            .or_else(|| input.get("file_path"))
            .or_else(|| input.get("pattern"))
            .or_else(|| input.get("query"))
            .or_else(|| input.get("url"))
            .and_then(Value::as_str)
            .map(first_line)
            .unwrap_or_default(),
    };
    truncate_str(&summary, 80)
}

/// Short free-text rendering of a `tool_response` payload, if it has one.
pub fn tool_response_summary(response: &Value) -> Option<String> {
    let text = match response {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("output")
            .or_else(|| map.get("stdout"))
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)?,
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(truncate_str(text, 400))
    }
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or("").to_string()
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Character-safe truncation; never slices inside a multibyte character.
fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect::<String>() + "..."
    }
}
