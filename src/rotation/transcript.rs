//! Reading the tracked context's line-delimited JSON transcript.
//!
//! Records are accepted either bare (`{"role": ..., "content": ...}`) or
//! wrapped (`{"type": "message", "message": {...}}`). Content may be a string
//! or a list of blocks; tool calls and their results are matched by id.

use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read from the end of the transcript when scanning for active work.
pub const ACTIVE_WORK_SCAN_BYTES: u64 = 256 * 1024;

/// Who produced a transcript record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
    Other(String),
}

impl Role {
    fn parse(s: &str) -> Self {
        match s {
            "user" | "human" => Role::User,
            "assistant" | "model" => Role::Assistant,
            "tool" | "toolResult" | "tool_result" => Role::Tool,
            "system" => Role::System,
            other => Role::Other(other.to_string()),
        }
    }
}

/// The parts of a record the rotation core cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub role: Role,
    /// Concatenated text blocks.
    pub text: String,
    /// Ids of tool calls requested by this record.
    pub tool_calls: Vec<String>,
    /// Ids of tool calls this record answers.
    pub tool_results: Vec<String>,
}

/// A user turn and the assistant reply that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePair {
    pub user: String,
    pub assistant: String,
}

impl TranscriptRecord {
    /// Parse one transcript line. Returns `None` for blank lines, invalid JSON
    /// and records without a role.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(line).ok()?;
        let msg = match value.get("message") {
            Some(inner) if inner.is_object() => inner,
            _ => &value,
        };
        let role = Role::parse(msg.get("role")?.as_str()?);

        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();

        match msg.get("content") {
            Some(Value::String(s)) => text_parts.push(s),
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
                    match kind {
                        "text" => {
                            if let Some(t) = block.get("text").and_then(Value::as_str) {
                                text_parts.push(t);
                            }
                        }
                        "tool_use" | "toolCall" | "tool_call" => {
                            if let Some(id) = block.get("id").and_then(Value::as_str) {
                                tool_calls.push(id.to_string());
                            }
                        }
                        "tool_result" | "toolResult" => {
                            let id = block
                                .get("tool_use_id")
                                .or_else(|| block.get("toolCallId"))
                                .and_then(Value::as_str);
                            if let Some(id) = id {
                                tool_results.push(id.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        // OpenAI-style call list on the message itself.
        if let Some(Value::Array(calls)) = msg.get("tool_calls") {
            for call in calls {
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    tool_calls.push(id.to_string());
                }
            }
        }

        // Result records that carry the call id at message level.
        for key in ["toolCallId", "tool_call_id"] {
            if let Some(id) = msg.get(key).and_then(Value::as_str) {
                tool_results.push(id.to_string());
            }
        }

        Some(Self {
            role,
            text: text_parts.join("\n").trim().to_string(),
            tool_calls,
            tool_results,
        })
    }
}

/// Whether a non-blank line parses as a JSON value.
pub fn is_well_formed(line: &str) -> bool {
    serde_json::from_str::<Value>(line.trim()).is_ok()
}

/// Extract up to `max_pairs` exchanges from the end of the transcript.
///
/// Walks backward holding the latest unpaired assistant text; the next user
/// text encountered pairs with it. Pairs are returned oldest first.
pub fn extract_exchange_pairs<'a, I>(lines: I, max_pairs: usize) -> Vec<ExchangePair>
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut pairs = Vec::new();
    if max_pairs == 0 {
        return pairs;
    }

    let mut pending_assistant: Option<String> = None;
    for line in lines.into_iter().rev() {
        let Some(record) = TranscriptRecord::parse(line) else {
            continue;
        };
        if record.text.is_empty() {
            continue;
        }
        match record.role {
            Role::Assistant => {
                if pending_assistant.is_none() {
                    pending_assistant = Some(record.text);
                }
            }
            Role::User => {
                if let Some(assistant) = pending_assistant.take() {
                    pairs.push(ExchangePair {
                        user: record.text,
                        assistant,
                    });
                    if pairs.len() >= max_pairs {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    pairs.reverse();
    pairs
}

/// Tool call ids in `lines` that have no later result record.
pub fn outstanding_tool_calls<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut open: Vec<String> = Vec::new();
    for line in lines {
        let Some(record) = TranscriptRecord::parse(line) else {
            continue;
        };
        for id in record.tool_results {
            open.retain(|pending| pending != &id);
        }
        open.extend(record.tool_calls);
    }
    open
}

/// Read all of `path` as text, replacing invalid UTF-8 sequences.
pub fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read the last `max_bytes` of `path` as whole lines.
///
/// The first line is dropped when the read started mid-file, since it is
/// almost certainly partial. A missing file yields no lines.
pub fn read_tail_lines(path: &Path, max_bytes: u64) -> std::io::Result<Vec<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    let start = len.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    if start > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    Ok(lines)
}
