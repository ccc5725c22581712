//! Shared ChatGPT export parsing utilities.
//!
//! Raw serde shapes for the export generations ChatGPT has shipped, plus the
//! helpers the parser and the compatibility diagnoser both rely on
//! (timestamps, content flattening, node-tree ordering, version inference).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::core::models::Conversation;
use crate::error::{CtxpackError, Result};
use crate::message::{Message, Role};

/// Title used when a conversation has none.
pub const DEFAULT_TITLE: &str = "Untitled Conversation";

/// Export generations this crate recognizes, newest first.
pub const KNOWN_FORMAT_VERSIONS: &[&str] = &["2024-01-01", "2023-06-01", "2023-04-01"];

/// Version string reported when no signature matches.
pub const UNKNOWN_FORMAT_VERSION: &str = "unknown";

/// One conversation entry as it appears in the export.
///
/// Every field is optional; the fallbacks are resolved in
/// [`convert_conversation`].
#[derive(Debug, Default, Deserialize)]
pub struct RawConversation {
    pub id: Option<Value>,
    pub conversation_id: Option<Value>,
    pub title: Option<Value>,
    pub name: Option<Value>,
    pub create_time: Option<Value>,
    pub created_at: Option<Value>,
    pub timestamp: Option<Value>,
    pub update_time: Option<Value>,
    pub updated_at: Option<Value>,
    /// Node tree used by current exports
    pub mapping: Option<Map<String, Value>>,
    /// Flat message list used by older exports
    pub messages: Option<Vec<Value>>,
}

/// A node of the `mapping` tree.
#[derive(Debug, Default, Deserialize)]
pub struct MappingNode {
    pub parent: Option<String>,
    pub children: Option<Vec<String>>,
    pub message: Option<RawNodeMessage>,
}

/// The message carried by a mapping node.
#[derive(Debug, Deserialize)]
pub struct RawNodeMessage {
    pub author: Option<RawAuthor>,
    pub content: Option<Value>,
    pub create_time: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawAuthor {
    pub role: Option<String>,
}

/// A message from an older flat `messages` list.
#[derive(Debug, Deserialize)]
pub struct RawListMessage {
    pub role: Option<String>,
    pub sender: Option<String>,
    pub content: Option<Value>,
    pub text: Option<Value>,
    pub timestamp: Option<Value>,
    pub create_time: Option<Value>,
    pub created_at: Option<Value>,
}

/// Counters collected while converting entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseStats {
    /// Entries that were not objects or had no decodable message.
    pub skipped_conversations: u64,
    /// Dropped messages per source role.
    pub unsupported_roles: BTreeMap<String, u64>,
}

/// Parses the timestamp representations found in exports.
///
/// Accepts unix seconds (integer or fractional, as numbers or strings),
/// RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%dT%H:%M:%S` and `%Y-%m-%d`.
///
/// ```
/// use ctxpack::parsing::chatgpt::parse_timestamp;
/// use serde_json::json;
///
/// let ts = parse_timestamp(&json!(1705314600)).unwrap();
/// assert_eq!(ts.timestamp(), 1705314600);
/// assert!(parse_timestamp(&json!("2024-01-15T10:30:00Z")).is_some());
/// assert!(parse_timestamp(&json!("soon")).is_none());
/// ```
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_unix_seconds),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<f64>() {
        return from_unix_seconds(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Flattens a message `content` value into text.
///
/// Handles `{"parts": [...]}` objects, plain strings, arrays of strings and
/// objects with a `text` field. Parts are joined with newlines.
pub fn extract_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(extract_content)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(obj) => {
            if let Some(parts) = obj.get("parts") {
                extract_content(parts)
            } else if let Some(text) = obj.get("text") {
                extract_content(text)
            } else {
                String::new()
            }
        }
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Infers the export generation from a textual sample.
pub fn infer_format_version(sample: &str) -> &'static str {
    if sample.contains("\"mapping\"") {
        "2024-01-01"
    } else if sample.contains("\"create_time\"") && sample.contains("\"update_time\"") {
        "2023-06-01"
    } else if sample.contains("\"timestamp\"") {
        "2023-04-01"
    } else {
        UNKNOWN_FORMAT_VERSION
    }
}

/// Returns `true` for archive entries holding conversations.
pub fn is_conversations_entry(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name).to_lowercase();
    base.starts_with("conversations") && base.ends_with(".json")
}

/// Splits a decoded document into conversation entries.
///
/// # Errors
///
/// Returns [`CtxpackError::UnsupportedFormat`] when the document is neither an
/// array, an object with a `conversations` array, nor a single conversation.
pub fn conversation_values(root: Value) -> Result<Vec<Value>> {
    match root {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("conversations") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(CtxpackError::unsupported_format(
                "ChatGPT",
                "`conversations` is not a list",
            )),
            None if obj.contains_key("mapping") || obj.contains_key("messages") => {
                Ok(vec![Value::Object(obj)])
            }
            None => Err(CtxpackError::unsupported_format(
                "ChatGPT",
                "expected a list of conversations or a conversation object",
            )),
        },
        other => Err(CtxpackError::unsupported_format(
            "ChatGPT",
            format!("top-level value is {}", json_kind(&other)),
        )),
    }
}

/// Human name of a JSON value's type.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn first_string(values: &[&Option<Value>]) -> Option<String> {
    values.iter().find_map(|v| match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_timestamp(values: &[&Option<Value>]) -> Option<DateTime<Utc>> {
    values
        .iter()
        .find_map(|v| Option::as_ref(*v).and_then(parse_timestamp))
}

fn count_role(stats: &mut ParseStats, role: &str) {
    *stats.unsupported_roles.entry(role.to_string()).or_insert(0) += 1;
}

/// Mapping nodes in conversation order.
///
/// Nodes reachable from a root (no parent, or a parent missing from the
/// mapping) are visited depth-first through `children` in listed order.
/// Nodes left over (cycles) follow, ordered by timestamp then key.
pub fn ordered_nodes(mapping: &Map<String, Value>) -> Vec<(String, MappingNode)> {
    let mut nodes: BTreeMap<String, MappingNode> = BTreeMap::new();
    for (key, value) in mapping {
        if let Ok(node) = MappingNode::deserialize(value) {
            nodes.insert(key.clone(), node);
        }
    }

    let roots: Vec<String> = nodes
        .iter()
        .filter(|(_, node)| {
            node.parent
                .as_ref()
                .is_none_or(|parent| !nodes.contains_key(parent))
        })
        .map(|(key, _)| key.clone())
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = BTreeSet::new();
    for root in roots {
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let Some(node) = nodes.get(&key) else {
                continue;
            };
            if let Some(children) = &node.children {
                stack.extend(children.iter().rev().cloned());
            }
            order.push(key);
        }
    }

    let mut rest: Vec<(Option<DateTime<Utc>>, String)> = nodes
        .iter()
        .filter(|(key, _)| !visited.contains(*key))
        .map(|(key, node)| {
            let ts = node
                .message
                .as_ref()
                .and_then(|m| m.create_time.as_ref())
                .and_then(parse_timestamp);
            (ts, key.clone())
        })
        .collect();
    rest.sort();
    order.extend(rest.into_iter().map(|(_, key)| key));

    order
        .into_iter()
        .filter_map(|key| nodes.remove(&key).map(|node| (key, node)))
        .collect()
}

fn mapping_messages(
    mapping: &Map<String, Value>,
    fallback: DateTime<Utc>,
    stats: &mut ParseStats,
) -> Vec<Message> {
    let mut messages = Vec::new();
    for (_, node) in ordered_nodes(mapping) {
        let Some(raw) = node.message else { continue };
        let content = raw.content.as_ref().map(extract_content).unwrap_or_default();
        if content.trim().is_empty() {
            continue;
        }
        let source_role = raw
            .author
            .and_then(|a| a.role)
            .unwrap_or_else(|| "unknown".to_string());
        let Some(role) = Role::from_source(&source_role) else {
            count_role(stats, &source_role);
            continue;
        };
        let ts = raw
            .create_time
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback);
        messages.push(Message::new(role, content, ts));
    }
    messages
}

fn list_messages(items: &[Value], fallback: DateTime<Utc>, stats: &mut ParseStats) -> Vec<Message> {
    let mut messages = Vec::new();
    for item in items {
        let Ok(raw) = RawListMessage::deserialize(item) else {
            continue;
        };
        let content = raw
            .content
            .as_ref()
            .or(raw.text.as_ref())
            .map(extract_content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            continue;
        }
        let source_role = raw
            .role
            .or(raw.sender)
            .unwrap_or_else(|| "unknown".to_string());
        let Some(role) = Role::from_source(&source_role) else {
            count_role(stats, &source_role);
            continue;
        };
        let ts = first_timestamp(&[&raw.timestamp, &raw.create_time, &raw.created_at])
            .unwrap_or(fallback);
        messages.push(Message::new(role, content, ts));
    }
    messages
}

/// Deterministic id for a conversation that has none: `conv-` plus the first
/// 16 hex digits of sha256(title, newline, earliest message content).
pub fn synthetic_id(title: &str, earliest_content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(earliest_content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("conv-{}", &digest[..16])
}

/// Converts one raw entry; `None` means the entry is skipped.
pub fn convert_conversation(value: &Value, stats: &mut ParseStats) -> Option<Conversation> {
    let Ok(raw) = RawConversation::deserialize(value) else {
        stats.skipped_conversations += 1;
        return None;
    };

    let title = first_string(&[&raw.title, &raw.name]).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let created = first_timestamp(&[&raw.create_time, &raw.created_at, &raw.timestamp]);
    let updated = first_timestamp(&[&raw.update_time, &raw.updated_at]);
    let fallback = created.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let messages = match (&raw.mapping, &raw.messages) {
        (Some(mapping), _) => mapping_messages(mapping, fallback, stats),
        (None, Some(items)) => list_messages(items, fallback, stats),
        (None, None) => Vec::new(),
    };
    if messages.is_empty() {
        stats.skipped_conversations += 1;
        return None;
    }

    let mut conversation = Conversation::new(String::new(), title, messages);
    conversation.id = match first_string(&[&raw.id, &raw.conversation_id]) {
        Some(id) => id,
        None => {
            let earliest = conversation
                .earliest_message()
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            synthetic_id(&conversation.title, earliest)
        }
    };
    if let Some(created) = created {
        conversation.created_at = created;
    }
    if let Some(updated) = updated {
        conversation.updated_at = updated;
    }
    Some(conversation)
}

/// Makes ids unique by appending `-2`, `-3`, … to repeats, in source order.
pub fn disambiguate_ids(conversations: &mut [Conversation]) {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut repeats: BTreeMap<String, usize> = BTreeMap::new();
    for conversation in conversations.iter_mut() {
        if used.insert(conversation.id.clone()) {
            continue;
        }
        let base = conversation.id.clone();
        let counter = repeats.entry(base.clone()).or_insert(1);
        let id = loop {
            *counter += 1;
            let candidate = format!("{base}-{counter}");
            if !used.contains(&candidate) {
                break candidate;
            }
        };
        used.insert(id.clone());
        conversation.id = id;
    }
}
