//! Parsed export models: [`ParsedExport`] and [`Conversation`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::message::{Message, Metadata, Role};

/// Metadata key holding the number of conversation entries the parser skipped.
pub const SKIPPED_CONVERSATIONS_KEY: &str = "skipped_conversations";

/// Metadata key holding per-role counts of messages the parser dropped.
pub const UNSUPPORTED_ROLES_KEY: &str = "unsupported_roles";

/// One conversation thread from an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Identifier, unique within its export.
    pub id: String,
    /// Conversation title as shown in the source UI.
    pub title: String,
    /// When the conversation was started.
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated.
    pub updated_at: DateTime<Utc>,
    /// Messages in source order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates a conversation. Both timestamps are derived from the messages
    /// (earliest and latest), falling back to the Unix epoch for an empty list.
    pub fn new(id: impl Into<String>, title: impl Into<String>, messages: Vec<Message>) -> Self {
        let created_at = messages
            .iter()
            .map(|m| m.timestamp)
            .min()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let updated_at = messages
            .iter()
            .map(|m| m.timestamp)
            .max()
            .unwrap_or(created_at);
        Self {
            id: id.into(),
            title: title.into(),
            created_at,
            updated_at,
            messages,
        }
    }

    /// Iterates over messages written by the user.
    pub fn user_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::User)
    }

    /// Returns the message with the smallest timestamp (first on ties).
    pub fn earliest_message(&self) -> Option<&Message> {
        self.messages.iter().reduce(|best, m| {
            if m.timestamp < best.timestamp {
                m
            } else {
                best
            }
        })
    }

    /// Timestamp of the most recent message, or `updated_at` for an empty thread.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .iter()
            .map(|m| m.timestamp)
            .max()
            .unwrap_or(self.updated_at)
    }

    /// Content hash used to notice conversations that changed between exports.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        for msg in &self.messages {
            hasher.update([0u8]);
            hasher.update(msg.role.to_string().as_bytes());
            hasher.update([0u8]);
            hasher.update(msg.content.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// The normalized result of parsing one raw export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedExport {
    /// Detected export format generation (e.g. `2024-01-01`).
    pub format_version: String,
    /// Latest update time seen in the export.
    pub export_date: DateTime<Utc>,
    /// Conversations in source order.
    pub conversations: Vec<Conversation>,
    /// Parser bookkeeping (skipped entries, dropped roles, source file).
    #[serde(default)]
    pub metadata: Metadata,
}

impl ParsedExport {
    /// Creates an export; `export_date` is the latest `updated_at`.
    pub fn new(format_version: impl Into<String>, conversations: Vec<Conversation>) -> Self {
        let export_date = conversations
            .iter()
            .map(|c| c.updated_at)
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            format_version: format_version.into(),
            export_date,
            conversations,
            metadata: Metadata::new(),
        }
    }

    /// Number of conversation entries the parser could not decode.
    pub fn skipped_conversations(&self) -> u64 {
        self.metadata
            .get(SKIPPED_CONVERSATIONS_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    /// Total number of messages across all conversations.
    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.messages.len()).sum()
    }
}
