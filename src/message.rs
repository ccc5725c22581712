//! Normalized chat message type.
//!
//! Every parser converts its native message shape into [`Message`]. A message
//! always has a [`Role`], text content and a timestamp; anything else the
//! source carried (node ids, model slugs, content types) goes into the open
//! [`Metadata`] map.
//!
//! # Examples
//!
//! ```
//! use ctxpack::message::{Message, Role};
//! use chrono::{TimeZone, Utc};
//!
//! let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
//! let msg = Message::user("I'm building Carvis in Rust", ts)
//!     .with_metadata("node_id", "aaa-111");
//!
//! assert_eq!(msg.role, Role::User);
//! assert!(msg.is_user());
//! assert_eq!(msg.metadata["node_id"], "aaa-111");
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open string-keyed metadata map used by messages, exports and packs.
///
/// A `BTreeMap` keeps key order stable so serialized output is byte-identical
/// across runs.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person who owns the export
    User,
    /// The model's reply
    Assistant,
    /// System or custom-instruction message
    System,
}

impl Role {
    /// Parses a source role name. Returns `None` for roles the pipeline does
    /// not model (tools, functions, plugins).
    pub fn from_source(role: &str) -> Option<Self> {
        match role.trim().to_lowercase().as_str() {
            "user" | "human" => Some(Role::User),
            "assistant" | "ai" | "model" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single message inside a [`Conversation`](crate::core::models::Conversation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,

    /// Text content. Multi-part source content is joined with newlines.
    pub content: String,

    /// When the message was written.
    pub timestamp: DateTime<Utc>,

    /// Source-specific extras.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Message {
    /// Creates a message with empty metadata.
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            metadata: Metadata::new(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the user wrote this message.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Number of whitespace-separated words in the content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}
