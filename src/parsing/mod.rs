//! Shared parsing utilities.
//!
//! Raw export shapes and helpers used by both the parsers and the
//! compatibility diagnoser.

pub mod chatgpt;

pub use chatgpt::{
    ParseStats, RawConversation, conversation_values, convert_conversation, disambiguate_ids,
    extract_content, infer_format_version, parse_timestamp,
};
