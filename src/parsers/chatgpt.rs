//! ChatGPT export parser.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::models::{ParsedExport, SKIPPED_CONVERSATIONS_KEY, UNSUPPORTED_ROLES_KEY};
use crate::error::{CtxpackError, ParseErrorKind, Result};
use crate::parser::{Parser, SourcePlatform};
use crate::parsing::chatgpt::{
    ParseStats, conversation_values, convert_conversation, disambiguate_ids, infer_format_version,
};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Parser for ChatGPT data exports.
///
/// Accepts any of the shapes ChatGPT has shipped:
/// ```json
/// [
///   {
///     "id": "…",
///     "title": "Rust help",
///     "create_time": 1705314600.1,
///     "update_time": 1705318200.4,
///     "mapping": {
///       "node-id": {
///         "parent": null,
///         "children": ["…"],
///         "message": {"author": {"role": "user"}, "content": {"parts": ["…"]}}
///       }
///     }
///   }
/// ]
/// ```
/// as well as `{"conversations": [...]}`, a single conversation object, older
/// flat `messages` lists, and the ZIP archive wrapping `conversations.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatGptParser;

impl ChatGptParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_document(&self, content: &str) -> Result<ParsedExport> {
        let format_version = infer_format_version(content);
        let root: Value = serde_json::from_str(content)
            .map_err(|e| CtxpackError::chatgpt_parse(ParseErrorKind::Json(e), None))?;
        let entries = conversation_values(root)?;
        let total = entries.len();

        let mut stats = ParseStats::default();
        let mut conversations: Vec<_> = entries
            .iter()
            .filter_map(|entry| convert_conversation(entry, &mut stats))
            .collect();

        if conversations.is_empty() {
            return Err(CtxpackError::chatgpt_parse(
                ParseErrorKind::Other(format!(
                    "no conversation could be recovered from {total} entries"
                )),
                None,
            ));
        }
        disambiguate_ids(&mut conversations);

        if stats.skipped_conversations > 0 {
            warn!(
                skipped = stats.skipped_conversations,
                total, "skipped malformed conversations"
            );
        }
        if !stats.unsupported_roles.is_empty() {
            debug!(roles = ?stats.unsupported_roles, "dropped messages with unsupported roles");
        }

        let mut export = ParsedExport::new(format_version, conversations);
        export.metadata.insert(
            SKIPPED_CONVERSATIONS_KEY.to_string(),
            stats.skipped_conversations.into(),
        );
        if !stats.unsupported_roles.is_empty() {
            let roles: serde_json::Map<String, Value> = stats
                .unsupported_roles
                .into_iter()
                .map(|(role, n)| (role, Value::from(n)))
                .collect();
            export
                .metadata
                .insert(UNSUPPORTED_ROLES_KEY.to_string(), Value::Object(roles));
        }

        info!(
            conversations = export.conversations.len(),
            messages = export.message_count(),
            format_version,
            "parsed ChatGPT export"
        );
        Ok(export)
    }
}

#[cfg(feature = "archive")]
fn read_archive(bytes: &[u8]) -> Result<String> {
    use std::io::{Cursor, Read};

    use crate::parsing::chatgpt::is_conversations_entry;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CtxpackError::chatgpt_parse(ParseErrorKind::Archive(e.to_string()), None))?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !is_conversations_entry(entry.name()) {
            continue;
        }
        debug!(entry = entry.name(), "reading conversations from archive");
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        return Ok(content);
    }
    Err(CtxpackError::chatgpt_parse(
        ParseErrorKind::Archive("archive has no conversations.json entry".to_string()),
        None,
    ))
}

#[cfg(not(feature = "archive"))]
fn read_archive(_bytes: &[u8]) -> Result<String> {
    Err(CtxpackError::unsupported_format(
        "ChatGPT",
        "ZIP exports need the `archive` feature",
    ))
}

impl Parser for ChatGptParser {
    fn name(&self) -> &'static str {
        "ChatGPT"
    }

    fn platform(&self) -> SourcePlatform {
        SourcePlatform::ChatGpt
    }

    fn parse_bytes(&self, bytes: &[u8]) -> Result<ParsedExport> {
        if bytes.starts_with(ZIP_MAGIC) {
            let content = read_archive(bytes)?;
            return self.parse_document(&content);
        }
        let content = std::str::from_utf8(bytes).map_err(|e| {
            CtxpackError::chatgpt_parse(
                ParseErrorKind::Other(format!("export is not UTF-8 text: {e}")),
                None,
            )
        })?;
        self.parse_document(content.trim_start_matches('\u{feff}'))
    }

    fn parse_str(&self, content: &str) -> Result<ParsedExport> {
        self.parse_document(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING_EXPORT: &str = r#"[
        {
            "id": "c1",
            "title": "Project Alpha",
            "create_time": 1705314600,
            "update_time": 1705318200,
            "mapping": {
                "root": {"parent": null, "children": ["m1"], "message": null},
                "m1": {"parent": "root", "children": ["m2"], "message": {
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "parts": ["I'm building Project Alpha"]},
                    "create_time": 1705314700
                }},
                "m2": {"parent": "m1", "children": [], "message": {
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": ["Great, tell me more."]},
                    "create_time": 1705314760
                }}
            }
        },
        42,
        {"id": "c1", "title": "Again", "messages": [{"role": "user", "content": "hi", "timestamp": 1705400000}]}
    ]"#;

    #[test]
    fn test_parser_name() {
        let parser = ChatGptParser::new();
        assert_eq!(parser.name(), "ChatGPT");
        assert_eq!(parser.platform(), SourcePlatform::ChatGpt);
    }

    #[test]
    fn test_parse_mapping_export() {
        let export = ChatGptParser::new().parse_str(MAPPING_EXPORT).unwrap();

        assert_eq!(export.format_version, "2024-01-01");
        assert_eq!(export.conversations.len(), 2);
        assert_eq!(export.skipped_conversations(), 1);

        let first = &export.conversations[0];
        assert_eq!(first.id, "c1");
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[0].content, "I'm building Project Alpha");

        assert_eq!(export.conversations[1].id, "c1-2");
        assert_eq!(export.export_date.timestamp(), 1705400000);
    }

    #[test]
    fn test_parse_wrapped_and_single() {
        let wrapped = r#"{"conversations": [{"title": "T", "messages": [{"role": "user", "content": "x"}]}]}"#;
        assert_eq!(ChatGptParser::new().parse_str(wrapped).unwrap().conversations.len(), 1);

        let single = r#"{"title": "T", "messages": [{"role": "user", "content": "x"}]}"#;
        assert_eq!(ChatGptParser::new().parse_str(single).unwrap().conversations.len(), 1);
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = ChatGptParser::new().parse_str("[{broken").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_parse_unknown_shape() {
        let err = ChatGptParser::new().parse_str(r#"{"users": []}"#).unwrap_err();
        assert!(err.is_unsupported_format());
    }

    #[test]
    fn test_parse_nothing_recoverable() {
        let err = ChatGptParser::new().parse_str(r#"[1, "two", {"title": "empty"}]"#).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("3 entries"));
    }

    #[test]
    fn test_parse_bytes_strips_bom() {
        let content = format!("\u{feff}{MAPPING_EXPORT}");
        let export = ChatGptParser::new().parse_bytes(content.as_bytes()).unwrap();
        assert_eq!(export.conversations.len(), 2);
    }

    #[test]
    fn test_unsupported_roles_recorded() {
        let content = r#"[{"id": "c", "title": "t", "messages": [
            {"role": "user", "content": "a"},
            {"role": "tool", "content": "b"},
            {"role": "tool", "content": "c"}
        ]}]"#;
        let export = ChatGptParser::new().parse_str(content).unwrap();
        assert_eq!(export.metadata[UNSUPPORTED_ROLES_KEY]["tool"], 2);
    }

    #[cfg(feature = "archive")]
    #[test]
    fn test_parse_zip_archive() {
        use std::io::{Cursor, Write};

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("user.json", options).unwrap();
            writer.write_all(b"{}").unwrap();
            writer.start_file("conversations.json", options).unwrap();
            writer.write_all(MAPPING_EXPORT.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        let export = ChatGptParser::new().parse_bytes(buffer.get_ref()).unwrap();
        assert_eq!(export.conversations.len(), 2);
    }

    #[cfg(feature = "archive")]
    #[test]
    fn test_zip_without_conversations() {
        use std::io::{Cursor, Write};

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("user.json", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"{}").unwrap();
            writer.finish().unwrap();
        }
        let err = ChatGptParser::new().parse_bytes(buffer.get_ref()).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("conversations.json"));
    }
}
