//! Export compatibility diagnosis.
//!
//! [`diagnose_path`] and [`diagnose_bytes`] inspect an export before parsing
//! and report how well this crate understands it. Diagnosis never fails: any
//! problem is described in the returned [`FormatDiagnostic`].
//!
//! | Level | Meaning |
//! |-------|---------|
//! | [`Full`](CompatibilityLevel::Full) | known generation, all expected keys present |
//! | [`Partial`](CompatibilityLevel::Partial) | parseable, but optional keys are missing or the generation is unknown |
//! | [`Unsupported`](CompatibilityLevel::Unsupported) | the parser would reject it |
//!
//! # Example
//!
//! ```
//! use ctxpack::compat::{CompatibilityLevel, diagnose_bytes};
//!
//! let export = br#"[{"id": "c1", "title": "T", "create_time": 1, "update_time": 2,
//!     "messages": [{"role": "user", "content": "hi"}]}]"#;
//! let diagnostic = diagnose_bytes(export, Some("conversations.json"));
//!
//! assert_eq!(diagnostic.compatibility_level, CompatibilityLevel::Full);
//! assert_eq!(diagnostic.detected_version, "2023-06-01");
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::models::ParsedExport;
use crate::parser::MAX_EXPORT_BYTES;
use crate::parsing::chatgpt::{
    KNOWN_FORMAT_VERSIONS, ParseStats, UNKNOWN_FORMAT_VERSION, conversation_values,
    convert_conversation, infer_format_version, json_kind,
};

/// Bytes of a large document inspected by the diagnoser.
pub const SAMPLE_BYTES: usize = 64 * 1024;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Optional conversation keys and the alternatives that stand in for them.
const OPTIONAL_KEYS: &[(&str, &[&str])] = &[
    ("id", &["id", "conversation_id"]),
    ("title", &["title", "name"]),
    ("create_time", &["create_time", "created_at", "timestamp"]),
    ("update_time", &["update_time", "updated_at"]),
];

/// How well an export is understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityLevel {
    Full,
    Partial,
    Unsupported,
}

impl std::fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompatibilityLevel::Full => write!(f, "full"),
            CompatibilityLevel::Partial => write!(f, "partial"),
            CompatibilityLevel::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// What kind of file the export arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// ZIP archive
    Archive,
    /// Bare JSON document
    Document,
    Unknown,
}

/// Result of diagnosing an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDiagnostic {
    pub detected_version: String,
    pub compatibility_level: CompatibilityLevel,
    pub issues: Vec<String>,
    pub container: ContainerKind,
    pub suggestions: Vec<String>,
}

impl FormatDiagnostic {
    fn new(container: ContainerKind) -> Self {
        Self {
            detected_version: UNKNOWN_FORMAT_VERSION.to_string(),
            compatibility_level: CompatibilityLevel::Full,
            issues: Vec::new(),
            container,
            suggestions: Vec::new(),
        }
    }

    /// Returns `true` unless the export would be rejected.
    pub fn is_supported(&self) -> bool {
        self.compatibility_level != CompatibilityLevel::Unsupported
    }

    fn downgrade(&mut self, level: CompatibilityLevel, issue: impl Into<String>) {
        self.compatibility_level = self.compatibility_level.max(level);
        self.issues.push(issue.into());
    }

    fn note(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    fn finish(mut self) -> Self {
        match self.compatibility_level {
            CompatibilityLevel::Unsupported => {
                self.suggestions.push(
                    "Request a fresh export in ChatGPT under Settings > Data controls > Export data"
                        .to_string(),
                );
                self.suggestions.push(
                    "Pass the emailed ZIP archive or the conversations.json inside it".to_string(),
                );
            }
            CompatibilityLevel::Partial => self.suggestions.push(
                "Missing fields will be filled with defaults; extracted context may be less precise"
                    .to_string(),
            ),
            CompatibilityLevel::Full => {}
        }
        debug!(
            level = %self.compatibility_level,
            version = %self.detected_version,
            issues = self.issues.len(),
            "diagnosed export"
        );
        self
    }
}

/// Diagnoses the export at `path`.
///
/// Documents larger than [`SAMPLE_BYTES`] are judged from their prefix only.
pub fn diagnose_path(path: &Path) -> FormatDiagnostic {
    let name = path.file_name().and_then(|n| n.to_str());
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => return unreadable(&e),
    };
    if size > MAX_EXPORT_BYTES {
        let mut diagnostic = FormatDiagnostic::new(ContainerKind::Unknown);
        diagnostic.downgrade(
            CompatibilityLevel::Unsupported,
            format!("file is {size} bytes; exports over 1 GiB are not supported"),
        );
        return diagnostic.finish();
    }

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return unreadable(&e),
    };
    let mut prefix = Vec::with_capacity(SAMPLE_BYTES.min(size as usize));
    if let Err(e) = (&mut file).take(SAMPLE_BYTES as u64).read_to_end(&mut prefix) {
        return unreadable(&e);
    }

    let whole = prefix.starts_with(ZIP_MAGIC) || size as usize <= SAMPLE_BYTES;
    if !whole {
        return diagnose(&prefix, name, true);
    }
    if let Err(e) = file.read_to_end(&mut prefix) {
        return unreadable(&e);
    }
    diagnose(&prefix, name, false)
}

/// Diagnoses an export held in memory. `file_name`, when given, is checked
/// against the content for extension mismatches.
pub fn diagnose_bytes(bytes: &[u8], file_name: Option<&str>) -> FormatDiagnostic {
    let truncated = !bytes.starts_with(ZIP_MAGIC) && bytes.len() > SAMPLE_BYTES;
    diagnose(bytes, file_name, truncated)
}

fn unreadable(err: &std::io::Error) -> FormatDiagnostic {
    let mut diagnostic = FormatDiagnostic::new(ContainerKind::Unknown);
    diagnostic.downgrade(
        CompatibilityLevel::Unsupported,
        format!("file cannot be read: {err}"),
    );
    diagnostic.finish()
}

fn extension(file_name: Option<&str>) -> Option<String> {
    file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn diagnose(bytes: &[u8], file_name: Option<&str>, truncated: bool) -> FormatDiagnostic {
    if bytes.is_empty() {
        let mut diagnostic = FormatDiagnostic::new(ContainerKind::Unknown);
        diagnostic.downgrade(CompatibilityLevel::Unsupported, "export is empty");
        return diagnostic.finish();
    }

    let ext = extension(file_name);
    if bytes.starts_with(ZIP_MAGIC) {
        let mut diagnostic = FormatDiagnostic::new(ContainerKind::Archive);
        if ext.as_deref().is_some_and(|e| e != "zip") {
            diagnostic.note("file contains a ZIP archive but its name suggests otherwise");
            diagnostic
                .suggestions
                .push("Rename the file with a .zip extension".to_string());
        }
        diagnose_archive(&mut diagnostic, bytes);
        return diagnostic.finish();
    }

    let sample = &bytes[..bytes.len().min(SAMPLE_BYTES)];
    if sample.contains(&0) {
        let mut diagnostic = FormatDiagnostic::new(ContainerKind::Unknown);
        diagnostic.downgrade(
            CompatibilityLevel::Unsupported,
            "content is binary, not a JSON document",
        );
        return diagnostic.finish();
    }

    let mut diagnostic = FormatDiagnostic::new(ContainerKind::Document);
    if ext.as_deref() == Some("zip") {
        diagnostic.note("file is named .zip but is not a ZIP archive");
        diagnostic
            .suggestions
            .push("Rename the file with a .json extension".to_string());
    }
    if truncated {
        diagnose_sample(&mut diagnostic, sample);
    } else {
        diagnose_document(&mut diagnostic, bytes);
    }
    diagnostic.finish()
}

#[cfg(feature = "archive")]
fn diagnose_archive(diagnostic: &mut FormatDiagnostic, bytes: &[u8]) {
    use std::io::Cursor;

    use crate::parsing::chatgpt::is_conversations_entry;

    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            diagnostic.downgrade(
                CompatibilityLevel::Unsupported,
                format!("archive cannot be read: {e}"),
            );
            return;
        }
    };
    for index in 0..archive.len() {
        let Ok(mut entry) = archive.by_index(index) else {
            continue;
        };
        if !entry.is_file() || !is_conversations_entry(entry.name()) {
            continue;
        }
        let mut content = Vec::new();
        if let Err(e) = entry.read_to_end(&mut content) {
            diagnostic.downgrade(
                CompatibilityLevel::Unsupported,
                format!("archive entry cannot be read: {e}"),
            );
            return;
        }
        diagnose_document(diagnostic, &content);
        return;
    }
    diagnostic.downgrade(
        CompatibilityLevel::Unsupported,
        "archive has no conversations.json entry",
    );
}

#[cfg(not(feature = "archive"))]
fn diagnose_archive(diagnostic: &mut FormatDiagnostic, _bytes: &[u8]) {
    diagnostic.downgrade(
        CompatibilityLevel::Unsupported,
        "ZIP exports need the `archive` feature",
    );
}

fn detect_version(diagnostic: &mut FormatDiagnostic, text: &str) {
    let version = infer_format_version(text);
    diagnostic.detected_version = version.to_string();
    if !KNOWN_FORMAT_VERSIONS.contains(&version) {
        diagnostic.downgrade(
            CompatibilityLevel::Partial,
            "export format version could not be determined",
        );
    }
}

fn looks_like_json(text: &str) -> bool {
    matches!(
        text.trim_start_matches('\u{feff}').trim_start().chars().next(),
        Some('[' | '{')
    )
}

/// Full structural check of a complete document.
fn diagnose_document(diagnostic: &mut FormatDiagnostic, bytes: &[u8]) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        diagnostic.downgrade(CompatibilityLevel::Unsupported, "export is not UTF-8 text");
        return;
    };
    let text = text.trim_start_matches('\u{feff}');
    if !looks_like_json(text) {
        diagnostic.downgrade(CompatibilityLevel::Unsupported, "content is not a JSON document");
        return;
    }
    let root: Value = match serde_json::from_str(text) {
        Ok(root) => root,
        Err(e) => {
            diagnostic.downgrade(CompatibilityLevel::Unsupported, format!("malformed JSON: {e}"));
            return;
        }
    };
    let entries = match conversation_values(root) {
        Ok(entries) => entries,
        Err(e) => {
            diagnostic.downgrade(CompatibilityLevel::Unsupported, e.to_string());
            return;
        }
    };
    let Some(first) = entries.first() else {
        diagnostic.downgrade(CompatibilityLevel::Unsupported, "export contains no conversations");
        return;
    };
    let Some(first) = first.as_object() else {
        diagnostic.downgrade(
            CompatibilityLevel::Unsupported,
            format!("first conversation is {}, not an object", json_kind(first)),
        );
        return;
    };
    if !first.contains_key("mapping") && !first.contains_key("messages") {
        diagnostic.downgrade(
            CompatibilityLevel::Unsupported,
            "first conversation has neither `mapping` nor `messages`",
        );
        return;
    }

    let mut stats = ParseStats::default();
    let readable = entries
        .iter()
        .filter(|entry| convert_conversation(entry, &mut stats).is_some())
        .count();
    if readable == 0 {
        diagnostic.downgrade(
            CompatibilityLevel::Unsupported,
            "no conversation holds a readable message",
        );
        return;
    }
    if stats.skipped_conversations > 0 {
        diagnostic.downgrade(
            CompatibilityLevel::Partial,
            format!(
                "{} of {} conversations hold no readable message and will be skipped",
                stats.skipped_conversations,
                entries.len()
            ),
        );
    }

    detect_version(diagnostic, text);
    for (key, alternatives) in OPTIONAL_KEYS {
        if !alternatives.iter().any(|alt| first.contains_key(*alt)) {
            diagnostic.downgrade(
                CompatibilityLevel::Partial,
                format!("conversations have no `{key}` field"),
            );
        }
    }
}

/// Textual check of a document prefix.
fn diagnose_sample(diagnostic: &mut FormatDiagnostic, sample: &[u8]) {
    let text = String::from_utf8_lossy(sample);
    if !looks_like_json(&text) {
        diagnostic.downgrade(CompatibilityLevel::Unsupported, "content is not a JSON document");
        return;
    }
    if !text.contains("\"mapping\"") && !text.contains("\"messages\"") {
        diagnostic.downgrade(
            CompatibilityLevel::Unsupported,
            "first conversation has neither `mapping` nor `messages`",
        );
        return;
    }
    detect_version(diagnostic, &text);
    for (key, alternatives) in OPTIONAL_KEYS {
        if !alternatives
            .iter()
            .any(|alt| text.contains(&format!("\"{alt}\"")))
        {
            diagnostic.downgrade(
                CompatibilityLevel::Partial,
                format!("conversations have no `{key}` field"),
            );
        }
    }
}

// ============================================================================
// Platform features
// ============================================================================

/// A source-platform capability whose effects do not carry over to a
/// target model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFeature {
    pub name: String,
    pub description: String,
    pub workaround: String,
    /// Messages that showed signs of the feature.
    pub occurrences: usize,
}

struct FeatureSignature {
    name: &'static str,
    description: &'static str,
    workaround: &'static str,
    markers: &'static [&'static str],
}

const FEATURES: &[FeatureSignature] = &[
    FeatureSignature {
        name: "Web Browsing",
        description: "Browsing the web for current information",
        workaround: "Mention that you previously relied on web research",
        markers: &[
            "browsed",
            "searched the web",
            "found online",
            "according to my search",
            "based on current information",
            "from the web",
        ],
    },
    FeatureSignature {
        name: "Plugin Usage",
        description: "Third-party plugins for specific tasks",
        workaround: "Describe the plugin functionality in your context",
        markers: &["plugin", "tool:"],
    },
    FeatureSignature {
        name: "Code Interpreter",
        description: "Sandboxed code execution",
        workaround: "Include code examples and expected outputs in context",
        markers: &["code interpreter", "executed code", "ran the code", "advanced data analysis"],
    },
    FeatureSignature {
        name: "Image Generation",
        description: "Generating images from prompts",
        workaround: "Describe image requirements and preferences in text",
        markers: &["generated an image", "created an image", "dall-e", "image generation"],
    },
    FeatureSignature {
        name: "File Uploads",
        description: "Analyzing uploaded files",
        workaround: "Include file contents or summaries in context text",
        markers: &[
            "uploaded file",
            "analyze this file",
            "document you provided",
            "in the file you shared",
        ],
    },
];

/// Lists source-platform features the export shows signs of, in a fixed
/// order, with how often each appeared.
pub fn identify_platform_features(export: &ParsedExport) -> Vec<PlatformFeature> {
    let mut counts = vec![0usize; FEATURES.len()];
    for message in export.conversations.iter().flat_map(|c| &c.messages) {
        let content = message.content.to_lowercase();
        for (count, feature) in counts.iter_mut().zip(FEATURES) {
            if feature.markers.iter().any(|m| content.contains(m)) {
                *count += 1;
            }
        }
    }
    FEATURES
        .iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|(feature, occurrences)| PlatformFeature {
            name: feature.name.to_string(),
            description: feature.description.to_string(),
            workaround: feature.workaround.to_string(),
            occurrences,
        })
        .collect()
}
