//! Unified parser trait for chat assistant exports.
//!
//! # Example
//!
//! ```rust,no_run
//! use ctxpack::parser::{Parser, SourcePlatform, create_parser};
//! use std::path::Path;
//!
//! # fn main() -> ctxpack::Result<()> {
//! let parser = create_parser(SourcePlatform::ChatGpt);
//! let export = parser.parse(Path::new("conversations.json"))?;
//! println!("{} conversations", export.conversations.len());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::models::ParsedExport;
use crate::error::{CtxpackError, Result};

/// Exports larger than this are refused before reading.
pub const MAX_EXPORT_BYTES: u64 = 1024 * 1024 * 1024;

/// Supported source platforms.
///
/// # Example
///
/// ```rust
/// use ctxpack::parser::SourcePlatform;
/// use std::str::FromStr;
///
/// assert_eq!(SourcePlatform::from_str("chatgpt").unwrap(), SourcePlatform::ChatGpt);
/// assert_eq!(SourcePlatform::from_str("openai").unwrap(), SourcePlatform::ChatGpt);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SourcePlatform {
    /// ChatGPT data export (`conversations.json` or the ZIP around it)
    #[serde(alias = "openai")]
    ChatGpt,
}

impl SourcePlatform {
    /// Returns the default file extension for exports from this platform.
    pub fn default_extension(&self) -> &'static str {
        match self {
            SourcePlatform::ChatGpt => "json",
        }
    }

    /// Identifier written to `source_platform` of extracted packs.
    pub fn id(&self) -> &'static str {
        match self {
            SourcePlatform::ChatGpt => "chatgpt",
        }
    }

    /// Returns all platform names including aliases.
    pub fn all_names() -> &'static [&'static str] {
        &["chatgpt", "openai"]
    }

    /// Returns all available platforms.
    pub fn all() -> &'static [SourcePlatform] {
        &[SourcePlatform::ChatGpt]
    }
}

impl std::fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourcePlatform::ChatGpt => write!(f, "ChatGPT"),
        }
    }
}

impl std::str::FromStr for SourcePlatform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chatgpt" | "openai" => Ok(SourcePlatform::ChatGpt),
            _ => Err(format!(
                "Unknown platform: '{}'. Expected one of: {}",
                s,
                SourcePlatform::all_names().join(", ")
            )),
        }
    }
}

/// Trait for parsing exports into a [`ParsedExport`].
///
/// Parsers must implement [`name`](Parser::name),
/// [`platform`](Parser::platform), [`parse_bytes`](Parser::parse_bytes) and
/// [`parse_str`](Parser::parse_str). [`parse`](Parser::parse) reads the file
/// and delegates to `parse_bytes`.
pub trait Parser: Send + Sync {
    /// Returns the human-readable name of this parser.
    fn name(&self) -> &'static str;

    /// Returns the platform this parser handles.
    fn platform(&self) -> SourcePlatform;

    /// Parses an export file.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError`] if:
    /// - the file cannot be read ([`CtxpackError::Io`])
    /// - the file exceeds [`MAX_EXPORT_BYTES`]
    /// - the structure is not recognized ([`CtxpackError::UnsupportedFormat`])
    /// - no conversation could be recovered ([`CtxpackError::Parse`])
    fn parse(&self, path: &Path) -> Result<ParsedExport> {
        let size = std::fs::metadata(path)?.len();
        if size > MAX_EXPORT_BYTES {
            return Err(CtxpackError::SizeLimitExceeded {
                what: "export",
                actual: usize::try_from(size).unwrap_or(usize::MAX),
                max: MAX_EXPORT_BYTES as usize,
            });
        }
        let bytes = std::fs::read(path)?;
        let mut export = self.parse_bytes(&bytes).map_err(|e| e.with_path(path))?;
        export.metadata.insert(
            "source_file".to_string(),
            path.display().to_string().into(),
        );
        Ok(export)
    }

    /// Parses raw export bytes (a JSON document or, for archive-aware
    /// parsers, a ZIP file).
    fn parse_bytes(&self, bytes: &[u8]) -> Result<ParsedExport>;

    /// Parses a JSON document held in memory.
    fn parse_str(&self, content: &str) -> Result<ParsedExport>;

    /// Parses an export file (convenience method accepting &str path).
    fn parse_file(&self, path: &str) -> Result<ParsedExport> {
        self.parse(Path::new(path))
    }
}

/// Creates a parser for the specified platform.
///
/// ```rust
/// use ctxpack::parser::{SourcePlatform, create_parser};
///
/// let parser = create_parser(SourcePlatform::ChatGpt);
/// assert_eq!(parser.name(), "ChatGPT");
/// ```
pub fn create_parser(platform: SourcePlatform) -> Box<dyn Parser> {
    match platform {
        SourcePlatform::ChatGpt => Box::new(crate::parsers::ChatGptParser::new()),
    }
}
