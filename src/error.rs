//! Unified error types for ctxpack.
//!
//! Every fallible operation in the library returns [`CtxpackError`]. The
//! variants follow the pipeline's failure taxonomy:
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | [`UnsupportedFormat`](CtxpackError::UnsupportedFormat) | diagnoser, parser | export structure not recognized |
//! | [`Parse`](CtxpackError::Parse) | parser | nothing could be recovered from the export |
//! | [`Validation`](CtxpackError::Validation) | any stage | a pack breaks its structural invariants |
//! | [`Security`](CtxpackError::Security) | collaborators | surfaced from redactors, never generated here |
//! | [`Stage`](CtxpackError::Stage) | pipeline | wraps any of the above with the failing stage |

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::PipelineStage;

/// A specialized [`Result`] type for ctxpack operations.
///
/// # Example
///
/// ```rust
/// use ctxpack::error::Result;
/// use ctxpack::core::models::Conversation;
///
/// fn load_nothing() -> Result<Vec<Conversation>> {
///     Ok(vec![])
/// }
/// ```
pub type Result<T> = std::result::Result<T, CtxpackError>;

/// The error type for all ctxpack operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CtxpackError {
    /// An I/O error occurred while reading an export or writing artifacts.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The export structure is not something any parser understands.
    #[error("Unsupported {format} export: {reason}")]
    UnsupportedFormat {
        /// The format that was expected
        format: &'static str,
        /// Why the export was rejected
        reason: String,
    },

    /// The export could not be decoded into any conversation.
    #[error("Failed to parse {format} export{}: {source}", path.as_ref().map(|p| format!(" (file: {})", p.display())).unwrap_or_default())]
    Parse {
        /// The format being parsed (e.g., "ChatGPT JSON")
        format: &'static str,
        /// The underlying parse error
        #[source]
        source: ParseErrorKind,
        /// The file path, if available
        path: Option<PathBuf>,
    },

    /// A context pack failed its structural invariants.
    #[error("Validation failed: {message}")]
    Validation {
        /// Which invariant was broken
        message: String,
    },

    /// A security collaborator (redactor, encryption) refused the content.
    #[error("Security error: {message}")]
    Security {
        /// Message supplied by the collaborator
        message: String,
    },

    /// Invalid date in filter configuration.
    #[error("Invalid date '{input}'. Expected format: {expected}")]
    InvalidDate {
        /// The invalid date string that was provided
        input: String,
        /// Expected format description
        expected: &'static str,
    },

    /// Rendered output cannot fit the target's hard size ceiling.
    #[error("Rendered {what} needs {actual} characters (maximum: {max})")]
    SizeLimitExceeded {
        /// What was being rendered
        what: &'static str,
        /// Characters required
        actual: usize,
        /// Hard ceiling
        max: usize,
    },

    /// Invalid configuration value or unreadable configuration file.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// JSON parsing/serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ZIP archive error.
    #[cfg(feature = "archive")]
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// CSV writing error.
    #[cfg(feature = "csv-output")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A pipeline stage failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// The stage that failed
        stage: PipelineStage,
        /// The error raised by that stage
        #[source]
        source: Box<CtxpackError>,
    },
}

/// Kinds of parse errors that can occur.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// JSON parsing error
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Archive could not be read
    #[error("{0}")]
    Archive(String),
    /// Generic parsing error
    #[error("{0}")]
    Other(String),
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl CtxpackError {
    /// Creates a parse error for ChatGPT exports.
    pub fn chatgpt_parse(source: ParseErrorKind, path: Option<PathBuf>) -> Self {
        CtxpackError::Parse {
            format: "ChatGPT",
            source,
            path,
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: &'static str, reason: impl Into<String>) -> Self {
        CtxpackError::UnsupportedFormat {
            format,
            reason: reason.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        CtxpackError::Validation {
            message: message.into(),
        }
    }

    /// Creates a security error on behalf of a collaborator.
    pub fn security(message: impl Into<String>) -> Self {
        CtxpackError::Security {
            message: message.into(),
        }
    }

    /// Creates an invalid date error.
    pub fn invalid_date(input: impl Into<String>) -> Self {
        CtxpackError::InvalidDate {
            input: input.into(),
            expected: "YYYY-MM-DD",
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        CtxpackError::Config {
            message: message.into(),
        }
    }

    /// Wraps this error with the pipeline stage that produced it.
    ///
    /// Errors already carrying a stage are returned unchanged.
    #[must_use]
    pub fn in_stage(self, stage: PipelineStage) -> Self {
        match self {
            err @ CtxpackError::Stage { .. } => err,
            other => CtxpackError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Attaches `path` to a parse error that does not name a file yet.
    #[must_use]
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            CtxpackError::Parse {
                format,
                source,
                path: None,
            } => CtxpackError::Parse {
                format,
                source,
                path: Some(path.into()),
            },
            other => other,
        }
    }

    /// Returns the failing stage, if this error came out of the pipeline.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            CtxpackError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the innermost error, looking through stage wrappers.
    pub fn root(&self) -> &CtxpackError {
        match self {
            CtxpackError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns `true` if this is an IO error.
    pub fn is_io(&self) -> bool {
        matches!(self.root(), CtxpackError::Io(_))
    }

    /// Returns `true` if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self.root(), CtxpackError::Parse { .. })
    }

    /// Returns `true` if the export format was rejected.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self.root(), CtxpackError::UnsupportedFormat { .. })
    }

    /// Returns `true` if a pack invariant was broken.
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), CtxpackError::Validation { .. })
    }

    /// Returns `true` if this is a date-related error.
    pub fn is_invalid_date(&self) -> bool {
        matches!(self.root(), CtxpackError::InvalidDate { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = CtxpackError::from(io_err);
        let display = err.to_string();
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_parse_error_with_path() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = CtxpackError::chatgpt_parse(
            ParseErrorKind::Json(json_err),
            Some(PathBuf::from("/exports/conversations.json")),
        );
        let display = err.to_string();
        assert!(display.contains("ChatGPT"));
        assert!(display.contains("/exports/conversations.json"));
    }

    #[test]
    fn test_parse_error_without_path() {
        let err = CtxpackError::chatgpt_parse(ParseErrorKind::Other("no conversations".into()), None);
        let display = err.to_string();
        assert!(display.contains("no conversations"));
        assert!(!display.contains("file:"));
    }

    #[test]
    fn test_unsupported_format_display() {
        let err = CtxpackError::unsupported_format("ChatGPT", "top-level value is a number");
        assert_eq!(
            err.to_string(),
            "Unsupported ChatGPT export: top-level value is a number"
        );
    }

    #[test]
    fn test_invalid_date_display() {
        let err = CtxpackError::invalid_date("15/01/2024");
        let display = err.to_string();
        assert!(display.contains("15/01/2024"));
        assert!(display.contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_size_limit_display() {
        let err = CtxpackError::SizeLimitExceeded {
            what: "Gemini instructions",
            actual: 40_000,
            max: 32_000,
        };
        let display = err.to_string();
        assert!(display.contains("40000"));
        assert!(display.contains("32000"));
    }

    #[test]
    fn test_stage_wrapping() {
        let err = CtxpackError::validation("duplicate project key 'alpha'").in_stage(PipelineStage::Merge);
        assert_eq!(err.stage(), Some(PipelineStage::Merge));
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("merge stage failed"));
    }

    #[test]
    fn test_stage_wrapping_is_not_nested() {
        let err = CtxpackError::validation("bad")
            .in_stage(PipelineStage::Extract)
            .in_stage(PipelineStage::Format);
        assert_eq!(err.stage(), Some(PipelineStage::Extract));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let err = CtxpackError::security("redactor refused content").in_stage(PipelineStage::Format);
        let source = err.source().expect("stage errors carry a source");
        assert!(source.to_string().contains("redactor refused content"));
    }

    #[test]
    fn test_is_methods() {
        let io_err = CtxpackError::from(io::Error::other("test"));
        assert!(io_err.is_io());
        assert!(!io_err.is_parse());

        let date_err = CtxpackError::invalid_date("bad");
        assert!(date_err.is_invalid_date());
        assert!(!date_err.is_io());

        let fmt_err = CtxpackError::unsupported_format("ChatGPT", "empty file");
        assert!(fmt_err.is_unsupported_format());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CtxpackError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(CtxpackError::config("missing weights"))
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }
}
