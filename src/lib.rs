//! # ctxpack
//!
//! A Rust library for carrying what one LLM platform knows about you to
//! another.
//!
//! ## Overview
//!
//! ctxpack reads a ChatGPT data export, extracts a
//! [`UniversalContextPack`](core::pack::UniversalContextPack) (your role,
//! projects, tech stack and preferences) and renders it for:
//! - **Gemini**: Gem instructions under a hard character ceiling
//! - **Ollama**: a Modelfile for a local model
//!
//! Packs are plain JSON, so a later export can be merged into an earlier
//! pack and only the changes reported.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ctxpack::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let outcome = ExportJob::new("conversations.json", TargetPlatform::Gemini)
//!         .with_filter(FilterConfig::new().exclude_topic("health"))
//!         .run()?;
//!     outcome.write_to_dir("gemini_out".as_ref())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Stage by Stage
//!
//! ```rust,no_run
//! use ctxpack::prelude::*;
//! use chrono::Utc;
//!
//! fn main() -> Result<()> {
//!     let export = create_parser(SourcePlatform::ChatGpt).parse("conversations.json".as_ref())?;
//!     let pack = ContextExtractor::new(ExtractorConfig::default())?.extract_export(&export, Utc::now());
//!     let bundle = format_pack(&pack, TargetPlatform::Ollama, &FormatterConfig::default())?;
//!     println!("{}", bundle.primary().content);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`compat`]: Export diagnosis before parsing
//! - [`parser`]: [`Parser`](parser::Parser) trait and [`create_parser`](parser::create_parser)
//!   - [`parsers`]: [`ChatGptParser`](parsers::ChatGptParser)
//!   - [`parsing`]: Shared ChatGPT decoding helpers
//! - [`extract`]: Heuristic [`ContextExtractor`](extract::ContextExtractor)
//! - [`core`]: Data model, filtering, incremental updates and serialization
//! - [`format`] / [`formatters`]: Target platforms and their formatters
//! - [`validation`]: Questions to check the target model picked the context up
//! - [`pipeline`]: [`ExportJob`](pipeline::ExportJob), all stages end to end
//! - [`config`]: TOML-loadable tuning knobs
//! - [`cli`]: CLI types (feature `cli`)
//! - [`error`]: Unified error types ([`CtxpackError`], [`Result`])
//! - [`prelude`]: Convenient re-exports

#[cfg(feature = "cli")]
pub mod cli;
pub mod compat;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod format;
pub mod formatters;
pub mod message;
pub mod parser;
pub mod parsers;
pub mod parsing;
pub mod pipeline;
pub mod validation;

// Re-export the main types at the crate root for convenience
pub use error::{CtxpackError, Result};
pub use message::Message;

/// Convenient re-exports for common usage.
///
/// ```rust
/// use ctxpack::prelude::*;
/// ```
pub mod prelude {
    pub use crate::Message;

    // Error types
    pub use crate::error::{CtxpackError, Result};

    // Configuration
    pub use crate::config::{AppConfig, ExtractorConfig, FormatterConfig};

    // Diagnosis and parsing
    pub use crate::compat::{CompatibilityLevel, FormatDiagnostic, diagnose_path};
    pub use crate::parser::{Parser, SourcePlatform, create_parser};

    // Data model
    pub use crate::core::models::{Conversation, ParsedExport};
    pub use crate::core::pack::{ProjectBrief, UniversalContextPack};

    // Stages
    pub use crate::core::filter::{FilterConfig, apply_filters};
    pub use crate::core::incremental::{compute_delta, merge_packs};
    pub use crate::extract::ContextExtractor;
    pub use crate::format::{TargetPlatform, format_pack};
    pub use crate::formatters::{ArtifactBundle, PlatformFormatter, create_formatter};
    pub use crate::validation::{ValidationGenerator, ValidationSuite};

    // Serialization
    #[cfg(feature = "csv-output")]
    pub use crate::core::output::{to_csv, write_csv};
    pub use crate::core::output::{from_json, read_json, to_json, write_json};

    // Orchestration
    pub use crate::pipeline::{ExportJob, ExportOutcome, PipelineStage, Redactor};
}
