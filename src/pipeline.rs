//! End-to-end export jobs.
//!
//! An [`ExportJob`] runs the stages in order:
//!
//! 1. diagnose the export file
//! 2. parse it into a [`ParsedExport`]
//! 3. extract a [`UniversalContextPack`]
//! 4. apply the [`FilterConfig`]
//! 5. merge with a previous pack and compute the delta, when one is given
//! 6. format for the target platform, after an optional [`Redactor`] pass
//! 7. generate the validation suite
//!
//! Any failure is returned wrapped in [`CtxpackError::Stage`] naming the
//! stage that raised it. Nothing is written to disk until
//! [`ExportOutcome::write_to_dir`] is called.
//!
//! # Example
//!
//! ```rust,no_run
//! use ctxpack::format::TargetPlatform;
//! use ctxpack::pipeline::ExportJob;
//!
//! # fn main() -> ctxpack::Result<()> {
//! let outcome = ExportJob::new("conversations.json", TargetPlatform::Gemini).run()?;
//! outcome.write_to_dir("gemini_out".as_ref())?;
//! println!("{} projects", outcome.pack.projects.len());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::compat::{FormatDiagnostic, PlatformFeature, diagnose_path, identify_platform_features};
use crate::config::AppConfig;
use crate::core::filter::{FilterConfig, FilterSummary, apply_conversation_exclusions, apply_filters, filter_summary};
use crate::core::incremental::{
    compute_delta, detect_new_conversations, detect_updated_conversations, merge_packs_with,
};
use crate::core::models::ParsedExport;
use crate::core::output::write_json;
use crate::core::pack::UniversalContextPack;
use crate::error::{CtxpackError, Result};
use crate::extract::ContextExtractor;
use crate::format::{TargetPlatform, format_pack};
use crate::formatters::ArtifactBundle;
use crate::parser::{Parser, SourcePlatform, create_parser};
use crate::validation::{ValidationGenerator, ValidationSuite};

/// File name of the serialized pack written next to the artifacts.
pub const PACK_FILE: &str = "context_pack.json";

/// File name of the serialized delta, written only for incremental runs.
pub const DELTA_FILE: &str = "context_delta.json";

/// File name of the serialized validation suite.
pub const VALIDATION_FILE: &str = "validation_suite.json";

/// File name of the validation checklist CSV.
#[cfg(feature = "csv-output")]
pub const CHECKLIST_FILE: &str = "validation_checklist.csv";

/// A step of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Diagnose,
    Parse,
    Extract,
    Filter,
    Merge,
    Format,
    Validate,
    Write,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Diagnose => "diagnose",
            PipelineStage::Parse => "parse",
            PipelineStage::Extract => "extract",
            PipelineStage::Filter => "filter",
            PipelineStage::Merge => "merge",
            PipelineStage::Format => "format",
            PipelineStage::Validate => "validate",
            PipelineStage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Hook that rewrites a pack before it is formatted.
///
/// Implementations typically scrub secrets or personal data. Returning
/// [`CtxpackError::Security`] aborts the job.
pub trait Redactor: Send + Sync {
    fn redact(&self, pack: &UniversalContextPack) -> Result<UniversalContextPack>;
}

/// Configuration of one export run.
pub struct ExportJob {
    input: PathBuf,
    source: SourcePlatform,
    target: TargetPlatform,
    config: AppConfig,
    filter: FilterConfig,
    previous: Option<UniversalContextPack>,
    created_at: Option<DateTime<Utc>>,
    chunk_size: Option<usize>,
    redactor: Option<Box<dyn Redactor>>,
    validate: bool,
}

impl std::fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportJob")
            .field("input", &self.input)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("filter", &self.filter)
            .field("previous", &self.previous.is_some())
            .field("created_at", &self.created_at)
            .field("chunk_size", &self.chunk_size)
            .field("redactor", &self.redactor.is_some())
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}

impl ExportJob {
    /// Creates a job rendering the ChatGPT export at `input` for `target`.
    pub fn new(input: impl Into<PathBuf>, target: TargetPlatform) -> Self {
        Self {
            input: input.into(),
            source: SourcePlatform::ChatGpt,
            target,
            config: AppConfig::default(),
            filter: FilterConfig::default(),
            previous: None,
            created_at: None,
            chunk_size: None,
            redactor: None,
            validate: true,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: SourcePlatform) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    /// Merges the result into `previous` and computes a delta against it.
    #[must_use]
    pub fn with_previous(mut self, previous: UniversalContextPack) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Fixes the pack's `created_at`. Defaults to the export date.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Extracts `chunk_size` conversations at a time to bound memory.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    #[must_use]
    pub fn with_redactor(mut self, redactor: impl Redactor + 'static) -> Self {
        self.redactor = Some(Box::new(redactor));
        self
    }

    /// Skips generation of the validation suite.
    #[must_use]
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn target(&self) -> TargetPlatform {
        self.target
    }

    /// Runs every stage and returns the results in memory.
    #[instrument(skip_all, fields(input = %self.input.display(), target_platform = %self.target))]
    pub fn run(&self) -> Result<ExportOutcome> {
        let diagnostic = diagnose_path(&self.input);
        if !diagnostic.is_supported() {
            let err = CtxpackError::unsupported_format("ChatGPT export", diagnostic.issues.join("; "));
            return Err(err.in_stage(PipelineStage::Diagnose));
        }
        for issue in &diagnostic.issues {
            warn!(issue = %issue, "compatibility issue");
        }

        let export = create_parser(self.source)
            .parse(&self.input)
            .map_err(|e| e.in_stage(PipelineStage::Parse))?;
        let export = apply_conversation_exclusions(&export, &self.filter);
        let features = identify_platform_features(&export);
        info!(
            conversations = export.conversations.len(),
            messages = export.message_count(),
            format_version = %export.format_version,
            "parsed export"
        );
        if let Some(previous) = &self.previous {
            log_changes(previous, &export);
        }

        let pack = self
            .extract(&export)
            .map_err(|e| e.in_stage(PipelineStage::Extract))?;

        let unfiltered = pack;
        let pack = apply_filters(&unfiltered, &self.filter);
        let summary = filter_summary(&unfiltered, &pack);
        if summary.removed() > 0 {
            info!(removed = summary.removed(), kept = summary.projects_after, "filtered projects");
        }

        let (pack, delta) = match &self.previous {
            Some(previous) => {
                let delta = compute_delta(previous, &pack, self.config.updater.delta_threshold);
                let merged = merge_packs_with(
                    previous,
                    &pack,
                    self.config.extractor.similarity_threshold,
                );
                let merged = apply_filters(&merged, &self.filter);
                info!(
                    projects = merged.projects.len(),
                    changed = delta.projects.len(),
                    "merged with previous pack"
                );
                (merged, Some(delta))
            }
            None => (pack, None),
        };
        pack.validate().map_err(|e| e.in_stage(PipelineStage::Merge))?;

        let bundle = self
            .format(&pack)
            .map_err(|e| e.in_stage(PipelineStage::Format))?;

        let suite = self.validate.then(|| {
            ValidationGenerator::new(self.config.validation.top_projects).generate(&pack, self.target)
        });

        Ok(ExportOutcome {
            diagnostic,
            features,
            filter_summary: summary,
            pack,
            delta,
            bundle,
            suite,
        })
    }

    fn extract(&self, export: &ParsedExport) -> Result<UniversalContextPack> {
        let extractor = ContextExtractor::new(self.config.extractor.clone())?;
        let created_at = self.created_at.unwrap_or(export.export_date);
        let pack = match self.chunk_size {
            Some(size) => extractor.extract_export_chunked(export, size, created_at),
            None => extractor.extract_export(export, created_at),
        };
        Ok(pack)
    }

    fn format(&self, pack: &UniversalContextPack) -> Result<ArtifactBundle> {
        let redacted;
        let pack = match &self.redactor {
            Some(redactor) => {
                redacted = redactor.redact(pack)?;
                redacted.validate()?;
                debug!("applied redactor");
                &redacted
            }
            None => pack,
        };
        format_pack(pack, self.target, &self.config.formatter)
    }
}

fn log_changes(previous: &UniversalContextPack, export: &ParsedExport) {
    let new = detect_new_conversations(&previous.metadata, export).len();
    let updated = detect_updated_conversations(&previous.metadata, export).len();
    info!(new, updated, "conversations changed since previous pack");
}

/// Everything an export job produced.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub diagnostic: FormatDiagnostic,
    /// Source-platform features that do not carry over.
    pub features: Vec<PlatformFeature>,
    pub filter_summary: FilterSummary,
    /// The final pack, merged with the previous one when given.
    pub pack: UniversalContextPack,
    /// Changes against the previous pack, for incremental runs.
    pub delta: Option<UniversalContextPack>,
    pub bundle: ArtifactBundle,
    pub suite: Option<ValidationSuite>,
}

impl ExportOutcome {
    /// Writes the artifacts, the pack, the delta and the validation suite
    /// into `dir`. Returns every written path.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.write_all(dir).map_err(|e| e.in_stage(PipelineStage::Write))
    }

    fn write_all(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = self.bundle.write_to_dir(dir)?;

        let pack_path = dir.join(PACK_FILE);
        write_json(&self.pack, &pack_path)?;
        written.push(pack_path);

        if let Some(delta) = &self.delta {
            let delta_path = dir.join(DELTA_FILE);
            write_json(delta, &delta_path)?;
            written.push(delta_path);
        }

        if let Some(suite) = &self.suite {
            let suite_path = dir.join(VALIDATION_FILE);
            std::fs::write(&suite_path, serde_json::to_string_pretty(suite)?)?;
            written.push(suite_path);

            #[cfg(feature = "csv-output")]
            {
                let csv_path = dir.join(CHECKLIST_FILE);
                crate::core::output::write_csv(suite, &csv_path)?;
                written.push(csv_path);
            }
        }
        info!(files = written.len(), "wrote export outcome");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EXPORT: &str = r#"[
        {
            "id": "c1",
            "title": "Rust CLI",
            "create_time": 1717236000,
            "update_time": 1717239600,
            "messages": [
                {"role": "user", "content": "I'm building Ferrite, a Rust CLI using tokio and serde.", "create_time": 1717236000},
                {"role": "assistant", "content": "Sounds good.", "create_time": 1717236060}
            ]
        },
        {
            "id": "c2",
            "title": "Ferrite parser",
            "create_time": 1717322400,
            "update_time": 1717326000,
            "messages": [
                {"role": "user", "content": "Working on Ferrite again, the parser in Rust is slow.", "create_time": 1717322400},
                {"role": "assistant", "content": "Profile it first.", "create_time": 1717322460}
            ]
        }
    ]"#;

    fn export_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    struct Refuse;

    impl Redactor for Refuse {
        fn redact(&self, _pack: &UniversalContextPack) -> Result<UniversalContextPack> {
            Err(CtxpackError::security("api key found"))
        }
    }

    struct DropProjects;

    impl Redactor for DropProjects {
        fn redact(&self, pack: &UniversalContextPack) -> Result<UniversalContextPack> {
            let mut pack = pack.clone();
            pack.projects.clear();
            Ok(pack)
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Diagnose.to_string(), "diagnose");
        assert_eq!(PipelineStage::Write.to_string(), "write");
    }

    #[test]
    fn test_run_gemini() {
        let file = export_file(EXPORT);
        let outcome = ExportJob::new(file.path(), TargetPlatform::Gemini).run().unwrap();

        assert!(outcome.diagnostic.is_supported());
        assert!(outcome.pack.project("Ferrite").is_some());
        assert_eq!(outcome.bundle.target, TargetPlatform::Gemini);
        assert!(outcome.bundle.primary().content.contains("Ferrite"));
        assert!(outcome.delta.is_none());
        assert!(!outcome.suite.unwrap().is_empty());
    }

    #[test]
    fn test_created_at_defaults_to_export_date() {
        let file = export_file(EXPORT);
        let a = ExportJob::new(file.path(), TargetPlatform::Ollama).run().unwrap();
        let b = ExportJob::new(file.path(), TargetPlatform::Ollama).run().unwrap();
        assert_eq!(a.pack, b.pack);
        assert_eq!(a.bundle, b.bundle);
    }

    #[test]
    fn test_chunked_matches_whole() {
        let file = export_file(EXPORT);
        let whole = ExportJob::new(file.path(), TargetPlatform::Ollama).run().unwrap();
        let chunked = ExportJob::new(file.path(), TargetPlatform::Ollama)
            .with_chunk_size(1)
            .run()
            .unwrap();
        assert_eq!(whole.pack, chunked.pack);
    }

    #[test]
    fn test_unsupported_input_fails_in_diagnose() {
        let file = export_file("");
        let err = ExportJob::new(file.path(), TargetPlatform::Gemini).run().unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::Diagnose));
        assert!(err.is_unsupported_format());
    }

    #[test]
    fn test_redactor_error_fails_in_format() {
        let file = export_file(EXPORT);
        let err = ExportJob::new(file.path(), TargetPlatform::Gemini)
            .with_redactor(Refuse)
            .run()
            .unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::Format));
        assert!(matches!(err.root(), CtxpackError::Security { .. }));
    }

    #[test]
    fn test_redactor_output_is_formatted() {
        let file = export_file(EXPORT);
        let outcome = ExportJob::new(file.path(), TargetPlatform::Gemini)
            .with_redactor(DropProjects)
            .run()
            .unwrap();
        assert!(!outcome.bundle.primary().content.contains("## Active Projects"));
        assert!(!outcome.pack.projects.is_empty());
    }

    #[test]
    fn test_incremental_run_produces_delta() {
        let file = export_file(EXPORT);
        let first = ExportJob::new(file.path(), TargetPlatform::Gemini).run().unwrap();
        let second = ExportJob::new(file.path(), TargetPlatform::Gemini)
            .with_previous(first.pack.clone())
            .run()
            .unwrap();
        let delta = second.delta.unwrap();
        assert!(delta.projects.is_empty());
        assert_eq!(
            second.pack.source_conversation_ids(),
            first.pack.source_conversation_ids()
        );
    }

    #[test]
    fn test_write_to_dir() {
        let file = export_file(EXPORT);
        let outcome = ExportJob::new(file.path(), TargetPlatform::Ollama).run().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = outcome.write_to_dir(dir.path()).unwrap();

        assert!(dir.path().join("Modelfile").exists());
        assert!(dir.path().join(PACK_FILE).exists());
        assert!(dir.path().join(VALIDATION_FILE).exists());
        assert!(!dir.path().join(DELTA_FILE).exists());
        assert!(written.iter().all(|p| p.exists()));
        let pack = crate::core::output::read_json(dir.path().join(PACK_FILE)).unwrap();
        assert_eq!(pack, outcome.pack);
    }
}
