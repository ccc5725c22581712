//! Platform formatters.
//!
//! Each formatter implements [`PlatformFormatter`] and renders a
//! [`UniversalContextPack`] into an [`ArtifactBundle`]: the text files a user
//! pastes into, or loads onto, the target platform.
//!
//! # Available Formatters
//!
//! - [`GeminiFormatter`] - Gem instructions under a hard character ceiling
//! - [`OllamaFormatter`] - Modelfile for a local model, split when very large
//!
//! Formatters are pure: they never modify the pack and perform no I/O.
//! [`ArtifactBundle::write_to_dir`] is the only place artifacts touch disk.

mod gemini;
mod ollama;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::FormatterConfig;
use crate::core::pack::UniversalContextPack;
use crate::error::Result;
use crate::format::TargetPlatform;
use crate::message::Metadata;

pub use gemini::{
    GEM_DESCRIPTION_FILE, GEMINI_INSTRUCTIONS_FILE, GeminiFormatter, OMITTED_PROJECTS_KEY,
    PRIORITIZED_KEY,
};
pub use ollama::{ADDITIONAL_PROJECTS_FILE, MODELFILE, OllamaFormatter};

/// File name of the human-readable setup guide every bundle carries.
pub const SETUP_INSTRUCTIONS_FILE: &str = "setup_instructions.md";

/// One rendered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub file_name: String,
    pub content: String,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        char_len(&self.content)
    }
}

/// Everything a formatter produced for one target.
///
/// The first artifact is the primary one (Gem instructions, Modelfile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub target: TargetPlatform,
    artifacts: Vec<Artifact>,
    /// Shell commands that install the primary artifact.
    pub setup_commands: Vec<String>,
    /// Shell commands that exercise the installed model.
    pub test_commands: Vec<String>,
    pub metadata: Metadata,
}

impl ArtifactBundle {
    pub fn new(target: TargetPlatform, primary: Artifact) -> Self {
        Self {
            target,
            artifacts: vec![primary],
            setup_commands: Vec::new(),
            test_commands: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn primary(&self) -> &Artifact {
        &self.artifacts[0]
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Looks up an artifact by file name.
    pub fn get(&self, file_name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.file_name == file_name)
    }

    /// Writes every artifact into `dir`, creating it if needed.
    ///
    /// Returns the written paths in artifact order.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.artifacts.len());
        for artifact in &self.artifacts {
            let path = dir.join(&artifact.file_name);
            std::fs::write(&path, &artifact.content)?;
            written.push(path);
        }
        info!(
            target_platform = %self.target,
            files = written.len(),
            dir = %dir.display(),
            "wrote artifacts"
        );
        Ok(written)
    }
}

/// Result of checking rendered text against a target's size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeCheck {
    pub within_limits: bool,
    /// Characters over the limit, zero when within it.
    pub excess_chars: usize,
    pub max_size: usize,
}

impl SizeCheck {
    pub fn measure(text: &str, max_size: usize) -> Self {
        let len = char_len(text);
        Self {
            within_limits: len <= max_size,
            excess_chars: len.saturating_sub(max_size),
            max_size,
        }
    }
}

/// Renders a pack for one target platform.
pub trait PlatformFormatter: Send + Sync {
    /// Returns the platform this formatter renders for.
    fn target(&self) -> TargetPlatform;

    /// Renders `pack` into artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::SizeLimitExceeded`](crate::CtxpackError::SizeLimitExceeded)
    /// if the target has a hard ceiling that cannot be met.
    fn format(&self, pack: &UniversalContextPack) -> Result<ArtifactBundle>;

    /// Checks rendered text against this target's limit.
    fn check_size_limits(&self, text: &str) -> SizeCheck;
}

/// Creates a formatter for the specified target.
///
/// ```rust
/// use ctxpack::config::FormatterConfig;
/// use ctxpack::format::TargetPlatform;
/// use ctxpack::formatters::create_formatter;
///
/// let formatter = create_formatter(TargetPlatform::Gemini, &FormatterConfig::default());
/// assert_eq!(formatter.target(), TargetPlatform::Gemini);
/// assert!(formatter.check_size_limits("short").within_limits);
/// ```
pub fn create_formatter(target: TargetPlatform, config: &FormatterConfig) -> Box<dyn PlatformFormatter> {
    match target {
        TargetPlatform::Gemini => Box::new(GeminiFormatter::new(config.gemini.clone())),
        TargetPlatform::Ollama => Box::new(OllamaFormatter::new(config.ollama.clone())),
    }
}

/// Length of `text` in characters, the unit all limits are expressed in.
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Human-readable name of the platform a pack came from.
pub(crate) fn source_name(pack: &UniversalContextPack) -> String {
    pack.source_platform
        .parse::<crate::parser::SourcePlatform>()
        .map(|p| p.to_string())
        .unwrap_or_else(|_| pack.source_platform.clone())
}

pub(crate) fn join(items: impl IntoIterator<Item = impl AsRef<str>>, sep: &str) -> String {
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_size_check() {
        let check = SizeCheck::measure("héllo", 3);
        assert!(!check.within_limits);
        assert_eq!(check.excess_chars, 2);
        assert_eq!(check.max_size, 3);

        let check = SizeCheck::measure("héllo", 5);
        assert!(check.within_limits);
        assert_eq!(check.excess_chars, 0);
    }

    #[test]
    fn test_create_formatter() {
        let config = FormatterConfig::default();
        for target in TargetPlatform::all() {
            assert_eq!(create_formatter(*target, &config).target(), *target);
        }
    }

    #[test]
    fn test_bundle_lookup_and_write() {
        let bundle = ArtifactBundle::new(TargetPlatform::Ollama, Artifact::new("Modelfile", "FROM x\n"))
            .with_artifact(Artifact::new("notes.md", "# Notes\n"));
        assert_eq!(bundle.primary().file_name, "Modelfile");
        assert_eq!(bundle.get("notes.md").unwrap().char_len(), 8);
        assert!(bundle.get("missing").is_none());

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let written = bundle.write_to_dir(&out).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read_to_string(out.join("Modelfile")).unwrap(), "FROM x\n");
    }

    #[test]
    fn test_source_name() {
        let pack = UniversalContextPack::new("chatgpt", Utc::now());
        assert_eq!(source_name(&pack), "ChatGPT");
        let pack = UniversalContextPack::new("somewhere", Utc::now());
        assert_eq!(source_name(&pack), "somewhere");
    }
}
