//! Configuration types for extraction, updating, formatting and validation.
//!
//! Every heuristic constant the pipeline uses lives here so that it can be
//! tuned without touching control flow. All structs implement `Default`,
//! `Serialize` and `Deserialize`; missing TOML keys fall back to defaults.
//!
//! # Example
//!
//! ```rust
//! use ctxpack::config::{AppConfig, ScoringConfig};
//!
//! let config = AppConfig::new()
//!     .with_scoring(ScoringConfig::new().with_half_life_days(14.0))
//!     .with_gemini_max_chars(20_000);
//!
//! assert_eq!(config.formatter.gemini.max_chars, 20_000);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # TOML
//!
//! ```toml
//! [extractor]
//! similarity_threshold = 0.8
//!
//! [extractor.scoring]
//! recency_half_life_days = 45.0
//!
//! [[extractor.extra_rules]]
//! pattern = "(?i)\\bzig\\b"
//! signal = "language"
//! value = "Zig"
//! weight = 1.0
//!
//! [formatter.gemini]
//! max_chars = 32000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::pack::DEFAULT_SIMILARITY_THRESHOLD;
use crate::error::{CtxpackError, Result};
use crate::extract::rules::RuleSpec;

/// Weights and scales for project relevance scoring.
///
/// The score is `frequency_weight * f + recency_weight * r + detail_weight * d`
/// divided by the weight sum and clamped to `[0, 1]`, where each input term is
/// already in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub frequency_weight: f64,
    pub recency_weight: f64,
    pub detail_weight: f64,
    /// Mentions at which the frequency term reaches `1 - 1/e`.
    pub mention_scale: f64,
    /// Days after which the recency term halves.
    pub recency_half_life_days: f64,
    /// Average characters per project message at which detail saturates.
    pub detail_saturation_chars: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            frequency_weight: 0.4,
            recency_weight: 0.45,
            detail_weight: 0.15,
            mention_scale: 3.0,
            recency_half_life_days: 30.0,
            detail_saturation_chars: 400.0,
        }
    }
}

impl ScoringConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_weights(mut self, frequency: f64, recency: f64, detail: f64) -> Self {
        self.frequency_weight = frequency;
        self.recency_weight = recency;
        self.detail_weight = detail;
        self
    }

    #[must_use]
    pub fn with_half_life_days(mut self, days: f64) -> Self {
        self.recency_half_life_days = days;
        self
    }

    #[must_use]
    pub fn with_mention_scale(mut self, scale: f64) -> Self {
        self.mention_scale = scale;
        self
    }

    /// Sum of the three weights.
    pub fn weight_sum(&self) -> f64 {
        self.frequency_weight + self.recency_weight + self.detail_weight
    }

    fn validate(&self) -> Result<()> {
        let weights = [self.frequency_weight, self.recency_weight, self.detail_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CtxpackError::config("scoring weights must be finite and non-negative"));
        }
        if self.weight_sum() <= 0.0 {
            return Err(CtxpackError::config("at least one scoring weight must be positive"));
        }
        for (name, value) in [
            ("mention_scale", self.mention_scale),
            ("recency_half_life_days", self.recency_half_life_days),
            ("detail_saturation_chars", self.detail_saturation_chars),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CtxpackError::config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Settings for the context extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Label written to `source_platform` of extracted packs.
    pub source_platform: String,
    pub scoring: ScoringConfig,
    /// Jaccard overlap at which two project candidates are merged.
    pub similarity_threshold: f64,
    /// Conversations that must share a title before it counts as a project.
    pub min_title_recurrence: usize,
    /// Challenges kept per project (most recent first).
    pub max_challenges: usize,
    /// Mentions before a tool counts as preferred.
    pub preferred_tool_min_mentions: u32,
    /// Most-mentioned languages/frameworks promoted to expertise.
    pub expertise_top_n: usize,
    /// Rules appended to the built-in rule table.
    pub extra_rules: Vec<RuleSpec>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            source_platform: "chatgpt".to_string(),
            scoring: ScoringConfig::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_title_recurrence: 2,
            max_challenges: 5,
            preferred_tool_min_mentions: 1,
            expertise_top_n: 5,
            extra_rules: Vec::new(),
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: RuleSpec) -> Self {
        self.extra_rules.push(rule);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CtxpackError::config("similarity_threshold must be within [0, 1]"));
        }
        if self.min_title_recurrence == 0 {
            return Err(CtxpackError::config("min_title_recurrence must be at least 1"));
        }
        Ok(())
    }
}

/// Settings for the incremental updater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Score increase above which an existing project appears in a delta.
    pub delta_threshold: f64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            delta_threshold: 0.1,
        }
    }
}

/// Settings for the size-constrained Gemini formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Hard ceiling on rendered instructions, in characters.
    pub max_chars: usize,
    /// Name used in the gem description and setup text.
    pub gem_name: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            max_chars: 32_000,
            gem_name: "My Context Assistant".to_string(),
        }
    }
}

/// Settings for the local Ollama formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_model: String,
    pub model_name: String,
    /// Soft threshold on the system prompt before project detail is split out.
    pub soft_limit_chars: usize,
    /// Projects kept inline in the Modelfile once the prompt is split.
    pub inline_projects: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub num_ctx: u32,
    /// Prompt template written as `TEMPLATE`; the base model's own is used when unset.
    pub template: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_model: "llama3.1".to_string(),
            model_name: "my-context".to_string(),
            soft_limit_chars: 100_000,
            inline_projects: 3,
            temperature: 0.7,
            top_p: 0.9,
            num_ctx: 8192,
            template: None,
        }
    }
}

/// Settings for all formatters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
}

/// Settings for the validation question generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Projects (by relevance) that get their own question.
    pub top_projects: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { top_projects: 3 }
    }
}

/// Top-level configuration, usually loaded from `ctxpack.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub extractor: ExtractorConfig,
    pub updater: UpdaterConfig,
    pub formatter: FormatterConfig,
    pub validation: ValidationConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Io`] if the file exists but cannot be read and
    /// [`CtxpackError::Config`] if it is not valid TOML or fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CtxpackError::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges across all sections.
    pub fn validate(&self) -> Result<()> {
        self.extractor.validate()?;
        if !self.updater.delta_threshold.is_finite() || self.updater.delta_threshold < 0.0 {
            return Err(CtxpackError::config("delta_threshold must be non-negative"));
        }
        if self.formatter.gemini.max_chars == 0 {
            return Err(CtxpackError::config("gemini max_chars must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.extractor.scoring = scoring;
        self
    }

    #[must_use]
    pub fn with_gemini_max_chars(mut self, max_chars: usize) -> Self {
        self.formatter.gemini.max_chars = max_chars;
        self
    }

    #[must_use]
    pub fn with_base_model(mut self, model: impl Into<String>) -> Self {
        self.formatter.ollama.base_model = model.into();
        self
    }
}
