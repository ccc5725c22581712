//! Command-line interface definition using clap.
//!
//! This module defines:
//! - [`Args`] - CLI argument structure (for use with clap)
//! - [`Target`] - Target platforms as CLI values
//!
//! [`Args::filter_config`] and [`Args::app_config`] turn the flags into the
//! library's configuration types, so the binary stays a thin host.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::core::filter::{FilterConfig, JsonFilePreferenceStore, load_filter_preferences};
use crate::error::Result;
use crate::format::TargetPlatform;

/// Preference-store key the CLI saves filters under.
pub const PREFERENCES_KEY: &str = "default";

/// Turn a ChatGPT data export into a portable context pack and render it
/// for Gemini or a local Ollama model.
#[derive(Parser, Debug, Clone)]
#[command(name = "ctxpack")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    ctxpack gemini conversations.json
    ctxpack ollama chatgpt-export.zip -o my_model
    ctxpack gemini conversations.json --exclude-topic health --min-relevance 0.3
    ctxpack ollama conversations.json --previous out/context_pack.json
    ctxpack gemini conversations.json --diagnose-only")]
pub struct Args {
    /// Target platform
    #[arg(value_enum)]
    pub target: Target,

    /// Path to conversations.json or the export ZIP
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "ctxpack_out")]
    pub output: PathBuf,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Previous context pack to update incrementally
    #[arg(long, value_name = "FILE")]
    pub previous: Option<PathBuf>,

    /// Keep projects last discussed on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub after: Option<String>,

    /// Keep projects last discussed on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub before: Option<String>,

    /// Drop projects mentioning this topic (repeatable)
    #[arg(long = "exclude-topic", value_name = "TOPIC")]
    pub exclude_topics: Vec<String>,

    /// Drop this conversation before extraction (repeatable)
    #[arg(long = "exclude-conversation", value_name = "ID")]
    pub exclude_conversations: Vec<String>,

    /// Drop projects scoring below this relevance (0.0 - 1.0)
    #[arg(long, value_name = "SCORE")]
    pub min_relevance: Option<f64>,

    /// JSON file holding saved filter preferences
    #[arg(long, value_name = "FILE")]
    pub preferences: Option<PathBuf>,

    /// Save the resulting filter into --preferences
    #[arg(long, requires = "preferences")]
    pub save_preferences: bool,

    /// Extract this many conversations at a time
    #[arg(long, value_name = "N")]
    pub chunk_size: Option<usize>,

    /// Only report export compatibility
    #[arg(long)]
    pub diagnose_only: bool,

    /// Skip validation question generation
    #[arg(long)]
    pub no_validation: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Builds the filter from saved preferences (if any) plus the flags.
    pub fn filter_config(&self) -> Result<FilterConfig> {
        let mut filter = match &self.preferences {
            Some(path) => load_filter_preferences(&JsonFilePreferenceStore::new(path), PREFERENCES_KEY)?,
            None => FilterConfig::new(),
        };
        for id in &self.exclude_conversations {
            filter = filter.exclude_conversation(id.clone());
        }
        for topic in &self.exclude_topics {
            filter = filter.exclude_topic(topic);
        }
        if self.after.is_some() || self.before.is_some() {
            let after = self.after.as_deref().unwrap_or("1970-01-01");
            let before = self.before.as_deref().unwrap_or("9999-12-31");
            filter = filter.with_date_range(after, before)?;
        }
        if let Some(score) = self.min_relevance {
            filter = filter.with_min_relevance(score)?;
        }
        Ok(filter)
    }

    /// Loads the configuration file, or the defaults when none is given.
    pub fn app_config(&self) -> Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load_from(path),
            None => Ok(AppConfig::default()),
        }
    }

    /// Log filter directive for the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Target platforms.
///
/// # Example
///
/// ```rust
/// use ctxpack::cli::Target;
/// use ctxpack::format::TargetPlatform;
///
/// let target: TargetPlatform = Target::Ollama.into();
/// assert_eq!(target, TargetPlatform::Ollama);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Gemini Gem instructions
    #[default]
    #[value(alias = "google")]
    Gemini,

    /// Ollama Modelfile
    #[value(alias = "local")]
    Ollama,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", TargetPlatform::from(*self))
    }
}

impl From<Target> for TargetPlatform {
    fn from(target: Target) -> Self {
        match target {
            Target::Gemini => TargetPlatform::Gemini,
            Target::Ollama => TargetPlatform::Ollama,
        }
    }
}
