//! Target platform types.
//!
//! [`TargetPlatform`] names the model a pack is rendered for. These types do
//! not depend on the CLI and are usable from library code.
//!
//! # Example
//!
//! ```rust
//! use ctxpack::config::FormatterConfig;
//! use ctxpack::core::pack::UniversalContextPack;
//! use ctxpack::format::{TargetPlatform, format_pack};
//! use chrono::Utc;
//!
//! # fn main() -> ctxpack::Result<()> {
//! let pack = UniversalContextPack::new("chatgpt", Utc::now());
//! let bundle = format_pack(&pack, TargetPlatform::Ollama, &FormatterConfig::default())?;
//! assert!(bundle.primary().content.starts_with("FROM "));
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

use crate::config::FormatterConfig;
use crate::core::pack::UniversalContextPack;
use crate::error::Result;
use crate::formatters::{ArtifactBundle, create_formatter};

/// Model platform a pack can be rendered for.
///
/// - [`Gemini`](TargetPlatform::Gemini) - Gem instructions under a hard size ceiling
/// - [`Ollama`](TargetPlatform::Ollama) - Modelfile for a local model
///
/// # Example
///
/// ```rust
/// use ctxpack::format::TargetPlatform;
/// use std::str::FromStr;
///
/// let target = TargetPlatform::from_str("ollama").unwrap();
/// assert_eq!(target, TargetPlatform::Ollama);
/// assert!(!target.is_size_constrained());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TargetPlatform {
    /// Google Gemini (Gems / Saved Info)
    #[default]
    Gemini,

    /// Local model served by Ollama
    Ollama,
}

impl TargetPlatform {
    /// Identifier used in file names and serialized suites.
    pub fn id(&self) -> &'static str {
        match self {
            TargetPlatform::Gemini => "gemini",
            TargetPlatform::Ollama => "ollama",
        }
    }

    /// Returns all accepted target names including aliases.
    pub fn all_names() -> &'static [&'static str] {
        &["gemini", "google", "ollama", "local"]
    }

    /// Returns all available targets.
    pub fn all() -> &'static [TargetPlatform] {
        &[TargetPlatform::Gemini, TargetPlatform::Ollama]
    }

    /// Returns `true` if the target has a hard ceiling on rendered text.
    pub fn is_size_constrained(&self) -> bool {
        matches!(self, TargetPlatform::Gemini)
    }
}

impl std::fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetPlatform::Gemini => write!(f, "Gemini"),
            TargetPlatform::Ollama => write!(f, "Ollama"),
        }
    }
}

impl std::str::FromStr for TargetPlatform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(TargetPlatform::Gemini),
            "ollama" | "local" => Ok(TargetPlatform::Ollama),
            _ => Err(format!(
                "Unknown target: '{}'. Expected one of: {}",
                s,
                TargetPlatform::all_names().join(", ")
            )),
        }
    }
}

/// Renders `pack` for `target`.
///
/// Convenience wrapper over [`create_formatter`].
///
/// # Errors
///
/// Returns [`CtxpackError::SizeLimitExceeded`](crate::CtxpackError::SizeLimitExceeded)
/// when a size-constrained target cannot fit even an empty rendering.
pub fn format_pack(
    pack: &UniversalContextPack,
    target: TargetPlatform,
    config: &FormatterConfig,
) -> Result<ArtifactBundle> {
    create_formatter(target, config).format(pack)
}
