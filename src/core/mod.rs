//! Core data model and the pack-level stages.
//!
//! This module contains:
//! - [`models`] - Parsed exports and conversations
//! - [`pack`] - The [`UniversalContextPack`](pack::UniversalContextPack) and its parts
//! - [`filter`] - User-directed exclusion of projects and conversations
//! - [`incremental`] - Merging packs and computing deltas between runs
//! - [`output`] - Pack JSON and validation checklist CSV
//!
//! # Quick Start
//!
//! ```rust
//! use ctxpack::core::{FilterConfig, UniversalContextPack, apply_filters, merge_packs};
//! use chrono::Utc;
//!
//! let previous = UniversalContextPack::new("chatgpt", Utc::now());
//! let current = UniversalContextPack::new("chatgpt", Utc::now());
//! let merged = merge_packs(&previous, &current);
//! let filtered = apply_filters(&merged, &FilterConfig::default());
//! assert!(filtered.projects.is_empty());
//! ```

pub mod filter;
pub mod incremental;
pub mod models;
pub mod output;
pub mod pack;

pub use filter::{FilterConfig, apply_filters};
pub use incremental::{compute_delta, merge_packs};
pub use models::{Conversation, ParsedExport};
pub use pack::{ProjectBrief, UniversalContextPack};

#[cfg(feature = "csv-output")]
pub use output::{to_csv, write_csv};
pub use output::{from_json, read_json, to_json, write_json};
