//! Reduce a context pack to the projects the user wants to carry over.
//!
//! This module provides [`FilterConfig`] for defining filter criteria and
//! [`apply_filters`] for applying them to a [`UniversalContextPack`].
//!
//! # Filter Types
//!
//! | Filter | Method | Removes projects that |
//! |--------|--------|-----------------------|
//! | Conversation | [`exclude_conversation`](FilterConfig::exclude_conversation) | came from an excluded conversation |
//! | Topic | [`exclude_topic`](FilterConfig::exclude_topic) | mention the topic in name, description or tech stack |
//! | Date range | [`with_date_range`](FilterConfig::with_date_range) | were last discussed outside the range |
//! | Relevance | [`with_min_relevance`](FilterConfig::with_min_relevance) | score below the threshold |
//!
//! # Example
//!
//! ```
//! use ctxpack::core::filter::{FilterConfig, apply_filters};
//! use ctxpack::core::pack::{ProjectBrief, UniversalContextPack};
//! use chrono::{TimeZone, Utc};
//!
//! # fn main() -> ctxpack::Result<()> {
//! let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
//! let pack = UniversalContextPack::new("chatgpt", now).with_projects(vec![
//!     ProjectBrief::new("Alpha", 0.9, now).with_tech(["Rust"]),
//!     ProjectBrief::new("Beta", 0.3, now).with_tech(["PHP"]),
//! ]);
//!
//! let config = FilterConfig::new().with_min_relevance(0.5)?;
//! let filtered = apply_filters(&pack, &config);
//!
//! assert_eq!(filtered.projects.len(), 1);
//! assert_eq!(filtered.projects[0].name, "Alpha");
//! assert_eq!(pack.projects.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Behavior Notes
//!
//! - Only `projects` is reduced; profile, preferences and technical context
//!   are aggregates and pass through unchanged
//! - Topic matching is a case-insensitive substring match
//! - Multiple filters are combined with OR logic on removal
//! - Filtering is idempotent and never modifies its input

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::models::{Conversation, ParsedExport};
use crate::core::pack::{ProjectBrief, UniversalContextPack};
use crate::error::{CtxpackError, Result};

/// Metadata key under which the applied [`FilterConfig`] is recorded.
pub const FILTER_KEY: &str = "filter";

fn check_min_relevance(score: f64) -> Result<()> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(CtxpackError::config(format!(
            "minimum relevance {score} is outside [0, 1]"
        )));
    }
    Ok(())
}

/// Inclusive range of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range, rejecting one that ends before it starts.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Config`] if `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(CtxpackError::config(format!(
                "date range starts at {start} but ends at {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// What to leave out of a pack.
///
/// A project is removed when it matches any active filter.
///
/// # Examples
///
/// ```
/// use ctxpack::core::filter::FilterConfig;
///
/// # fn main() -> ctxpack::Result<()> {
/// let config = FilterConfig::new()
///     .exclude_topic("salary")
///     .exclude_conversation("c-42")
///     .with_date_range("2024-01-01", "2024-12-31")?
///     .with_min_relevance(0.25)?;
/// assert!(config.is_active());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub excluded_conversation_ids: BTreeSet<String>,

    /// Lower-cased, trimmed topics.
    pub excluded_topics: BTreeSet<String>,

    pub date_range: Option<DateRange>,

    pub min_relevance_score: f64,
}

impl FilterConfig {
    /// Creates a new empty filter configuration.
    ///
    /// No filters are active by default; every project passes through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes projects extracted from conversation `id`.
    #[must_use]
    pub fn exclude_conversation(mut self, id: impl Into<String>) -> Self {
        self.excluded_conversation_ids.insert(id.into());
        self
    }

    /// Removes projects mentioning `topic`. Blank topics are ignored.
    #[must_use]
    pub fn exclude_topic(mut self, topic: &str) -> Self {
        let topic = topic.trim().to_lowercase();
        if !topic.is_empty() {
            self.excluded_topics.insert(topic);
        }
        self
    }

    /// Keeps only projects last discussed between two dates, both inclusive.
    ///
    /// Date format: `YYYY-MM-DD`. The end date covers its whole day.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::InvalidDate`] if either date is malformed and
    /// [`CtxpackError::Config`] if `start` is after `end`.
    pub fn with_date_range(self, start: &str, end: &str) -> Result<Self> {
        let start = parse_date_start(start)?;
        let end = parse_date_end(end)?;
        self.with_range(start, end)
    }

    /// Sets the date range from timestamps you already have.
    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        self.date_range = Some(DateRange::new(start, end)?);
        Ok(self)
    }

    /// Removes projects scoring below `score`.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Config`] unless `score` is within `[0, 1]`.
    pub fn with_min_relevance(mut self, score: f64) -> Result<Self> {
        check_min_relevance(score)?;
        self.min_relevance_score = score;
        Ok(self)
    }

    /// Re-checks what the builders enforce, for configurations that did not
    /// come through them (deserialized or edited by hand).
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Config`] for a score outside `[0, 1]` or a
    /// range that ends before it starts.
    pub fn validate(&self) -> Result<()> {
        check_min_relevance(self.min_relevance_score)?;
        if let Some(range) = self.date_range {
            DateRange::new(range.start, range.end)?;
        }
        Ok(())
    }

    /// Returns `true` if any filter is active.
    pub fn is_active(&self) -> bool {
        !self.excluded_conversation_ids.is_empty()
            || !self.excluded_topics.is_empty()
            || self.date_range.is_some()
            || self.min_relevance_score > 0.0
    }

    /// Returns `true` if `project` should be removed.
    pub fn excludes(&self, project: &ProjectBrief) -> bool {
        if project
            .source_conversation_ids
            .iter()
            .any(|id| self.excluded_conversation_ids.contains(id))
        {
            return true;
        }
        if self.mentions_excluded_topic(project) {
            return true;
        }
        if self
            .date_range
            .is_some_and(|range| !range.contains(project.last_discussed))
        {
            return true;
        }
        project.relevance_score < self.min_relevance_score
    }

    fn mentions_excluded_topic(&self, project: &ProjectBrief) -> bool {
        if self.excluded_topics.is_empty() {
            return false;
        }
        let matches = |text: &str| {
            let text = text.to_lowercase();
            self.excluded_topics.iter().any(|t| text.contains(&t.to_lowercase()))
        };
        matches(&project.name)
            || matches(&project.description)
            || project.tech_stack.iter().any(|t| matches(t))
    }
}

/// Parse a date string in YYYY-MM-DD format to `DateTime`<Utc> at start of day.
fn parse_date_start(date_str: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| CtxpackError::invalid_date(date_str))?;
    Ok(naive.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Parse a date string in YYYY-MM-DD format to the last second of that day.
fn parse_date_end(date_str: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| CtxpackError::invalid_date(date_str))?;
    let end_of_day = chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(chrono::NaiveTime::MIN);
    Ok(naive.and_time(end_of_day).and_utc())
}

/// Returns a copy of `pack` without the projects `config` excludes.
///
/// The applied configuration is recorded under [`FILTER_KEY`] in the
/// metadata, replacing any earlier record, so filtering twice with the same
/// configuration is the same as filtering once.
#[instrument(skip_all, fields(projects = pack.projects.len()))]
pub fn apply_filters(pack: &UniversalContextPack, config: &FilterConfig) -> UniversalContextPack {
    let mut filtered = pack.clone();
    if !config.is_active() {
        return filtered;
    }

    filtered.projects.retain(|p| !config.excludes(p));
    filtered.metadata.insert(
        FILTER_KEY.to_string(),
        serde_json::to_value(config).unwrap_or_default(),
    );

    debug!(
        kept = filtered.projects.len(),
        removed = pack.projects.len() - filtered.projects.len(),
        "filtered projects"
    );
    filtered
}

/// Drops excluded conversations from an export before extraction.
pub fn apply_conversation_exclusions(export: &ParsedExport, config: &FilterConfig) -> ParsedExport {
    if config.excluded_conversation_ids.is_empty() {
        return export.clone();
    }
    let conversations: Vec<Conversation> = export
        .conversations
        .iter()
        .filter(|c| !config.excluded_conversation_ids.contains(&c.id))
        .cloned()
        .collect();
    debug!(
        excluded = export.conversations.len() - conversations.len(),
        "excluded conversations before extraction"
    );
    ParsedExport {
        format_version: export.format_version.clone(),
        export_date: export.export_date,
        conversations,
        metadata: export.metadata.clone(),
    }
}

/// What a filter pass removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub projects_before: usize,
    pub projects_after: usize,
    /// Names of removed projects, in their original order.
    pub removed_projects: Vec<String>,
}

impl FilterSummary {
    pub fn removed(&self) -> usize {
        self.projects_before - self.projects_after
    }
}

/// Compares a pack with its filtered version.
pub fn filter_summary(original: &UniversalContextPack, filtered: &UniversalContextPack) -> FilterSummary {
    let kept: BTreeSet<String> = filtered.projects.iter().map(ProjectBrief::key).collect();
    FilterSummary {
        projects_before: original.projects.len(),
        projects_after: filtered.projects.len(),
        removed_projects: original
            .projects
            .iter()
            .filter(|p| !kept.contains(&p.key()))
            .map(|p| p.name.clone())
            .collect(),
    }
}

// ============================================================================
// Preference persistence
// ============================================================================

/// Key-value store for reusable filter configurations.
///
/// Configurations are stored verbatim; loading returns exactly what was saved.
pub trait PreferenceStore: Send + Sync {
    /// Returns the configuration saved under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<FilterConfig>>;

    /// Saves `config` under `key`, replacing any previous value.
    fn save(&self, key: &str, config: &FilterConfig) -> Result<()>;
}

/// In-process store, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<BTreeMap<String, FilterConfig>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> Result<Option<FilterConfig>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, config: &FilterConfig) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), config.clone());
        Ok(())
    }
}

/// Store backed by a single JSON file mapping keys to configurations.
///
/// A missing file behaves as an empty store.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, FilterConfig>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self, key: &str) -> Result<Option<FilterConfig>> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&self, key: &str, config: &FilterConfig) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), config.clone());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        debug!(path = %self.path.display(), key, "saved filter preferences");
        Ok(())
    }
}

/// Persists `config` under `key`.
pub fn save_filter_preferences(
    store: &dyn PreferenceStore,
    key: &str,
    config: &FilterConfig,
) -> Result<()> {
    store.save(key, config)
}

/// Loads the configuration saved under `key`, or an empty one.
///
/// # Errors
///
/// Fails if the store cannot be read or the saved configuration does not
/// pass [`FilterConfig::validate`].
pub fn load_filter_preferences(store: &dyn PreferenceStore, key: &str) -> Result<FilterConfig> {
    let config = store.load(key)?.unwrap_or_default();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, 15, 12, 0, 0).unwrap()
    }

    fn sample_pack() -> UniversalContextPack {
        UniversalContextPack::new("chatgpt", at(6)).with_projects(vec![
            ProjectBrief::new("Alpha", 0.9, at(6))
                .with_tech(["Rust", "Tokio"])
                .with_conversation("c1"),
            ProjectBrief::new("Beta", 0.3, at(1))
                .with_description("Payroll dashboard")
                .with_tech(["PHP"])
                .with_conversation("c2"),
            ProjectBrief::new("Gamma", 0.6, at(4))
                .with_tech(["Python"])
                .with_conversation("c2")
                .with_conversation("c3"),
        ])
    }

    fn names(pack: &UniversalContextPack) -> Vec<&str> {
        pack.projects.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_inactive_filter_is_identity() {
        let pack = sample_pack();
        assert_eq!(apply_filters(&pack, &FilterConfig::new()), pack);
    }

    #[test]
    fn test_filter_by_conversation() {
        let config = FilterConfig::new().exclude_conversation("c2");
        let filtered = apply_filters(&sample_pack(), &config);
        assert_eq!(names(&filtered), vec!["Alpha"]);
    }

    #[test]
    fn test_filter_by_topic() {
        let by_tech = apply_filters(&sample_pack(), &FilterConfig::new().exclude_topic("TOKIO"));
        assert_eq!(names(&by_tech), vec!["Gamma", "Beta"]);

        let by_description = apply_filters(&sample_pack(), &FilterConfig::new().exclude_topic("payroll"));
        assert_eq!(names(&by_description), vec!["Alpha", "Gamma"]);

        let by_name = apply_filters(&sample_pack(), &FilterConfig::new().exclude_topic("gam"));
        assert_eq!(names(&by_name), vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_blank_topic_ignored() {
        let config = FilterConfig::new().exclude_topic("   ");
        assert!(!config.is_active());
    }

    #[test]
    fn test_filter_by_date_range() {
        let config = FilterConfig::new()
            .with_date_range("2024-04-01", "2024-06-15")
            .unwrap();
        let filtered = apply_filters(&sample_pack(), &config);
        assert_eq!(names(&filtered), vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn test_filter_by_relevance() {
        let config = FilterConfig::new().with_min_relevance(0.5).unwrap();
        let filtered = apply_filters(&sample_pack(), &config);
        assert_eq!(names(&filtered), vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn test_aggregates_untouched() {
        let mut pack = sample_pack();
        pack.technical_context.languages.insert("PHP".to_string());
        let filtered = apply_filters(&pack, &FilterConfig::new().exclude_topic("php"));
        assert_eq!(filtered.technical_context, pack.technical_context);
        assert_eq!(filtered.user_profile, pack.user_profile);
    }

    #[test]
    fn test_idempotent_and_recorded() {
        let config = FilterConfig::new()
            .exclude_topic("php")
            .with_min_relevance(0.4)
            .unwrap();
        let once = apply_filters(&sample_pack(), &config);
        let twice = apply_filters(&once, &config);
        assert_eq!(once, twice);

        let recorded: FilterConfig =
            serde_json::from_value(once.metadata[FILTER_KEY].clone()).unwrap();
        assert_eq!(recorded, config);
    }

    #[test]
    fn test_invalid_builders() {
        assert!(matches!(
            FilterConfig::new().with_date_range("01-01-2024", "2024-02-01"),
            Err(CtxpackError::InvalidDate { .. })
        ));
        assert!(matches!(
            FilterConfig::new().with_date_range("2024-03-01", "2024-02-01"),
            Err(CtxpackError::Config { .. })
        ));
        assert!(FilterConfig::new().with_min_relevance(1.5).is_err());
        assert!(FilterConfig::new().with_min_relevance(f64::NAN).is_err());
    }

    #[test]
    fn test_single_day_range() {
        let config = FilterConfig::new()
            .with_date_range("2024-06-15", "2024-06-15")
            .unwrap();
        let range = config.date_range.unwrap();
        assert!(range.contains(at(6)));
    }

    #[test]
    fn test_filter_summary() {
        let pack = sample_pack();
        let filtered = apply_filters(&pack, &FilterConfig::new().exclude_conversation("c2"));
        let summary = filter_summary(&pack, &filtered);
        assert_eq!(summary.projects_before, 3);
        assert_eq!(summary.projects_after, 1);
        assert_eq!(summary.removed(), 2);
        assert_eq!(summary.removed_projects, vec!["Gamma", "Beta"]);
    }

    #[test]
    fn test_apply_conversation_exclusions() {
        let export = ParsedExport::new(
            "2024-01-01",
            vec![
                Conversation::new("c1", "One", vec![]),
                Conversation::new("c2", "Two", vec![]),
            ],
        );
        let kept = apply_conversation_exclusions(&export, &FilterConfig::new().exclude_conversation("c1"));
        assert_eq!(kept.conversations.len(), 1);
        assert_eq!(kept.conversations[0].id, "c2");
        assert_eq!(kept.format_version, export.format_version);
        assert_eq!(export.conversations.len(), 2);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(load_filter_preferences(&store, "default").unwrap(), FilterConfig::new());

        let config = FilterConfig::new().exclude_topic("health");
        save_filter_preferences(&store, "default", &config).unwrap();
        assert_eq!(load_filter_preferences(&store, "default").unwrap(), config);
        assert!(store.load("other").unwrap().is_none());
    }

    #[test]
    fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferenceStore::new(dir.path().join("prefs").join("filters.json"));
        assert!(store.load("default").unwrap().is_none());

        let config = FilterConfig::new()
            .exclude_conversation("c9")
            .with_date_range("2024-01-01", "2024-12-31")
            .unwrap()
            .with_min_relevance(0.2)
            .unwrap();
        store.save("default", &config).unwrap();
        store.save("work", &FilterConfig::new().exclude_topic("family")).unwrap();

        let reopened = JsonFilePreferenceStore::new(store.path());
        assert_eq!(reopened.load("default").unwrap(), Some(config));
        assert!(reopened.load("work").unwrap().is_some());
    }

    #[test]
    fn test_json_file_store_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFilePreferenceStore::new(&path).load("default").unwrap_err();
        assert!(matches!(err, CtxpackError::Json(_)));
    }

    #[test]
    fn test_load_rejects_hand_edited_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(&path, r#"{"default": {"min_relevance_score": 7.0}}"#).unwrap();
        let store = JsonFilePreferenceStore::new(&path);

        assert!(store.load("default").unwrap().is_some());
        let err = load_filter_preferences(&store, "default").unwrap_err();
        assert!(matches!(err, CtxpackError::Config { .. }));
    }

    #[test]
    fn test_load_rejects_reversed_range() {
        let store = MemoryPreferenceStore::new();
        let mut config = FilterConfig::new();
        config.date_range = Some(DateRange {
            start: at(6),
            end: at(1),
        });
        save_filter_preferences(&store, "default", &config).unwrap();
        assert!(load_filter_preferences(&store, "default").is_err());
    }

    #[test]
    fn test_validate_accepts_builder_output() {
        let config = FilterConfig::new()
            .with_date_range("2024-01-01", "2024-01-01")
            .unwrap()
            .with_min_relevance(1.0)
            .unwrap();
        assert!(config.validate().is_ok());
        assert!(FilterConfig::new().validate().is_ok());
    }
}
