//! The Universal Context Pack and its parts.
//!
//! A [`UniversalContextPack`] is the portable artifact the pipeline produces:
//! a profile, a set of projects keyed by normalized name, preferences and a
//! technical summary. Packs are created by the extractor, reduced by filters,
//! combined by the incremental updater and read by formatters. No stage
//! mutates a pack it was handed; each returns a new one.
//!
//! # Invariants
//!
//! - every [`ProjectBrief::relevance_score`] is finite and within `[0, 1]`
//! - no two projects share a [`normalize_key`] value
//!
//! [`UniversalContextPack::validate`] checks both.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CtxpackError, Result};
use crate::message::Metadata;

/// Schema version written into every pack.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Metadata key: array of conversation ids folded into the pack.
pub const SOURCE_CONVERSATION_IDS_KEY: &str = "source_conversation_ids";

/// Metadata key: object mapping conversation id to content fingerprint.
pub const CONVERSATION_FINGERPRINTS_KEY: &str = "conversation_fingerprints";

/// Metadata key: number of conversations folded into the pack.
pub const TOTAL_CONVERSATIONS_KEY: &str = "total_conversations";

const NAME_STOP_WORDS: &[&str] = &["project", "the", "my", "our", "a", "an"];

/// Normalizes a project name into its identity key.
///
/// Lower-cases, collapses whitespace, trims surrounding punctuation and drops
/// leading filler words, so `"Project  Alpha"`, `"alpha"` and `"the Alpha"`
/// all map to `"alpha"`.
///
/// # Example
///
/// ```
/// use ctxpack::core::pack::normalize_key;
///
/// assert_eq!(normalize_key("Project  Alpha"), "alpha");
/// assert_eq!(normalize_key("  Carvis App "), "carvis app");
/// assert_eq!(normalize_key("Project"), "project");
/// ```
pub fn normalize_key(name: &str) -> String {
    let words = name_tokens(name);
    let first_content = words
        .iter()
        .position(|w| !NAME_STOP_WORDS.contains(&w.as_str()))
        .unwrap_or(0);
    words[first_content..].join(" ")
}

/// Lower-cased words of `text` with surrounding punctuation trimmed, the
/// same tokenization [`normalize_key`] uses.
pub(crate) fn name_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Returns `true` for filler words [`normalize_key`] strips from the front.
pub(crate) fn is_name_stop_word(word: &str) -> bool {
    NAME_STOP_WORDS.contains(&word)
}

/// Jaccard overlap at which two differently keyed projects are treated as
/// one.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

/// Groups project keys that name the same project.
///
/// Two candidates are linked when their keys share a non-filler word and the
/// Jaccard overlap of (key words ∪ lower-cased tech) reaches `threshold`.
/// Links are transitive. `candidates` must be sorted by key; clusters come
/// back as index lists ordered by their first member, members ascending.
pub fn cluster_similar(candidates: &[(&str, &BTreeSet<String>)], threshold: f64) -> Vec<Vec<usize>> {
    let features: Vec<(BTreeSet<&str>, BTreeSet<String>)> = candidates
        .iter()
        .map(|(key, tech)| {
            let names: BTreeSet<&str> = key.split(' ').filter(|w| !is_name_stop_word(w)).collect();
            let mut all: BTreeSet<String> = names.iter().map(ToString::to_string).collect();
            all.extend(tech.iter().map(|t| t.to_lowercase()));
            (names, all)
        })
        .collect();

    let mut parent: Vec<usize> = (0..candidates.len()).collect();
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let (names_i, all_i) = &features[i];
            let (names_j, all_j) = &features[j];
            if names_i.is_disjoint(names_j) || jaccard(all_i, all_j) < threshold {
                continue;
            }
            let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
            if ri != rj {
                parent[ri.max(rj)] = ri.min(rj);
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..candidates.len() {
        let root = find_root(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }
    clusters.into_values().collect()
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Lifecycle state of a project.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Still being discussed
    #[default]
    Active,
    /// Put on hold
    Paused,
    /// Finished or shipped
    Completed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Paused => write!(f, "paused"),
            ProjectStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A project the user has been working on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub name: String,
    pub description: String,
    pub tech_stack: BTreeSet<String>,
    pub key_challenges: Vec<String>,
    pub current_status: ProjectStatus,
    pub last_discussed: DateTime<Utc>,
    pub relevance_score: f64,
    /// Conversations this project was extracted from.
    #[serde(default)]
    pub source_conversation_ids: BTreeSet<String>,
}

impl ProjectBrief {
    /// Creates a brief with empty collections and an active status.
    pub fn new(name: impl Into<String>, relevance_score: f64, last_discussed: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tech_stack: BTreeSet::new(),
            key_challenges: Vec::new(),
            current_status: ProjectStatus::Active,
            last_discussed,
            relevance_score,
            source_conversation_ids: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_tech<I, S>(mut self, tech: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tech_stack.extend(tech.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.key_challenges.push(challenge.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.current_status = status;
        self
    }

    #[must_use]
    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.source_conversation_ids.insert(id.into());
        self
    }

    /// The identity key of this project (see [`normalize_key`]).
    pub fn key(&self) -> String {
        normalize_key(&self.name)
    }
}

/// Ordering used for `projects`: relevance descending, then `last_discussed`
/// descending, then key ascending.
pub fn project_order(a: &ProjectBrief, b: &ProjectBrief) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| b.last_discussed.cmp(&a.last_discussed))
        .then_with(|| a.key().cmp(&b.key()))
}

/// Who the user is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub role: Option<String>,
    pub expertise_areas: BTreeSet<String>,
    pub background_summary: String,
}

/// How the user likes to work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub coding_style: BTreeMap<String, String>,
    pub communication_style: String,
    pub preferred_tools: BTreeSet<String>,
    pub work_patterns: BTreeMap<String, String>,
}

impl UserPreferences {
    /// Returns `true` if no preference was observed.
    pub fn is_empty(&self) -> bool {
        self.coding_style.is_empty()
            && self.communication_style.is_empty()
            && self.preferred_tools.is_empty()
            && self.work_patterns.is_empty()
    }
}

/// Technologies and domains the user works with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalContext {
    pub languages: BTreeSet<String>,
    pub frameworks: BTreeSet<String>,
    pub tools: BTreeSet<String>,
    pub domains: BTreeSet<String>,
}

impl TechnicalContext {
    /// Returns `true` if every category is empty.
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.frameworks.is_empty()
            && self.tools.is_empty()
            && self.domains.is_empty()
    }

    /// Categories in display order, paired with their labels.
    pub fn categories(&self) -> [(&'static str, &BTreeSet<String>); 4] {
        [
            ("Languages", &self.languages),
            ("Frameworks", &self.frameworks),
            ("Tools", &self.tools),
            ("Domains", &self.domains),
        ]
    }
}

/// The portable context artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalContextPack {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub source_platform: String,
    pub user_profile: UserProfile,
    pub projects: Vec<ProjectBrief>,
    pub preferences: UserPreferences,
    pub technical_context: TechnicalContext,
    #[serde(default)]
    pub metadata: Metadata,
}

impl UniversalContextPack {
    /// Creates an empty pack at the current schema version.
    pub fn new(source_platform: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            created_at,
            source_platform: source_platform.into(),
            user_profile: UserProfile::default(),
            projects: Vec::new(),
            preferences: UserPreferences::default(),
            technical_context: TechnicalContext::default(),
            metadata: Metadata::new(),
        }
    }

    /// Replaces the project list, restoring the canonical order.
    #[must_use]
    pub fn with_projects(mut self, mut projects: Vec<ProjectBrief>) -> Self {
        projects.sort_by(project_order);
        self.projects = projects;
        self
    }

    /// Conversation ids recorded under [`SOURCE_CONVERSATION_IDS_KEY`].
    pub fn source_conversation_ids(&self) -> BTreeSet<String> {
        metadata_string_set(&self.metadata, SOURCE_CONVERSATION_IDS_KEY)
    }

    /// Conversation fingerprints recorded under [`CONVERSATION_FINGERPRINTS_KEY`].
    pub fn conversation_fingerprints(&self) -> BTreeMap<String, String> {
        metadata_string_map(&self.metadata, CONVERSATION_FINGERPRINTS_KEY)
    }

    /// Looks up a project by any spelling of its name.
    pub fn project(&self, name: &str) -> Option<&ProjectBrief> {
        let key = normalize_key(name);
        self.projects.iter().find(|p| p.key() == key)
    }

    /// Checks the structural invariants of the pack.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Validation`] when a relevance score is out of
    /// range, two projects share a key, or the version is not semver-like.
    pub fn validate(&self) -> Result<()> {
        if schema_major(&self.version).is_none() {
            return Err(CtxpackError::validation(format!(
                "pack version '{}' is not a semantic version",
                self.version
            )));
        }

        let mut seen = BTreeSet::new();
        for project in &self.projects {
            let score = project.relevance_score;
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(CtxpackError::validation(format!(
                    "project '{}' has relevance score {} outside [0, 1]",
                    project.name, score
                )));
            }
            if !seen.insert(project.key()) {
                return Err(CtxpackError::validation(format!(
                    "duplicate project key '{}'",
                    project.key()
                )));
            }
        }
        Ok(())
    }
}

/// Major component of a `MAJOR.MINOR.PATCH` version string.
pub fn schema_major(version: &str) -> Option<u64> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor_ok = parts.next().is_some_and(|p| p.parse::<u64>().is_ok());
    let patch_ok = parts.next().is_some_and(|p| p.parse::<u64>().is_ok());
    (minor_ok && patch_ok && parts.next().is_none()).then_some(major)
}

pub(crate) fn metadata_string_set(metadata: &Metadata, key: &str) -> BTreeSet<String> {
    metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn metadata_string_map(metadata: &Metadata, key: &str) -> BTreeMap<String, String> {
    metadata
        .get(key)
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn string_set_value(set: &BTreeSet<String>) -> serde_json::Value {
    serde_json::Value::Array(set.iter().cloned().map(serde_json::Value::String).collect())
}

pub(crate) fn string_map_value(map: &BTreeMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}
