//! Incremental updates: change detection, pack merging and deltas.
//!
//! A pack records which conversations it was built from
//! ([`SOURCE_CONVERSATION_IDS_KEY`]) and their content fingerprints
//! ([`CONVERSATION_FINGERPRINTS_KEY`]). On the next export only the
//! conversations that are new or changed need to be extracted; the result is
//! then folded into the previous pack with [`merge_packs`].
//!
//! # Merge rules
//!
//! Projects are grouped by [`normalize_key`](crate::core::pack::normalize_key).
//! Within a group:
//!
//! | Field | Rule |
//! |-------|------|
//! | `name`, `description`, `current_status`, `last_discussed` | taken from the entry with the greatest `(last_discussed, name, description, status)` |
//! | `relevance_score` | maximum |
//! | `tech_stack`, `source_conversation_ids` | union |
//! | `key_challenges` | union, sorted |
//!
//! Groups whose keys the extractor's similarity rule links
//! ([`cluster_similar`](crate::core::pack::cluster_similar)) are then folded
//! the same way and named after the spelling used in the most conversations,
//! so merging per-export packs agrees with extracting all exports at once.
//!
//! Every rule is a maximum or a union over a key-sorted set, so project
//! merging does not depend on argument order.
//!
//! # Example
//!
//! ```
//! use ctxpack::core::incremental::merge_packs;
//! use ctxpack::core::pack::{ProjectBrief, UniversalContextPack};
//! use chrono::{TimeZone, Utc};
//!
//! let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
//! let previous = UniversalContextPack::new("chatgpt", at)
//!     .with_projects(vec![ProjectBrief::new("Alpha", 0.6, at)]);
//! let new = UniversalContextPack::new("chatgpt", at).with_projects(vec![
//!     ProjectBrief::new("Alpha", 0.8, at),
//!     ProjectBrief::new("Beta", 0.3, at),
//! ]);
//!
//! let merged = merge_packs(&previous, &new);
//! assert_eq!(merged.project("alpha").unwrap().relevance_score, 0.8);
//! assert_eq!(merged.project("beta").unwrap().relevance_score, 0.3);
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use crate::core::models::{Conversation, ParsedExport};
use crate::core::pack::{
    CONVERSATION_FINGERPRINTS_KEY, DEFAULT_SIMILARITY_THRESHOLD, ProjectBrief, SCHEMA_VERSION,
    SOURCE_CONVERSATION_IDS_KEY, TOTAL_CONVERSATIONS_KEY, TechnicalContext, UniversalContextPack,
    UserPreferences, UserProfile, cluster_similar, metadata_string_map, metadata_string_set,
    string_map_value, string_set_value,
};
use crate::message::Metadata;

/// Metadata key marking a pack as a delta.
pub const DELTA_KEY: &str = "delta";

/// Metadata key recording the `created_at` of the pack a delta was taken against.
pub const DELTA_BASE_KEY: &str = "delta_base_created_at";

/// Conversations whose id the previous pack has not seen, in source order.
pub fn detect_new_conversations<'a>(
    previous_metadata: &Metadata,
    export: &'a ParsedExport,
) -> Vec<&'a Conversation> {
    let seen = metadata_string_set(previous_metadata, SOURCE_CONVERSATION_IDS_KEY);
    export
        .conversations
        .iter()
        .filter(|c| !seen.contains(&c.id))
        .collect()
}

/// Conversations the previous pack has seen whose content changed since,
/// in source order.
///
/// Only conversations with a recorded fingerprint can be detected.
pub fn detect_updated_conversations<'a>(
    previous_metadata: &Metadata,
    export: &'a ParsedExport,
) -> Vec<&'a Conversation> {
    let fingerprints = metadata_string_map(previous_metadata, CONVERSATION_FINGERPRINTS_KEY);
    export
        .conversations
        .iter()
        .filter(|c| {
            fingerprints
                .get(&c.id)
                .is_some_and(|recorded| *recorded != c.fingerprint())
        })
        .collect()
}

/// Conversations that are new or updated, in source order.
pub fn detect_changed_conversations<'a>(
    previous_metadata: &Metadata,
    export: &'a ParsedExport,
) -> Vec<&'a Conversation> {
    let seen = metadata_string_set(previous_metadata, SOURCE_CONVERSATION_IDS_KEY);
    let fingerprints = metadata_string_map(previous_metadata, CONVERSATION_FINGERPRINTS_KEY);
    export
        .conversations
        .iter()
        .filter(|c| {
            !seen.contains(&c.id)
                || fingerprints
                    .get(&c.id)
                    .is_some_and(|recorded| *recorded != c.fingerprint())
        })
        .collect()
}

/// Merges two briefs of the same project.
pub fn merge_briefs(a: &ProjectBrief, b: &ProjectBrief) -> ProjectBrief {
    let rank = |p: &ProjectBrief| {
        (
            p.last_discussed,
            p.name.clone(),
            p.description.clone(),
            p.current_status,
        )
    };
    let (winner, other) = if rank(a) >= rank(b) { (a, b) } else { (b, a) };

    let mut merged = winner.clone();
    merged.relevance_score = winner.relevance_score.max(other.relevance_score);
    merged.tech_stack.extend(other.tech_stack.iter().cloned());
    merged
        .source_conversation_ids
        .extend(other.source_conversation_ids.iter().cloned());
    merged.key_challenges = winner
        .key_challenges
        .iter()
        .chain(&other.key_challenges)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    merged
}

/// Groups projects by key, then folds together keys the similarity rule links.
///
/// Clustering repeats until no two groups link, so the result never holds a
/// pair of projects extraction would have reported as one.
fn merge_projects(previous: &[ProjectBrief], new: &[ProjectBrief], threshold: f64) -> Vec<ProjectBrief> {
    let mut groups: BTreeMap<String, ProjectBrief> = BTreeMap::new();
    for project in previous.iter().chain(new) {
        let key = project.key();
        let merged = match groups.get(&key) {
            Some(existing) => merge_briefs(existing, project),
            None => merge_briefs(project, project),
        };
        groups.insert(key, merged);
    }

    loop {
        let briefs: Vec<ProjectBrief> = groups.into_values().collect();
        let keys: Vec<String> = briefs.iter().map(ProjectBrief::key).collect();
        let candidates: Vec<(&str, &BTreeSet<String>)> = keys
            .iter()
            .zip(&briefs)
            .map(|(key, brief)| (key.as_str(), &brief.tech_stack))
            .collect();
        let clusters = cluster_similar(&candidates, threshold);
        if clusters.len() == briefs.len() {
            return briefs;
        }
        groups = clusters
            .iter()
            .filter_map(|members| {
                let members: Vec<&ProjectBrief> = members.iter().map(|&i| &briefs[i]).collect();
                merge_cluster(&members).map(|merged| (merged.key(), merged))
            })
            .collect();
    }
}

/// Folds similar briefs into one, named after the most widely used spelling
/// (most conversations, then the longer name, then the smaller string).
fn merge_cluster(members: &[&ProjectBrief]) -> Option<ProjectBrief> {
    let (first, rest) = members.split_first()?;
    let mut merged = rest
        .iter()
        .fold(merge_briefs(first, first), |acc, brief| merge_briefs(&acc, brief));
    if let Some(representative) = members.iter().max_by(|a, b| {
        a.source_conversation_ids
            .len()
            .cmp(&b.source_conversation_ids.len())
            .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
            .then_with(|| b.name.cmp(&a.name))
    }) {
        merged.name.clone_from(&representative.name);
    }
    Some(merged)
}

fn merge_profiles(previous: &UserProfile, new: &UserProfile) -> UserProfile {
    let background_summary = if new.background_summary.len() > previous.background_summary.len()
        || (new.background_summary.len() == previous.background_summary.len()
            && new.background_summary > previous.background_summary)
    {
        new.background_summary.clone()
    } else {
        previous.background_summary.clone()
    };
    UserProfile {
        role: new.role.clone().or_else(|| previous.role.clone()),
        expertise_areas: previous
            .expertise_areas
            .union(&new.expertise_areas)
            .cloned()
            .collect(),
        background_summary,
    }
}

fn merge_preferences(previous: &UserPreferences, new: &UserPreferences) -> UserPreferences {
    let mut coding_style = previous.coding_style.clone();
    coding_style.extend(new.coding_style.clone());
    let mut work_patterns = previous.work_patterns.clone();
    work_patterns.extend(new.work_patterns.clone());
    UserPreferences {
        coding_style,
        communication_style: if new.communication_style.is_empty() {
            previous.communication_style.clone()
        } else {
            new.communication_style.clone()
        },
        preferred_tools: previous
            .preferred_tools
            .union(&new.preferred_tools)
            .cloned()
            .collect(),
        work_patterns,
    }
}

fn merge_technical(previous: &TechnicalContext, new: &TechnicalContext) -> TechnicalContext {
    let union = |a: &BTreeSet<String>, b: &BTreeSet<String>| a.union(b).cloned().collect();
    TechnicalContext {
        languages: union(&previous.languages, &new.languages),
        frameworks: union(&previous.frameworks, &new.frameworks),
        tools: union(&previous.tools, &new.tools),
        domains: union(&previous.domains, &new.domains),
    }
}

/// Folds `new` into `previous`, returning a new pack.
///
/// Profile role, communication style and overlapping preference entries come
/// from `new` when it has them; every set is unioned. Conversation ids and
/// fingerprints are unioned and `created_at` is the earlier of the two.
/// Metadata keys present in both packs take the value of the later-created
/// pack; packs created at the same instant keep the greater value.
///
/// Projects are linked with [`DEFAULT_SIMILARITY_THRESHOLD`]; use
/// [`merge_packs_with`] to match a tuned extractor.
pub fn merge_packs(previous: &UniversalContextPack, new: &UniversalContextPack) -> UniversalContextPack {
    merge_packs_with(previous, new, DEFAULT_SIMILARITY_THRESHOLD)
}

/// [`merge_packs`] with an explicit project similarity threshold.
#[instrument(skip_all, fields(previous = previous.projects.len(), new = new.projects.len()))]
pub fn merge_packs_with(
    previous: &UniversalContextPack,
    new: &UniversalContextPack,
    similarity_threshold: f64,
) -> UniversalContextPack {
    let new_wins = match previous.created_at.cmp(&new.created_at) {
        Ordering::Less => Some(true),
        Ordering::Greater => Some(false),
        Ordering::Equal => None,
    };

    let mut metadata = previous.metadata.clone();
    overlay(&mut metadata, &new.metadata, new_wins, ToString::to_string);
    metadata.remove(DELTA_KEY);
    metadata.remove(DELTA_BASE_KEY);

    let ids: BTreeSet<String> = previous
        .source_conversation_ids()
        .union(&new.source_conversation_ids())
        .cloned()
        .collect();
    let mut fingerprints = previous.conversation_fingerprints();
    overlay(&mut fingerprints, &new.conversation_fingerprints(), new_wins, Clone::clone);
    if !ids.is_empty() {
        metadata.insert(TOTAL_CONVERSATIONS_KEY.to_string(), ids.len().into());
        metadata.insert(SOURCE_CONVERSATION_IDS_KEY.to_string(), string_set_value(&ids));
    }
    if !fingerprints.is_empty() {
        metadata.insert(
            CONVERSATION_FINGERPRINTS_KEY.to_string(),
            string_map_value(&fingerprints),
        );
    }

    let merged = UniversalContextPack {
        version: SCHEMA_VERSION.to_string(),
        created_at: previous.created_at.min(new.created_at),
        source_platform: new.source_platform.clone(),
        user_profile: merge_profiles(&previous.user_profile, &new.user_profile),
        projects: Vec::new(),
        preferences: merge_preferences(&previous.preferences, &new.preferences),
        technical_context: merge_technical(&previous.technical_context, &new.technical_context),
        metadata,
    }
    .with_projects(merge_projects(
        &previous.projects,
        &new.projects,
        similarity_threshold,
    ));

    debug!(projects = merged.projects.len(), "merged packs");
    merged
}

/// Copies `other` into `base`. Colliding keys with different values go to
/// `other` when `other_wins` says so, else to the greater `rank`.
fn overlay<V: Clone + PartialEq>(
    base: &mut BTreeMap<String, V>,
    other: &BTreeMap<String, V>,
    other_wins: Option<bool>,
    rank: impl Fn(&V) -> String,
) {
    for (key, value) in other {
        let take = match base.get(key) {
            None => true,
            Some(existing) if existing == value => false,
            Some(existing) => other_wins.unwrap_or_else(|| rank(value) > rank(existing)),
        };
        if take {
            base.insert(key.clone(), value.clone());
        }
    }
}

fn changed_project(previous: Option<&ProjectBrief>, new: &ProjectBrief, threshold: f64) -> bool {
    match previous {
        None => true,
        Some(old) => {
            !new.tech_stack.is_subset(&old.tech_stack)
                || new.relevance_score - old.relevance_score > threshold
        }
    }
}

fn added(old: &BTreeSet<String>, new: &BTreeSet<String>) -> BTreeSet<String> {
    new.difference(old).cloned().collect()
}

fn changed_entries(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    new.iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Returns a pack holding only what `new` adds to `previous`.
///
/// A project appears when it is new, its tech stack grew, or its score rose
/// by more than `threshold`. Profile, preferences and technical context carry
/// only newly observed members. The result is marked with [`DELTA_KEY`].
#[instrument(skip_all, fields(threshold))]
pub fn compute_delta(
    previous: &UniversalContextPack,
    new: &UniversalContextPack,
    threshold: f64,
) -> UniversalContextPack {
    let old_projects: BTreeMap<String, &ProjectBrief> =
        previous.projects.iter().map(|p| (p.key(), p)).collect();
    let projects: Vec<ProjectBrief> = new
        .projects
        .iter()
        .filter(|p| changed_project(old_projects.get(&p.key()).copied(), p, threshold))
        .cloned()
        .collect();

    let old_profile = &previous.user_profile;
    let new_profile = &new.user_profile;
    let user_profile = UserProfile {
        role: new_profile
            .role
            .clone()
            .filter(|role| old_profile.role.as_ref() != Some(role)),
        expertise_areas: added(&old_profile.expertise_areas, &new_profile.expertise_areas),
        background_summary: if new_profile.background_summary == old_profile.background_summary {
            String::new()
        } else {
            new_profile.background_summary.clone()
        },
    };

    let old_prefs = &previous.preferences;
    let new_prefs = &new.preferences;
    let preferences = UserPreferences {
        coding_style: changed_entries(&old_prefs.coding_style, &new_prefs.coding_style),
        communication_style: if new_prefs.communication_style == old_prefs.communication_style {
            String::new()
        } else {
            new_prefs.communication_style.clone()
        },
        preferred_tools: added(&old_prefs.preferred_tools, &new_prefs.preferred_tools),
        work_patterns: changed_entries(&old_prefs.work_patterns, &new_prefs.work_patterns),
    };

    let old_tech = &previous.technical_context;
    let new_tech = &new.technical_context;
    let technical_context = TechnicalContext {
        languages: added(&old_tech.languages, &new_tech.languages),
        frameworks: added(&old_tech.frameworks, &new_tech.frameworks),
        tools: added(&old_tech.tools, &new_tech.tools),
        domains: added(&old_tech.domains, &new_tech.domains),
    };

    let new_ids = added(&previous.source_conversation_ids(), &new.source_conversation_ids());
    let mut metadata = Metadata::new();
    metadata.insert(DELTA_KEY.to_string(), true.into());
    metadata.insert(
        DELTA_BASE_KEY.to_string(),
        previous.created_at.to_rfc3339().into(),
    );
    metadata.insert(SOURCE_CONVERSATION_IDS_KEY.to_string(), string_set_value(&new_ids));

    debug!(projects = projects.len(), "computed delta");
    UniversalContextPack {
        version: SCHEMA_VERSION.to_string(),
        created_at: new.created_at,
        source_platform: new.source_platform.clone(),
        user_profile,
        projects: Vec::new(),
        preferences,
        technical_context,
        metadata,
    }
    .with_projects(projects)
}

/// Returns `true` if `pack` was produced by [`compute_delta`].
pub fn is_delta(pack: &UniversalContextPack) -> bool {
    pack.metadata
        .get(DELTA_KEY)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
