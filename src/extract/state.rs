//! Associative aggregation state for extraction.
//!
//! Extraction runs in two phases. [`Discovery`] collects project candidate
//! keys; [`ExtractionState`] then accumulates everything observed about those
//! candidates and about the user. Both types only ever sum counters, take
//! minima/maxima and union sets, so `merge` is associative and commutative
//! and any chunking of the conversation list folds to the same state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::core::pack::ProjectStatus;
use crate::extract::rules::SignalKind;

/// Weights are accumulated as integer thousandths so sums stay exact.
pub(crate) fn milli(weight: f64) -> u64 {
    (weight * 1000.0).round().max(0.0) as u64
}

fn add_tally(into: &mut BTreeMap<String, u64>, from: BTreeMap<String, u64>) {
    for (k, v) in from {
        *into.entry(k).or_insert(0) += v;
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

// ============================================================================
// Phase one: candidate discovery
// ============================================================================

/// Project candidate keys found by statements and recurring titles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub(crate) statement_keys: BTreeSet<String>,
    pub(crate) title_counts: BTreeMap<String, u32>,
}

impl Discovery {
    #[must_use]
    pub fn merge(mut self, other: Discovery) -> Discovery {
        self.statement_keys.extend(other.statement_keys);
        for (k, v) in other.title_counts {
            *self.title_counts.entry(k).or_insert(0) += v;
        }
        self
    }

    /// Final candidate set: every statement key plus titles seen at least
    /// `min_title_recurrence` times.
    pub fn candidates(&self, min_title_recurrence: usize) -> BTreeSet<String> {
        let mut keys = self.statement_keys.clone();
        keys.extend(
            self.title_counts
                .iter()
                .filter(|(_, n)| **n as usize >= min_title_recurrence)
                .map(|(k, _)| k.clone()),
        );
        keys
    }
}

// ============================================================================
// Phase two: observations
// ============================================================================

/// Everything observed about one project candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStats {
    /// Surface spellings and how often each was used.
    pub surfaces: BTreeMap<String, u32>,
    pub mentions: u32,
    pub conversations: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub detail_chars: u64,
    pub tech: BTreeSet<String>,
    pub challenges: BTreeSet<(DateTime<Utc>, String)>,
    pub status: Option<(DateTime<Utc>, ProjectStatus)>,
    pub description: Option<(DateTime<Utc>, String)>,
}

impl ProjectStats {
    pub(crate) fn new(at: DateTime<Utc>) -> Self {
        Self {
            surfaces: BTreeMap::new(),
            mentions: 0,
            conversations: BTreeSet::new(),
            first_seen: at,
            last_seen: at,
            detail_chars: 0,
            tech: BTreeSet::new(),
            challenges: BTreeSet::new(),
            status: None,
            description: None,
        }
    }

    #[must_use]
    pub fn merge(mut self, other: ProjectStats) -> ProjectStats {
        for (surface, n) in other.surfaces {
            *self.surfaces.entry(surface).or_insert(0) += n;
        }
        self.mentions += other.mentions;
        self.conversations.extend(other.conversations);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        self.detail_chars += other.detail_chars;
        self.tech.extend(other.tech);
        self.challenges.extend(other.challenges);
        self.status = max_opt(self.status, other.status);
        self.description = min_opt(self.description, other.description);
        self
    }

    /// Most used spelling; ties go to the longer, then the smaller string.
    pub fn display_name(&self, fallback: &str) -> String {
        self.surfaces
            .iter()
            .max_by(|(a, na), (b, nb)| {
                na.cmp(nb)
                    .then_with(|| a.chars().count().cmp(&b.chars().count()))
                    .then_with(|| b.cmp(a))
            })
            .map(|(s, _)| s.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Aggregated observations over a set of conversations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionState {
    pub(crate) projects: BTreeMap<String, ProjectStats>,
    /// Tech and domain tallies in thousandths of a hit.
    pub(crate) tallies: BTreeMap<SignalKind, BTreeMap<String, u64>>,
    pub(crate) role: Option<(DateTime<Utc>, String)>,
    pub(crate) expertise: BTreeSet<String>,
    pub(crate) preferences: BTreeMap<String, BTreeMap<String, u64>>,
    pub(crate) user_messages: u64,
    pub(crate) user_words: u64,
    pub(crate) hours: [u64; 24],
    /// Conversation id to content fingerprint.
    pub(crate) conversations: BTreeMap<String, String>,
    pub(crate) latest: Option<DateTime<Utc>>,
}

impl ExtractionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `other` into `self`.
    #[must_use]
    pub fn merge(mut self, other: ExtractionState) -> ExtractionState {
        for (key, stats) in other.projects {
            let merged = match self.projects.remove(&key) {
                Some(existing) => existing.merge(stats),
                None => stats,
            };
            self.projects.insert(key, merged);
        }
        for (signal, tally) in other.tallies {
            add_tally(self.tallies.entry(signal).or_default(), tally);
        }
        self.role = max_opt(self.role, other.role);
        self.expertise.extend(other.expertise);
        for (key, votes) in other.preferences {
            add_tally(self.preferences.entry(key).or_default(), votes);
        }
        self.user_messages += other.user_messages;
        self.user_words += other.user_words;
        for (slot, n) in self.hours.iter_mut().zip(other.hours) {
            *slot += n;
        }
        self.conversations.extend(other.conversations);
        self.latest = max_opt(self.latest, other.latest);
        self
    }

    pub(crate) fn tally(&mut self, signal: SignalKind, value: &str, weight: f64) {
        *self
            .tallies
            .entry(signal)
            .or_default()
            .entry(value.to_string())
            .or_insert(0) += milli(weight);
    }

    pub(crate) fn tallies_for(&self, signal: SignalKind) -> Option<&BTreeMap<String, u64>> {
        self.tallies.get(&signal)
    }

    pub(crate) fn see(&mut self, at: DateTime<Utc>) {
        self.latest = max_opt(self.latest, Some(at));
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}
