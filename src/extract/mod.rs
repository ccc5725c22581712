//! Context extraction: conversations in, [`UniversalContextPack`] out.
//!
//! Extraction is a two-phase fold over conversations:
//!
//! 1. [`ContextExtractor::discover`] collects project candidates (explicit
//!    statements in user messages and titles that recur across
//!    conversations).
//! 2. [`ContextExtractor::observe`] records mentions, technologies, challenges
//!    and user signals into an [`ExtractionState`].
//!
//! Both phases produce values with associative, commutative merges, so
//! [`ContextExtractor::extract_chunked`] returns exactly the pack
//! [`ContextExtractor::extract`] returns. [`ContextExtractor::finalize`] then
//! clusters similar candidates, scores them and derives the profile.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use ctxpack::config::ExtractorConfig;
//! use ctxpack::core::models::Conversation;
//! use ctxpack::extract::ContextExtractor;
//! use ctxpack::message::Message;
//!
//! # fn main() -> ctxpack::Result<()> {
//! let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
//! let conversations = vec![Conversation::new(
//!     "c1",
//!     "Planning",
//!     vec![Message::user("I'm building Carvis with Rust and Docker.", at)],
//! )];
//!
//! let extractor = ContextExtractor::new(ExtractorConfig::default())?;
//! let pack = extractor.extract(&conversations, at);
//!
//! let carvis = pack.project("carvis").unwrap();
//! assert!(carvis.tech_stack.contains("Rust"));
//! # Ok(())
//! # }
//! ```

pub mod rules;
pub mod scoring;
pub mod state;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info, instrument};

use crate::config::ExtractorConfig;
use crate::core::models::{Conversation, ParsedExport, SKIPPED_CONVERSATIONS_KEY};
use crate::core::pack::{
    CONVERSATION_FINGERPRINTS_KEY, ProjectBrief, ProjectStatus, SOURCE_CONVERSATION_IDS_KEY,
    TOTAL_CONVERSATIONS_KEY, TechnicalContext, UniversalContextPack, UserPreferences, UserProfile,
    cluster_similar, is_name_stop_word, name_tokens, normalize_key, string_map_value,
    string_set_value,
};
use crate::error::Result;

pub use rules::{RuleSpec, RuleTable, SignalHit, SignalKind};
pub use scoring::{RelevanceInputs, relevance_score};
pub use state::{Discovery, ExtractionState, ProjectStats};

/// Metadata key: format version of the export the pack was built from.
pub const SOURCE_FORMAT_VERSION_KEY: &str = "source_format_version";

const GENERIC_TITLES: &[&str] = &[
    "",
    "new chat",
    "new conversation",
    "untitled",
    "untitled conversation",
    "conversation",
    "chat",
    "help",
    "question",
];

const DESCRIPTION_MAX_CHARS: usize = 200;
const SUMMARY_HIGHLIGHTS: usize = 3;

/// Candidate project keys with a first-token index for phrase matching.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    keys: BTreeSet<String>,
    by_first: BTreeMap<String, Vec<Vec<String>>>,
}

impl CandidateIndex {
    pub fn new(keys: BTreeSet<String>) -> Self {
        let mut by_first: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for key in &keys {
            let tokens: Vec<String> = key.split(' ').map(ToString::to_string).collect();
            if let Some(first) = tokens.first() {
                by_first.entry(first.clone()).or_default().push(tokens);
            }
        }
        Self { keys, by_first }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys whose words appear contiguously in `text`.
    fn phrase_matches(&self, text: &str) -> BTreeSet<String> {
        let words = name_tokens(text);
        let mut found = BTreeSet::new();
        for (i, word) in words.iter().enumerate() {
            let Some(candidates) = self.by_first.get(word) else {
                continue;
            };
            for tokens in candidates {
                if words[i..].starts_with(tokens) {
                    found.insert(tokens.join(" "));
                }
            }
        }
        found
    }
}

/// Builds context packs from conversations.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    config: ExtractorConfig,
    rules: RuleTable,
}

impl ContextExtractor {
    /// Compiles the rule table (built-ins plus `config.extra_rules`).
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Config`](crate::CtxpackError::Config) if the
    /// configuration is invalid or an extra rule fails to compile.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        let rules = RuleTable::with_extra(&config.extra_rules)?;
        debug!(rules = rules.len(), "compiled extraction rules");
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Extracts a pack from `conversations` in one pass.
    #[instrument(skip_all, fields(conversations = conversations.len()))]
    pub fn extract(
        &self,
        conversations: &[Conversation],
        created_at: DateTime<Utc>,
    ) -> UniversalContextPack {
        let index = self.candidate_index(self.discover(conversations));
        let state = self.observe(conversations, &index);
        self.finalize(state, created_at)
    }

    /// Extracts a pack processing `chunk_size` conversations at a time.
    ///
    /// Returns the same pack as [`extract`](Self::extract) for any chunk size.
    #[instrument(skip_all, fields(conversations = conversations.len(), chunk_size = chunk_size))]
    pub fn extract_chunked(
        &self,
        conversations: &[Conversation],
        chunk_size: usize,
        created_at: DateTime<Utc>,
    ) -> UniversalContextPack {
        let chunk_size = chunk_size.max(1);
        let discovery = conversations
            .chunks(chunk_size)
            .map(|chunk| self.discover(chunk))
            .fold(Discovery::default(), Discovery::merge);
        let index = self.candidate_index(discovery);
        let state = conversations
            .chunks(chunk_size)
            .map(|chunk| self.observe(chunk, &index))
            .fold(ExtractionState::new(), ExtractionState::merge);
        self.finalize(state, created_at)
    }

    /// Extracts a pack from a parsed export, carrying over its skip count
    /// and format version.
    pub fn extract_export(
        &self,
        export: &ParsedExport,
        created_at: DateTime<Utc>,
    ) -> UniversalContextPack {
        let pack = self.extract(&export.conversations, created_at);
        annotate_export(pack, export)
    }

    /// Chunked counterpart of [`extract_export`](Self::extract_export).
    pub fn extract_export_chunked(
        &self,
        export: &ParsedExport,
        chunk_size: usize,
        created_at: DateTime<Utc>,
    ) -> UniversalContextPack {
        let pack = self.extract_chunked(&export.conversations, chunk_size, created_at);
        annotate_export(pack, export)
    }

    // ========================================================================
    // Phase one
    // ========================================================================

    /// Collects project candidates from `conversations`.
    pub fn discover(&self, conversations: &[Conversation]) -> Discovery {
        let mut discovery = Discovery::default();
        for conversation in conversations {
            if let Some(key) = self.title_key(&conversation.title) {
                *discovery.title_counts.entry(key).or_insert(0) += 1;
            }
            for message in conversation.user_messages() {
                for hit in self.rules.scan(&message.content) {
                    if hit.signal != SignalKind::Project {
                        continue;
                    }
                    if let Some(key) = self.accept_name(&hit.value) {
                        discovery.statement_keys.insert(key);
                    }
                }
            }
        }
        discovery
    }

    /// Normalized key for a project name, or `None` if the name is a
    /// technology or only filler words.
    fn accept_name(&self, name: &str) -> Option<String> {
        let key = normalize_key(name);
        if key.chars().count() < 2 || self.rules.is_vocabulary_term(&key) {
            return None;
        }
        if key.split(' ').all(is_name_stop_word) {
            return None;
        }
        Some(key)
    }

    fn title_key(&self, title: &str) -> Option<String> {
        let trimmed = title.trim();
        if GENERIC_TITLES.contains(&trimmed.to_lowercase().as_str()) {
            return None;
        }
        self.accept_name(trimmed)
    }

    fn candidate_index(&self, discovery: Discovery) -> CandidateIndex {
        let keys = discovery.candidates(self.config.min_title_recurrence);
        debug!(candidates = keys.len(), "discovered project candidates");
        CandidateIndex::new(keys)
    }

    // ========================================================================
    // Phase two
    // ========================================================================

    /// Records observations about `conversations` against `index`.
    pub fn observe(&self, conversations: &[Conversation], index: &CandidateIndex) -> ExtractionState {
        let mut state = ExtractionState::new();
        for conversation in conversations {
            self.observe_conversation(&mut state, conversation, index);
        }
        state
    }

    fn observe_conversation(
        &self,
        state: &mut ExtractionState,
        conversation: &Conversation,
        index: &CandidateIndex,
    ) {
        state
            .conversations
            .insert(conversation.id.clone(), conversation.fingerprint());

        for hit in self.rules.scan(&conversation.title) {
            if hit.signal.is_tech() || hit.signal == SignalKind::Domain {
                state.tally(hit.signal, &hit.value, hit.weight);
            }
        }

        let title = conversation.title.trim();
        let title_project = self.title_key(title).filter(|key| index.contains(key));

        for message in &conversation.messages {
            state.see(message.timestamp);
            if !message.is_user() {
                continue;
            }
            let at = message.timestamp;
            state.user_messages += 1;
            state.user_words += message.word_count() as u64;
            state.hours[at.hour() as usize] += 1;

            let mut tech = BTreeSet::new();
            let mut challenges = Vec::new();
            let mut status: Option<(usize, ProjectStatus)> = None;
            let mut statements: BTreeMap<String, (usize, String)> = BTreeMap::new();

            for hit in self.rules.scan(&message.content) {
                match hit.signal {
                    SignalKind::Language | SignalKind::Framework | SignalKind::Tool => {
                        state.tally(hit.signal, &hit.value, hit.weight);
                        tech.insert(hit.value);
                    }
                    SignalKind::Domain => state.tally(hit.signal, &hit.value, hit.weight),
                    SignalKind::Role => {
                        let role = Some((at, hit.value.to_lowercase()));
                        if role > state.role {
                            state.role = role;
                        }
                    }
                    SignalKind::Expertise => {
                        state.expertise.extend(self.canonical_expertise(&hit.value));
                    }
                    SignalKind::Project => {
                        let key = normalize_key(&hit.value);
                        if index.contains(&key) {
                            let entry = statements
                                .entry(key)
                                .or_insert((hit.start, hit.value.clone()));
                            if hit.start < entry.0 {
                                *entry = (hit.start, hit.value);
                            }
                        }
                    }
                    SignalKind::Challenge => challenges.push(hit.value),
                    SignalKind::Preference => {
                        if !hit.key.is_empty() {
                            *state
                                .preferences
                                .entry(hit.key)
                                .or_default()
                                .entry(hit.value)
                                .or_insert(0) += state::milli(hit.weight);
                        }
                    }
                    SignalKind::Status => {
                        if let Some(parsed) = parse_status(&hit.value) {
                            if status.is_none_or(|(start, _)| hit.start >= start) {
                                status = Some((hit.start, parsed));
                            }
                        }
                    }
                }
            }

            // Project key to the spelling this message votes for.
            let mut mentioned: BTreeMap<String, Option<String>> = statements
                .iter()
                .map(|(key, (_, surface))| (key.clone(), Some(surface.clone())))
                .collect();
            for key in index.phrase_matches(&message.content) {
                mentioned.entry(key).or_insert(None);
            }
            if let Some(key) = &title_project {
                mentioned
                    .entry(key.clone())
                    .or_insert_with(|| Some(title.to_string()));
            }

            let detail = message.content.chars().count() as u64;
            for (key, surface) in mentioned {
                let description = statements
                    .get(&key)
                    .map(|(start, _)| (at, sentence_around(&message.content, *start)));
                let stats = state
                    .projects
                    .entry(key)
                    .or_insert_with(|| ProjectStats::new(at));
                stats.first_seen = stats.first_seen.min(at);
                stats.last_seen = stats.last_seen.max(at);
                if let Some(surface) = surface {
                    *stats.surfaces.entry(surface).or_insert(0) += 1;
                }
                stats.mentions += 1;
                stats.conversations.insert(conversation.id.clone());
                stats.detail_chars += detail;
                stats.tech.extend(tech.iter().cloned());
                stats
                    .challenges
                    .extend(challenges.iter().map(|c| (at, c.clone())));
                if let Some((_, parsed)) = status {
                    let observed = Some((at, parsed));
                    if observed > stats.status {
                        stats.status = observed;
                    }
                }
                if let Some(description) = description {
                    if stats.description.as_ref().is_none_or(|d| description < *d) {
                        stats.description = Some(description);
                    }
                }
            }
        }
    }

    fn canonical_expertise(&self, stated: &str) -> BTreeSet<String> {
        let techs = self.rules.technologies_in(stated);
        if techs.is_empty() {
            BTreeSet::from([stated.trim().to_lowercase()])
        } else {
            techs
        }
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Turns an aggregated state into a pack.
    pub fn finalize(&self, state: ExtractionState, created_at: DateTime<Utc>) -> UniversalContextPack {
        let reference = state.latest.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let projects: Vec<ProjectBrief> = self
            .cluster_keys(&state.projects)
            .into_iter()
            .filter_map(|members| {
                let merged = members
                    .iter()
                    .filter_map(|key| state.projects.get(key).cloned())
                    .reduce(ProjectStats::merge)?;
                Some(self.brief(&members[0], merged, reference))
            })
            .collect();

        let technical_context = technical_context(&state);
        let user_profile = self.profile(&state);
        let preferences = self.preferences(&state);

        let ids: BTreeSet<String> = state.conversations.keys().cloned().collect();
        let mut pack = UniversalContextPack::new(self.config.source_platform.clone(), created_at)
            .with_projects(projects);
        pack.user_profile = user_profile;
        pack.preferences = preferences;
        pack.technical_context = technical_context;
        pack.metadata.insert(
            SOURCE_CONVERSATION_IDS_KEY.to_string(),
            string_set_value(&ids),
        );
        pack.metadata.insert(
            CONVERSATION_FINGERPRINTS_KEY.to_string(),
            string_map_value(&state.conversations),
        );
        pack.metadata.insert(
            TOTAL_CONVERSATIONS_KEY.to_string(),
            (state.conversation_count() as u64).into(),
        );

        info!(
            conversations = state.conversation_count(),
            projects = pack.projects.len(),
            "extracted context pack"
        );
        pack
    }

    /// Groups candidate keys whose projects look like the same thing.
    fn cluster_keys(&self, projects: &BTreeMap<String, ProjectStats>) -> Vec<Vec<String>> {
        let candidates: Vec<(&str, &BTreeSet<String>)> = projects
            .iter()
            .map(|(key, stats)| (key.as_str(), &stats.tech))
            .collect();
        cluster_similar(&candidates, self.config.similarity_threshold)
            .into_iter()
            .map(|members| members.into_iter().map(|i| candidates[i].0.to_string()).collect())
            .collect()
    }

    fn brief(&self, fallback_key: &str, stats: ProjectStats, reference: DateTime<Utc>) -> ProjectBrief {
        let inputs = RelevanceInputs::from_activity(
            stats.mentions,
            stats.last_seen,
            reference,
            stats.detail_chars,
        );
        let score = relevance_score(&inputs, &self.config.scoring);

        // Newest occurrence of each challenge, kept in chronological order.
        let mut seen = BTreeSet::new();
        let mut challenges: Vec<String> = stats
            .challenges
            .iter()
            .rev()
            .filter(|(_, text)| seen.insert(text.clone()))
            .take(self.config.max_challenges)
            .map(|(_, text)| text.clone())
            .collect();
        challenges.reverse();

        let description = match &stats.description {
            Some((_, text)) => text.clone(),
            None => fallback_description(&stats),
        };

        ProjectBrief {
            name: stats.display_name(fallback_key),
            description,
            tech_stack: stats.tech.clone(),
            key_challenges: challenges,
            current_status: stats.status.map(|(_, s)| s).unwrap_or_default(),
            last_discussed: stats.last_seen,
            relevance_score: score,
            source_conversation_ids: stats.conversations,
        }
    }

    fn profile(&self, state: &ExtractionState) -> UserProfile {
        let role = state.role.as_ref().map(|(_, role)| role.clone());

        let top = ranked(
            [SignalKind::Language, SignalKind::Framework]
                .iter()
                .filter_map(|s| state.tallies_for(*s))
                .flatten(),
        );
        let top: Vec<String> = top.into_iter().take(self.config.expertise_top_n).collect();

        let mut expertise_areas = state.expertise.clone();
        expertise_areas.extend(top.iter().cloned());

        let mut highlights = top;
        for stated in &state.expertise {
            if !highlights.contains(stated) {
                highlights.push(stated.clone());
            }
        }
        highlights.truncate(SUMMARY_HIGHLIGHTS);

        let domains = ranked(state.tallies_for(SignalKind::Domain).into_iter().flatten());
        UserProfile {
            background_summary: background_summary(role.as_deref(), &highlights, &domains),
            role,
            expertise_areas,
        }
    }

    fn preferences(&self, state: &ExtractionState) -> UserPreferences {
        let mut coding_style: BTreeMap<String, String> = state
            .preferences
            .iter()
            .filter_map(|(key, votes)| {
                ranked(votes.iter())
                    .into_iter()
                    .next()
                    .map(|winner| (key.clone(), winner))
            })
            .collect();
        if let Some(language) = state
            .tallies_for(SignalKind::Language)
            .and_then(|t| ranked(t.iter()).into_iter().next())
        {
            coding_style.insert("primary_language".to_string(), language);
        }

        let communication_style = if state.user_messages == 0 {
            String::new()
        } else {
            let average = state.user_words as f64 / state.user_messages as f64;
            if average > 50.0 {
                "Detailed and thorough"
            } else if average > 20.0 {
                "Clear and comprehensive"
            } else {
                "Concise and direct"
            }
            .to_string()
        };

        let threshold = u64::from(self.config.preferred_tool_min_mentions) * 1000;
        let preferred_tools = state
            .tallies_for(SignalKind::Tool)
            .map(|tools| {
                tools
                    .iter()
                    .filter(|(_, n)| **n >= threshold.max(1))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut work_patterns = BTreeMap::new();
        if state.user_messages > 0 {
            let peak = (0..24usize)
                .max_by(|a, b| state.hours[*a].cmp(&state.hours[*b]).then_with(|| b.cmp(a)))
                .unwrap_or(0);
            let schedule = match peak {
                9..=17 => "business_hours",
                18..=23 => "evening",
                _ => "flexible",
            };
            work_patterns.insert("work_schedule".to_string(), schedule.to_string());
            work_patterns.insert("peak_hour".to_string(), format!("{peak:02}:00"));
        }
        if !state.conversations.is_empty() {
            let frequency = match state.conversation_count() {
                n if n > 100 => "heavy",
                n if n > 20 => "regular",
                _ => "occasional",
            };
            work_patterns.insert("usage_frequency".to_string(), frequency.to_string());
        }

        UserPreferences {
            coding_style,
            communication_style,
            preferred_tools,
            work_patterns,
        }
    }
}

/// Copies export-level facts (skip count, format version) onto the pack.
fn annotate_export(mut pack: UniversalContextPack, export: &ParsedExport) -> UniversalContextPack {
    let skipped = export.skipped_conversations();
    if skipped > 0 {
        pack.metadata
            .insert(SKIPPED_CONVERSATIONS_KEY.to_string(), skipped.into());
    }
    pack.metadata.insert(
        SOURCE_FORMAT_VERSION_KEY.to_string(),
        export.format_version.clone().into(),
    );
    pack
}

fn technical_context(state: &ExtractionState) -> TechnicalContext {
    let names = |signal| -> BTreeSet<String> {
        state
            .tallies_for(signal)
            .map(|t| {
                t.iter()
                    .filter(|(_, n)| **n > 0)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    };
    TechnicalContext {
        languages: names(SignalKind::Language),
        frameworks: names(SignalKind::Framework),
        tools: names(SignalKind::Tool),
        domains: names(SignalKind::Domain),
    }
}

/// Names ordered by tally descending, then name ascending.
fn ranked<'a>(tallies: impl Iterator<Item = (&'a String, &'a u64)>) -> Vec<String> {
    let mut entries: Vec<(&String, u64)> = tallies
        .filter(|(_, n)| **n > 0)
        .map(|(name, n)| (name, *n))
        .collect();
    entries.sort_by(|(a, na), (b, nb)| nb.cmp(na).then_with(|| a.cmp(b)));
    entries.into_iter().map(|(name, _)| name.clone()).collect()
}

fn parse_status(value: &str) -> Option<ProjectStatus> {
    match value {
        "active" => Some(ProjectStatus::Active),
        "paused" => Some(ProjectStatus::Paused),
        "completed" => Some(ProjectStatus::Completed),
        _ => None,
    }
}

/// The sentence of `text` containing byte offset `start`.
fn sentence_around(text: &str, start: usize) -> String {
    let is_end = |c: char| matches!(c, '.' | '!' | '?' | '\n');
    let start = start.min(text.len());
    let begin = text[..start]
        .char_indices()
        .rev()
        .find(|(_, c)| is_end(*c))
        .map_or(0, |(i, c)| i + c.len_utf8());
    let end = text[start..]
        .char_indices()
        .find(|(_, c)| is_end(*c))
        .map_or(text.len(), |(i, c)| start + i + c.len_utf8());
    let sentence = text[begin..end].trim();
    if sentence.chars().count() > DESCRIPTION_MAX_CHARS {
        let cut: String = sentence.chars().take(DESCRIPTION_MAX_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    } else {
        sentence.to_string()
    }
}

fn fallback_description(stats: &ProjectStats) -> String {
    if stats.tech.is_empty() {
        let n = stats.conversations.len();
        let noun = if n == 1 { "conversation" } else { "conversations" };
        format!("Discussed in {n} {noun}")
    } else {
        let tech: Vec<&str> = stats.tech.iter().take(3).map(String::as_str).collect();
        format!("Project involving {}", tech.join(", "))
    }
}

fn background_summary(role: Option<&str>, highlights: &[String], domains: &[String]) -> String {
    let mut sentences = Vec::new();
    let expertise = highlights.join(", ");
    match (role, highlights.is_empty()) {
        (Some(role), false) => sentences.push(format!(
            "Works as {} {role} with expertise in {expertise}.",
            article(role)
        )),
        (Some(role), true) => sentences.push(format!("Works as {} {role}.", article(role))),
        (None, false) => sentences.push(format!("Has expertise in {expertise}.")),
        (None, true) => {}
    }
    if !domains.is_empty() {
        let focus: Vec<&str> = domains.iter().take(3).map(String::as_str).collect();
        sentences.push(format!("Focus areas: {}.", focus.join(", ")));
    }
    sentences.join(" ")
}

fn article(word: &str) -> &'static str {
    match word.chars().next() {
        Some(c) if "aeiou".contains(c.to_ascii_lowercase()) => "an",
        _ => "a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn conv(id: &str, title: &str, day: u32, texts: &[&str]) -> Conversation {
        let mut messages = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let ts = at(day, 10) + chrono::Duration::minutes(i as i64 * 2);
            messages.push(Message::user(*text, ts));
            messages.push(Message::assistant("Sure, here is how.", ts + chrono::Duration::minutes(1)));
        }
        Conversation::new(id, title, messages)
    }

    fn extractor() -> ContextExtractor {
        ContextExtractor::new(ExtractorConfig::default()).unwrap()
    }

    fn fixture() -> Vec<Conversation> {
        vec![
            conv(
                "c1",
                "Alpha planning",
                1,
                &[
                    "I'm building Project Alpha with Rust and Docker.",
                    "Alpha keeps failing when the cache warms up",
                ],
            ),
            conv("c2", "Misc", 20, &["Status of Project Alpha: we shipped it"]),
            conv(
                "c3",
                "Budget Tracker",
                3,
                &["How do I sum a column in pandas?", "I follow TDD for this."],
            ),
            conv("c4", "Budget Tracker", 5, &["Add a chart with Python please"]),
            conv("c5", "New chat", 6, &["I am a data scientist."]),
        ]
    }

    #[test]
    fn test_project_from_statement() {
        let pack = extractor().extract(&fixture(), at(25, 0));
        let alpha = pack.project("alpha").expect("alpha extracted");

        assert!(alpha.tech_stack.contains("Rust"));
        assert!(alpha.tech_stack.contains("Docker"));
        assert_eq!(alpha.current_status, ProjectStatus::Completed);
        assert_eq!(alpha.last_discussed, at(20, 10));
        assert!(
            alpha
                .key_challenges
                .iter()
                .any(|c| c.contains("keeps failing when the cache warms up"))
        );
        let ids: Vec<_> = alpha.source_conversation_ids.iter().cloned().collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(alpha.description.contains("Alpha"));
        assert!((0.0..=1.0).contains(&alpha.relevance_score));
    }

    #[test]
    fn test_recurring_title_becomes_project() {
        let pack = extractor().extract(&fixture(), at(25, 0));
        let budget = pack.project("Budget Tracker").expect("title cluster");
        assert_eq!(budget.name, "Budget Tracker");
        assert_eq!(budget.source_conversation_ids.len(), 2);
        assert!(budget.tech_stack.contains("pandas"));
        assert!(budget.tech_stack.contains("Python"));

        assert!(pack.project("Misc").is_none());
        assert!(pack.project("New chat").is_none());
    }

    #[test]
    fn test_technology_names_are_not_projects() {
        let conversations = vec![conv("c1", "Scripts", 1, &["I'm working on Python scripts"])];
        let pack = extractor().extract(&conversations, at(2, 0));
        assert!(pack.projects.is_empty());
        assert!(pack.technical_context.languages.contains("Python"));
    }

    #[test]
    fn test_similar_candidates_merge() {
        let conversations = vec![
            conv("c1", "One", 1, &["I'm building Carvis with Rust and Tokio."]),
            conv(
                "c2",
                "Two",
                2,
                &["We also have a library called Carvis Core in Rust with Tokio."],
            ),
        ];
        let pack = extractor().extract(&conversations, at(3, 0));
        assert_eq!(pack.projects.len(), 1, "{:?}", pack.projects);
        assert_eq!(pack.projects[0].name, "Carvis Core");
        assert_eq!(pack.projects[0].source_conversation_ids.len(), 2);
    }

    #[test]
    fn test_chunked_equals_whole() {
        let conversations = fixture();
        let ex = extractor();
        let whole = ex.extract(&conversations, at(25, 0));
        for chunk_size in [0, 1, 2, 3, 10] {
            let chunked = ex.extract_chunked(&conversations, chunk_size, at(25, 0));
            assert_eq!(whole, chunked, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_profile_and_preferences() {
        let pack = extractor().extract(&fixture(), at(25, 0));

        assert_eq!(pack.user_profile.role.as_deref(), Some("data scientist"));
        assert!(pack.user_profile.expertise_areas.contains("Rust"));
        assert!(pack.user_profile.background_summary.starts_with("Works as a data scientist"));

        let prefs = &pack.preferences;
        assert_eq!(
            prefs.coding_style.get("testing_approach").map(String::as_str),
            Some("test-driven")
        );
        assert_eq!(prefs.communication_style, "Concise and direct");
        assert!(prefs.preferred_tools.contains("Docker"));
        assert_eq!(
            prefs.work_patterns.get("work_schedule").map(String::as_str),
            Some("business_hours")
        );
        assert_eq!(
            prefs.work_patterns.get("usage_frequency").map(String::as_str),
            Some("occasional")
        );
    }

    #[test]
    fn test_latest_role_wins() {
        let conversations = vec![
            conv("c1", "A", 1, &["I'm a junior developer"]),
            conv("c2", "B", 9, &["I'm a senior backend engineer now"]),
        ];
        let pack = extractor().extract(&conversations, at(10, 0));
        assert_eq!(pack.user_profile.role.as_deref(), Some("senior backend engineer"));
    }

    #[test]
    fn test_metadata_records_sources() {
        let pack = extractor().extract(&fixture(), at(25, 0));
        assert_eq!(pack.source_conversation_ids().len(), 5);
        assert_eq!(pack.conversation_fingerprints().len(), 5);
        assert_eq!(pack.metadata[TOTAL_CONVERSATIONS_KEY], 5);
        assert_eq!(pack.created_at, at(25, 0));
    }

    #[test]
    fn test_empty_input() {
        let pack = extractor().extract(&[], at(1, 0));
        assert!(pack.projects.is_empty());
        assert!(pack.user_profile.background_summary.is_empty());
        assert!(pack.preferences.is_empty());
        assert!(pack.validate().is_ok());
    }

    #[test]
    fn test_extract_export_carries_skip_count() {
        let mut export = ParsedExport::new("2024-01-01", fixture());
        export
            .metadata
            .insert(SKIPPED_CONVERSATIONS_KEY.to_string(), 2.into());
        let pack = extractor().extract_export(&export, at(25, 0));
        assert_eq!(pack.metadata[SKIPPED_CONVERSATIONS_KEY], 2);
        assert_eq!(pack.metadata[SOURCE_FORMAT_VERSION_KEY], "2024-01-01");
    }

    #[test]
    fn test_extra_rule_from_config() {
        let config = ExtractorConfig::default()
            .with_rule(RuleSpec::new(r"(?i)\bzig\b", SignalKind::Language, "Zig"));
        let ex = ContextExtractor::new(config).unwrap();
        let pack = ex.extract(&[conv("c1", "t", 1, &["trying zig today"])], at(2, 0));
        assert!(pack.technical_context.languages.contains("Zig"));
    }

    #[test]
    fn test_sentence_around() {
        let text = "First part. I'm building Carvis now! Later text";
        let start = text.find("I'm").unwrap();
        assert_eq!(sentence_around(text, start), "I'm building Carvis now!");

        let long = "x".repeat(500);
        assert_eq!(sentence_around(&long, 0).chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn test_phrase_matches() {
        let index = CandidateIndex::new(
            ["flight log".to_string(), "alpha".to_string()].into_iter().collect(),
        );
        let found = index.phrase_matches("the Flight Log crashed, unlike alpha.");
        assert!(found.contains("flight log"));
        assert!(found.contains("alpha"));
        assert!(index.phrase_matches("log flight").is_empty());
    }
}
