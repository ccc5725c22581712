//! Gemini formatter.
//!
//! Renders Gem instructions, which Gemini caps at a fixed number of
//! characters. Projects are added in pack order (relevance, then recency)
//! as whole blocks until the next one would overflow; the rest are named in
//! an omission line and counted in the bundle metadata.

use tracing::{debug, instrument, warn};

use crate::config::GeminiConfig;
use crate::core::pack::{ProjectBrief, UniversalContextPack};
use crate::error::{CtxpackError, Result};
use crate::format::TargetPlatform;

use super::{
    Artifact, ArtifactBundle, PlatformFormatter, SETUP_INSTRUCTIONS_FILE, SizeCheck, char_len,
    join, source_name,
};

/// File name of the Gem instructions.
pub const GEMINI_INSTRUCTIONS_FILE: &str = "gemini_gem_instructions.txt";

/// File name of the one-paragraph Gem description.
pub const GEM_DESCRIPTION_FILE: &str = "gem_description.txt";

/// Metadata key set on packs and bundles whose projects were cut to fit.
pub const PRIORITIZED_KEY: &str = "prioritized";

/// Metadata key holding how many projects were left out.
pub const OMITTED_PROJECTS_KEY: &str = "omitted_projects";

const PREAMBLE: &str = "You are my personal technical assistant and pair programmer. \
Use the following context about my skills, active projects, and preferences to tailor \
all your responses to my specific situation.";

const HOW_TO_ASSIST: &str = "## How to Assist
- Reference my specific projects and tech stack when relevant
- Provide solutions aligned with my expertise level
- Be concise and actionable
- When I mention a project by name, recall its context
- Suggest improvements based on my preferred tools and patterns";

/// Formatter for Google Gemini Gems.
#[derive(Debug, Clone, Default)]
pub struct GeminiFormatter {
    config: GeminiConfig,
}

impl GeminiFormatter {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }

    pub fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    /// Returns a copy of `pack` holding the longest prefix of its projects
    /// that renders within `max_size` characters.
    ///
    /// Projects are taken greedily in pack order, stopping at the first that
    /// does not fit. When projects are dropped the copy records
    /// [`PRIORITIZED_KEY`] and [`OMITTED_PROJECTS_KEY`], and formatting it
    /// reproduces the same omission line. The prefix is deterministic but
    /// not necessarily the subset that packs the most projects.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::SizeLimitExceeded`] if the instructions do not
    /// fit even without any project.
    pub fn prioritize_content(&self, pack: &UniversalContextPack, max_size: usize) -> Result<UniversalContextPack> {
        let already_omitted = omitted_projects(pack);
        let kept = self.fitting_prefix(pack, already_omitted, max_size)?;
        let mut prioritized = pack.clone();
        if kept < pack.projects.len() {
            prioritized.projects.truncate(kept);
            let omitted = already_omitted + (pack.projects.len() - kept);
            prioritized.metadata.insert(PRIORITIZED_KEY.to_string(), true.into());
            prioritized
                .metadata
                .insert(OMITTED_PROJECTS_KEY.to_string(), omitted.into());
        }
        Ok(prioritized)
    }

    /// Number of leading projects that fit, or an error if none can.
    fn fitting_prefix(&self, pack: &UniversalContextPack, already_omitted: usize, max_size: usize) -> Result<usize> {
        let total = pack.projects.len();
        let fits = |kept: usize| {
            let text = render(pack, kept, already_omitted + total - kept);
            let len = char_len(&text);
            (len <= max_size, len)
        };

        if fits(total).0 {
            return Ok(total);
        }
        let (skeleton_fits, skeleton_len) = fits(0);
        if !skeleton_fits {
            return Err(CtxpackError::SizeLimitExceeded {
                what: "Gemini instructions",
                actual: skeleton_len,
                max: max_size,
            });
        }
        let mut kept = 0;
        while kept < total && fits(kept + 1).0 {
            kept += 1;
        }
        debug!(kept, total, max_size, "selected project prefix");
        Ok(kept)
    }

    fn gem_description(&self, pack: &UniversalContextPack) -> String {
        let mut parts = Vec::new();
        match &pack.user_profile.role {
            Some(role) => parts.push(format!("Technical assistant for a {role}")),
            None => parts.push("Personal dev partner".to_string()),
        }
        let languages: Vec<&str> = pack
            .technical_context
            .languages
            .iter()
            .take(4)
            .map(String::as_str)
            .collect();
        if !languages.is_empty() {
            parts.push(format!("with expertise in {}.", languages.join(", ")));
        } else if let Some(last) = parts.last_mut() {
            last.push('.');
        }
        let total = pack.projects.len() + omitted_projects(pack);
        if total > 0 {
            let notable: Vec<&str> = pack.projects.iter().take(2).map(|p| p.name.as_str()).collect();
            let noun = if total == 1 { "project" } else { "projects" };
            parts.push(format!(
                "Knows {total} {noun}, including {}.",
                notable.join(" and ")
            ));
        }
        parts.push(format!("Imported from {} history.", source_name(pack)));
        parts.join(" ")
    }

    fn setup_instructions(&self, description: &str) -> String {
        format!(
            "# How to Create Your Gemini Gem

Gems are custom Gemini personas that keep your context across conversations.

## Step 1: Open the Gem manager
1. Go to https://gemini.google.com
2. Open **Gem manager** in the sidebar
3. Click **New Gem**

## Step 2: Configure the Gem

### Name
```
{name}
```

### Description
Copy `{description_file}` or use:
```
{description}
```

### Instructions
Paste the entire contents of `{instructions_file}` into the Instructions field.

## Step 3: Save and test
1. Click **Save**
2. Open the new Gem from the sidebar
3. Ask it \"What projects am I working on?\" and \"What's my tech stack?\"

## Updating
After a new export, re-run ctxpack and replace the Instructions with the new file.
",
            name = self.config.gem_name,
            description_file = GEM_DESCRIPTION_FILE,
            instructions_file = GEMINI_INSTRUCTIONS_FILE,
        )
    }
}

impl PlatformFormatter for GeminiFormatter {
    fn target(&self) -> TargetPlatform {
        TargetPlatform::Gemini
    }

    #[instrument(skip_all, fields(projects = pack.projects.len(), max_chars = self.config.max_chars))]
    fn format(&self, pack: &UniversalContextPack) -> Result<ArtifactBundle> {
        let prioritized = self.prioritize_content(pack, self.config.max_chars)?;
        let omitted = omitted_projects(&prioritized);
        let instructions = render(&prioritized, prioritized.projects.len(), omitted);
        if prioritized.projects.len() < pack.projects.len() {
            warn!(
                kept = prioritized.projects.len(),
                omitted,
                "projects omitted to fit the Gemini size limit"
            );
        }

        let description = self.gem_description(&prioritized);
        let mut bundle = ArtifactBundle::new(
            TargetPlatform::Gemini,
            Artifact::new(GEMINI_INSTRUCTIONS_FILE, instructions.as_str()),
        )
        .with_artifact(Artifact::new(GEM_DESCRIPTION_FILE, description.as_str()))
        .with_artifact(Artifact::new(SETUP_INSTRUCTIONS_FILE, self.setup_instructions(&description)));

        bundle.test_commands = [
            "What projects am I working on?",
            "What programming languages do I use?",
            "What are my preferred development tools?",
        ]
        .iter()
        .map(|q| format!("Ask your Gem: \"{q}\""))
        .collect();
        bundle
            .metadata
            .insert("text_length".to_string(), char_len(&instructions).into());
        bundle
            .metadata
            .insert("included_projects".to_string(), prioritized.projects.len().into());
        bundle
            .metadata
            .insert(OMITTED_PROJECTS_KEY.to_string(), omitted.into());
        bundle
            .metadata
            .insert(PRIORITIZED_KEY.to_string(), (omitted > 0).into());
        Ok(bundle)
    }

    fn check_size_limits(&self, text: &str) -> SizeCheck {
        SizeCheck::measure(text, self.config.max_chars)
    }
}

fn omitted_projects(pack: &UniversalContextPack) -> usize {
    pack.metadata
        .get(OMITTED_PROJECTS_KEY)
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize
}

fn project_block(project: &ProjectBrief) -> String {
    let mut block = format!("### {} ({})", project.name, project.current_status);
    if !project.description.is_empty() {
        block.push('\n');
        block.push_str(&project.description);
    }
    if !project.tech_stack.is_empty() {
        block.push_str(&format!("\nTech: {}", join(&project.tech_stack, ", ")));
    }
    if !project.key_challenges.is_empty() {
        block.push_str(&format!("\nChallenges: {}", project.key_challenges.join("; ")));
    }
    block.push_str(&format!(
        "\nLast discussed: {}",
        project.last_discussed.format("%Y-%m-%d")
    ));
    block
}

/// Renders the instructions with the first `kept` projects and an omission
/// line for `omitted` more.
fn render(pack: &UniversalContextPack, kept: usize, omitted: usize) -> String {
    let mut sections = vec![PREAMBLE.to_string()];

    let profile = &pack.user_profile;
    if profile.role.is_some() || !profile.expertise_areas.is_empty() || !profile.background_summary.is_empty() {
        let mut about = String::from("## About the User");
        if let Some(role) = &profile.role {
            about.push_str(&format!("\nRole: {role}"));
        }
        if !profile.background_summary.is_empty() {
            about.push_str(&format!("\nBackground: {}", profile.background_summary));
        }
        if !profile.expertise_areas.is_empty() {
            about.push_str(&format!("\nExpertise: {}", join(&profile.expertise_areas, ", ")));
        }
        sections.push(about);
    }

    if kept > 0 || omitted > 0 {
        let mut projects = String::from("## Active Projects");
        for project in pack.projects.iter().take(kept) {
            projects.push_str("\n\n");
            projects.push_str(&project_block(project));
        }
        if omitted > 0 {
            let noun = if omitted == 1 { "project" } else { "projects" };
            projects.push_str(&format!("\n\n... and {omitted} more {noun} omitted"));
        }
        sections.push(projects);
    }

    let tech = &pack.technical_context;
    if !tech.is_empty() {
        let mut stack = String::from("## Technical Stack");
        for (label, items) in tech.categories() {
            if !items.is_empty() {
                stack.push_str(&format!("\n{label}: {}", join(items, ", ")));
            }
        }
        sections.push(stack);
    }

    let prefs = &pack.preferences;
    if !prefs.is_empty() {
        let mut section = String::from("## Preferences");
        if !prefs.communication_style.is_empty() {
            section.push_str(&format!("\nCommunication: {}", prefs.communication_style));
        }
        if !prefs.coding_style.is_empty() {
            let items = prefs.coding_style.iter().map(|(k, v)| format!("{k}: {v}"));
            section.push_str(&format!("\nCoding style: {}", join(items, "; ")));
        }
        if !prefs.preferred_tools.is_empty() {
            section.push_str(&format!("\nPreferred tools: {}", join(&prefs.preferred_tools, ", ")));
        }
        if !prefs.work_patterns.is_empty() {
            let items = prefs.work_patterns.iter().map(|(k, v)| format!("{k}: {v}"));
            section.push_str(&format!("\nWork patterns: {}", join(items, "; ")));
        }
        sections.push(section);
    }

    sections.push(HOW_TO_ASSIST.to_string());
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
    }

    fn project(name: &str, score: f64, description_len: usize) -> ProjectBrief {
        ProjectBrief::new(name, score, at(1))
            .with_description("x".repeat(description_len))
            .with_tech(["Rust"])
    }

    fn formatter(max_chars: usize) -> GeminiFormatter {
        GeminiFormatter::new(GeminiConfig {
            max_chars,
            ..GeminiConfig::default()
        })
    }

    fn pack_with(projects: Vec<ProjectBrief>) -> UniversalContextPack {
        let mut pack = UniversalContextPack::new("chatgpt", at(2)).with_projects(projects);
        pack.user_profile.role = Some("backend developer".to_string());
        pack.technical_context.languages.insert("Rust".to_string());
        pack.preferences.communication_style = "concise".to_string();
        pack
    }

    #[test]
    fn test_sections_in_order() {
        let pack = pack_with(vec![project("Alpha", 0.9, 20)]);
        let bundle = formatter(32_000).format(&pack).unwrap();
        let text = &bundle.primary().content;

        let about = text.find("## About the User").unwrap();
        let projects = text.find("## Active Projects").unwrap();
        let stack = text.find("## Technical Stack").unwrap();
        let prefs = text.find("## Preferences").unwrap();
        let assist = text.find("## How to Assist").unwrap();
        assert!(text.starts_with(PREAMBLE));
        assert!(about < projects && projects < stack && stack < prefs && prefs < assist);
        assert!(text.contains("### Alpha (active)"));
        assert!(text.contains("Role: backend developer"));
        assert_eq!(bundle.metadata[OMITTED_PROJECTS_KEY], 0);
        assert_eq!(bundle.metadata[PRIORITIZED_KEY], false);
    }

    #[test]
    fn test_truncates_whole_projects() {
        let projects: Vec<_> = (0..5u32)
            .map(|i| project(&format!("Project {i}"), 0.9 - f64::from(i) * 0.1, 8_000))
            .collect();
        let pack = pack_with(projects);
        let full = render(&pack, 5, 0);
        assert!(char_len(&full) > 32_000);

        let bundle = formatter(32_000).format(&pack).unwrap();
        let text = &bundle.primary().content;
        assert!(char_len(text) <= 32_000);
        let included = bundle.metadata["included_projects"].as_u64().unwrap();
        let omitted = bundle.metadata[OMITTED_PROJECTS_KEY].as_u64().unwrap();
        assert_eq!(included + omitted, 5);
        assert!(omitted > 0);
        assert!(text.contains(&format!("... and {omitted} more projects omitted")));
        assert!(text.contains("### Project 0"));
        assert!(!text.contains("### Project 4"));
    }

    #[test]
    fn test_prioritize_content_roundtrip() {
        let projects: Vec<_> = (0..4).map(|i| project(&format!("P{i}"), 0.5, 300)).collect();
        let pack = pack_with(projects);
        let f = formatter(32_000);
        let prioritized = f.prioritize_content(&pack, 1_200).unwrap();

        assert!(prioritized.projects.len() < 4);
        assert_eq!(prioritized.metadata[PRIORITIZED_KEY], true);
        let omitted = prioritized.metadata[OMITTED_PROJECTS_KEY].as_u64().unwrap() as usize;
        assert_eq!(omitted + prioritized.projects.len(), 4);

        let text = render(&prioritized, prioritized.projects.len(), omitted);
        assert!(char_len(&text) <= 1_200);
        assert_eq!(pack.projects.len(), 4);
    }

    #[test]
    fn test_prioritize_noop_when_fits() {
        let pack = pack_with(vec![project("Alpha", 0.9, 10)]);
        let prioritized = formatter(32_000).prioritize_content(&pack, 32_000).unwrap();
        assert_eq!(prioritized, pack);
    }

    #[test]
    fn test_skeleton_overflow_is_error() {
        let pack = pack_with(vec![project("Alpha", 0.9, 10)]);
        let err = formatter(50).format(&pack).unwrap_err();
        assert!(matches!(err, CtxpackError::SizeLimitExceeded { max: 50, .. }));
    }

    #[test]
    fn test_gem_description() {
        let pack = pack_with(vec![project("Alpha", 0.9, 10), project("Beta", 0.5, 10)]);
        let bundle = formatter(32_000).format(&pack).unwrap();
        let description = &bundle.get(GEM_DESCRIPTION_FILE).unwrap().content;
        assert_eq!(
            description,
            "Technical assistant for a backend developer with expertise in Rust. \
             Knows 2 projects, including Alpha and Beta. Imported from ChatGPT history."
        );
        let setup = &bundle.get(SETUP_INSTRUCTIONS_FILE).unwrap().content;
        assert!(setup.contains(description.as_str()));
        assert!(setup.contains("My Context Assistant"));
    }

    #[test]
    fn test_empty_pack() {
        let pack = UniversalContextPack::new("chatgpt", at(1));
        let bundle = formatter(32_000).format(&pack).unwrap();
        let text = &bundle.primary().content;
        assert!(!text.contains("## Active Projects"));
        assert!(text.ends_with("patterns"));
        assert_eq!(
            bundle.get(GEM_DESCRIPTION_FILE).unwrap().content,
            "Personal dev partner. Imported from ChatGPT history."
        );
    }

    #[test]
    fn test_check_size_limits() {
        let f = formatter(10);
        assert!(f.check_size_limits("0123456789").within_limits);
        assert_eq!(f.check_size_limits("0123456789ab").excess_chars, 2);
    }
}
