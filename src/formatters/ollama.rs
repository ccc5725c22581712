//! Ollama formatter.
//!
//! Produces a Modelfile whose `SYSTEM` block carries the context. Local
//! models have no hard ceiling, so an oversized prompt is split instead of
//! truncated: the leading projects stay inline and the rest move to
//! [`ADDITIONAL_PROJECTS_FILE`].

use tracing::{info, instrument};

use crate::config::OllamaConfig;
use crate::core::pack::{ProjectBrief, UniversalContextPack};
use crate::error::Result;
use crate::format::TargetPlatform;

use super::{
    Artifact, ArtifactBundle, PlatformFormatter, SETUP_INSTRUCTIONS_FILE, SizeCheck, char_len,
    join, source_name,
};

/// File name of the generated Modelfile.
pub const MODELFILE: &str = "Modelfile";

/// File name of the projects moved out of an oversized prompt.
pub const ADDITIONAL_PROJECTS_FILE: &str = "additional_projects.md";

const INSTRUCTIONS: &str = "## Instructions
When responding to the user:
1. Reference their specific projects, technologies, and preferences when relevant
2. Provide solutions that align with their technical stack and expertise level
3. Consider their working patterns and communication style
4. Build upon their existing knowledge and project context
5. Be specific and actionable in your recommendations";

const TEST_QUESTIONS: [&str; 3] = [
    "What projects am I working on?",
    "What programming languages do I use?",
    "What are my preferred development tools?",
];

/// Formatter for local models served by Ollama.
#[derive(Debug, Clone, Default)]
pub struct OllamaFormatter {
    config: OllamaConfig,
}

impl OllamaFormatter {
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    /// Renders the system prompt with every project of `pack` inline.
    pub fn system_prompt(&self, pack: &UniversalContextPack) -> String {
        render_prompt(pack, &pack.projects, None)
    }

    /// Builds the complete Modelfile around `system_prompt`.
    pub fn modelfile(&self, system_prompt: &str) -> String {
        let cfg = &self.config;
        let mut out = format!(
            "FROM {}\n\nSYSTEM \"\"\"\n{}\n\"\"\"\n\nPARAMETER temperature {}\nPARAMETER top_p {}\nPARAMETER num_ctx {}\n",
            cfg.base_model,
            escape_triple_quotes(system_prompt),
            cfg.temperature,
            cfg.top_p,
            cfg.num_ctx,
        );
        if let Some(template) = &cfg.template {
            out.push_str(&format!("\nTEMPLATE \"\"\"{}\"\"\"\n", escape_triple_quotes(template)));
        }
        out
    }

    fn setup_commands(&self) -> Vec<String> {
        vec![
            format!("ollama pull {}", self.config.base_model),
            format!("ollama create {} -f {MODELFILE}", self.config.model_name),
            "ollama list".to_string(),
        ]
    }

    fn test_commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = TEST_QUESTIONS
            .iter()
            .map(|q| format!("ollama run {} \"{q}\"", self.config.model_name))
            .collect();
        commands.push(format!(
            "ollama run {} \"{}\"",
            self.config.base_model, TEST_QUESTIONS[0]
        ));
        commands
    }

    fn setup_instructions(&self, pack: &UniversalContextPack, split: bool) -> String {
        let mut out = format!(
            "# Setting Up Your Local Context Model

This Modelfile customizes `{base}` with context imported from your {source} history.

## Prerequisites
- Ollama installed (https://ollama.com)
- Enough disk space for the `{base}` model

## Create the Model
```bash
{setup}
```

## Test It
```bash
{test}
```

The last command asks the unmodified base model the same question. Its answer should not know your projects.
",
            base = self.config.base_model,
            source = source_name(pack),
            setup = self.setup_commands().join("\n"),
            test = self.test_commands().join("\n"),
        );
        if split {
            out.push_str(&format!(
                "
## Additional Projects
The full context was too large to embed. Only the top {} projects are in the Modelfile;
the rest are listed in `{ADDITIONAL_PROJECTS_FILE}`. Paste relevant entries into a chat when needed.
",
                self.config.inline_projects
            ));
        }
        out
    }
}

impl PlatformFormatter for OllamaFormatter {
    fn target(&self) -> TargetPlatform {
        TargetPlatform::Ollama
    }

    #[instrument(skip_all, fields(projects = pack.projects.len(), model = %self.config.model_name))]
    fn format(&self, pack: &UniversalContextPack) -> Result<ArtifactBundle> {
        let mut prompt = self.system_prompt(pack);
        let mut moved: &[ProjectBrief] = &[];

        if !self.check_size_limits(&prompt).within_limits && pack.projects.len() > self.config.inline_projects {
            let (inline, rest) = pack.projects.split_at(self.config.inline_projects);
            info!(
                prompt_chars = char_len(&prompt),
                soft_limit = self.config.soft_limit_chars,
                moved = rest.len(),
                "splitting oversized system prompt"
            );
            prompt = render_prompt(pack, inline, Some(rest.len()));
            moved = rest;
        }
        let split = !moved.is_empty();

        let mut bundle = ArtifactBundle::new(TargetPlatform::Ollama, Artifact::new(MODELFILE, self.modelfile(&prompt)));
        if split {
            let offset = pack.projects.len() - moved.len();
            bundle = bundle.with_artifact(Artifact::new(
                ADDITIONAL_PROJECTS_FILE,
                additional_projects(moved, offset),
            ));
        }
        bundle = bundle.with_artifact(Artifact::new(
            SETUP_INSTRUCTIONS_FILE,
            self.setup_instructions(pack, split),
        ));

        bundle.setup_commands = self.setup_commands();
        bundle.test_commands = self.test_commands();
        bundle
            .metadata
            .insert("system_prompt_chars".to_string(), char_len(&prompt).into());
        bundle.metadata.insert("split".to_string(), split.into());
        bundle
            .metadata
            .insert("inline_projects".to_string(), (pack.projects.len() - moved.len()).into());
        Ok(bundle)
    }

    fn check_size_limits(&self, text: &str) -> SizeCheck {
        SizeCheck::measure(text, self.config.soft_limit_chars)
    }
}

/// A literal `"""` would close the Modelfile block early.
fn escape_triple_quotes(text: &str) -> String {
    text.replace("\"\"\"", "\\\"\\\"\\\"")
}

fn render_prompt(pack: &UniversalContextPack, projects: &[ProjectBrief], moved: Option<usize>) -> String {
    let mut parts = Vec::new();

    let mut intro = String::from(
        "You are an AI assistant with detailed knowledge about the user's background, projects, and preferences.",
    );
    if let Some(role) = &pack.user_profile.role {
        intro.push_str(&format!(" The user is a {role}."));
    }
    parts.push(intro);

    let profile = &pack.user_profile;
    if !profile.background_summary.is_empty() || !profile.expertise_areas.is_empty() {
        let mut section = String::from("## User Background");
        if !profile.background_summary.is_empty() {
            section.push('\n');
            section.push_str(&profile.background_summary);
        }
        if !profile.expertise_areas.is_empty() {
            section.push_str(&format!(
                "\n\nExpertise areas: {}",
                join(&profile.expertise_areas, ", ")
            ));
        }
        parts.push(section);
    }

    let tech = &pack.technical_context;
    if !tech.is_empty() {
        let mut section = String::from("## Technical Context");
        let labelled = [
            ("Programming languages", &tech.languages),
            ("Frameworks and libraries", &tech.frameworks),
            ("Development tools", &tech.tools),
            ("Technical domains", &tech.domains),
        ];
        for (label, items) in labelled {
            if !items.is_empty() {
                section.push_str(&format!("\n{label}: {}", join(items, ", ")));
            }
        }
        parts.push(section);
    }

    if !projects.is_empty() {
        let mut section = String::from("## Current Projects");
        for (i, project) in projects.iter().enumerate() {
            section.push_str(&format!("\n{}. **{}**", i + 1, project.name));
            section.push_str(&project_details(project, "\n   "));
        }
        if let Some(n) = moved {
            section.push_str(&format!(
                "\n\n{n} more projects are listed in {ADDITIONAL_PROJECTS_FILE}."
            ));
        }
        parts.push(section);
    }

    let prefs = &pack.preferences;
    if !prefs.is_empty() {
        let mut section = String::from("## User Preferences");
        if !prefs.communication_style.is_empty() {
            section.push_str(&format!("\nCommunication style: {}", prefs.communication_style));
        }
        if !prefs.coding_style.is_empty() {
            let items = prefs.coding_style.iter().map(|(k, v)| format!("{k}: {v}"));
            section.push_str(&format!("\nCoding preferences: {}", join(items, "; ")));
        }
        if !prefs.preferred_tools.is_empty() {
            section.push_str(&format!("\nPreferred tools: {}", join(&prefs.preferred_tools, ", ")));
        }
        if !prefs.work_patterns.is_empty() {
            let items = prefs.work_patterns.iter().map(|(k, v)| format!("{k}: {v}"));
            section.push_str(&format!("\nWork patterns: {}", join(items, "; ")));
        }
        parts.push(section);
    }

    parts.push(INSTRUCTIONS.to_string());
    parts.join("\n\n")
}

fn project_details(project: &ProjectBrief, lead: &str) -> String {
    let mut out = String::new();
    if !project.description.is_empty() {
        out.push_str(&format!("{lead}Description: {}", project.description));
    }
    if !project.tech_stack.is_empty() {
        out.push_str(&format!("{lead}Tech stack: {}", join(&project.tech_stack, ", ")));
    }
    out.push_str(&format!("{lead}Status: {}", project.current_status));
    if !project.key_challenges.is_empty() {
        out.push_str(&format!("{lead}Key challenges: {}", project.key_challenges.join("; ")));
    }
    out
}

fn additional_projects(projects: &[ProjectBrief], offset: usize) -> String {
    let mut out = String::from("# Additional Projects\n");
    for (i, project) in projects.iter().enumerate() {
        out.push_str(&format!("\n## {}. {}", offset + i + 1, project.name));
        out.push_str(&project_details(project, "\n"));
        out.push_str(&format!(
            "\nLast discussed: {}\n",
            project.last_discussed.format("%Y-%m-%d")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn project(name: &str, score: f64, description_len: usize) -> ProjectBrief {
        ProjectBrief::new(name, score, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
            .with_description("d".repeat(description_len))
            .with_tech(["Python", "FastAPI"])
    }

    fn sample_pack(projects: Vec<ProjectBrief>) -> UniversalContextPack {
        let mut pack = UniversalContextPack::new("chatgpt", Utc::now()).with_projects(projects);
        pack.user_profile.role = Some("data engineer".to_string());
        pack.user_profile.background_summary = "Builds pipelines.".to_string();
        pack.technical_context.languages.insert("Python".to_string());
        pack.preferences
            .work_patterns
            .insert("testing".to_string(), "writes tests first".to_string());
        pack
    }

    #[test]
    fn test_modelfile_layout() {
        let pack = sample_pack(vec![project("Ingest", 0.9, 10)]);
        let bundle = OllamaFormatter::default().format(&pack).unwrap();
        let modelfile = &bundle.primary().content;

        assert_eq!(bundle.primary().file_name, MODELFILE);
        assert!(modelfile.starts_with("FROM llama3.1\n\nSYSTEM \"\"\"\n"));
        assert!(modelfile.contains("The user is a data engineer."));
        assert!(modelfile.contains("## User Background\nBuilds pipelines."));
        assert!(modelfile.contains("Programming languages: Python"));
        assert!(modelfile.contains("1. **Ingest**"));
        assert!(modelfile.contains("Work patterns: testing: writes tests first"));
        assert!(modelfile.contains("PARAMETER temperature 0.7"));
        assert!(modelfile.contains("PARAMETER top_p 0.9"));
        assert!(modelfile.contains("PARAMETER num_ctx 8192"));
        assert!(!modelfile.contains("TEMPLATE"));
        assert!(bundle.get(ADDITIONAL_PROJECTS_FILE).is_none());
        assert_eq!(bundle.metadata["split"], false);
    }

    #[test]
    fn test_commands() {
        let bundle = OllamaFormatter::default().format(&sample_pack(Vec::new())).unwrap();
        assert_eq!(
            bundle.setup_commands,
            vec![
                "ollama pull llama3.1",
                "ollama create my-context -f Modelfile",
                "ollama list",
            ]
        );
        assert_eq!(bundle.test_commands.len(), 4);
        assert_eq!(
            bundle.test_commands[0],
            "ollama run my-context \"What projects am I working on?\""
        );
        assert!(bundle.test_commands[3].starts_with("ollama run llama3.1 "));
        let setup = &bundle.get(SETUP_INSTRUCTIONS_FILE).unwrap().content;
        assert!(setup.contains("ollama create my-context -f Modelfile"));
    }

    #[test]
    fn test_escapes_triple_quotes() {
        let mut pack = sample_pack(Vec::new());
        pack.user_profile.background_summary = "Likes \"\"\"docstrings\"\"\".".to_string();
        let bundle = OllamaFormatter::default().format(&pack).unwrap();
        let modelfile = &bundle.primary().content;
        // Only the opening and closing delimiters remain unescaped.
        assert_eq!(modelfile.matches("SYSTEM \"\"\"").count(), 1);
        assert!(modelfile.contains("\\\"\\\"\\\"docstrings"));
    }

    #[test]
    fn test_template_when_configured() {
        let formatter = OllamaFormatter::new(OllamaConfig {
            template: Some("{{ .Prompt }}".to_string()),
            ..OllamaConfig::default()
        });
        let modelfile = formatter.modelfile("prompt");
        assert!(modelfile.ends_with("TEMPLATE \"\"\"{{ .Prompt }}\"\"\"\n"));
    }

    #[test]
    fn test_splits_oversized_prompt() {
        let projects: Vec<_> = (0..6u32)
            .map(|i| project(&format!("Project {i}"), 0.9 - f64::from(i) * 0.1, 400))
            .collect();
        let pack = sample_pack(projects);
        let formatter = OllamaFormatter::new(OllamaConfig {
            soft_limit_chars: 1_000,
            inline_projects: 2,
            ..OllamaConfig::default()
        });
        let bundle = formatter.format(&pack).unwrap();
        let modelfile = &bundle.primary().content;

        assert_eq!(bundle.metadata["split"], true);
        assert_eq!(bundle.metadata["inline_projects"], 2);
        assert!(modelfile.contains("**Project 0**"));
        assert!(modelfile.contains("**Project 1**"));
        assert!(!modelfile.contains("Project 2"));
        assert!(modelfile.contains("4 more projects are listed in additional_projects.md."));

        let extra = &bundle.get(ADDITIONAL_PROJECTS_FILE).unwrap().content;
        assert!(extra.starts_with("# Additional Projects\n"));
        assert!(extra.contains("## 3. Project 2"));
        assert!(extra.contains("## 6. Project 5"));
        assert!(bundle.get(SETUP_INSTRUCTIONS_FILE).unwrap().content.contains("top 2 projects"));
    }

    #[test]
    fn test_no_split_when_few_projects() {
        let pack = sample_pack(vec![project("Only", 0.5, 5_000)]);
        let formatter = OllamaFormatter::new(OllamaConfig {
            soft_limit_chars: 100,
            ..OllamaConfig::default()
        });
        let bundle = formatter.format(&pack).unwrap();
        assert_eq!(bundle.metadata["split"], false);
        assert!(bundle.primary().content.contains("**Only**"));
    }
}
