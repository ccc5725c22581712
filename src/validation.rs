//! Validation question generation.
//!
//! A [`ValidationSuite`] lists questions a user can ask the target model
//! after installing the artifacts, together with what a correct answer
//! should mention. The suite also carries a platform-specific artifact: a
//! manual checklist for Gemini or a list of `ollama run` commands.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::pack::UniversalContextPack;
use crate::format::TargetPlatform;
use crate::formatters::join;
use crate::message::Metadata;

/// Asked when the pack holds no usable context.
const FALLBACK_QUESTION: &str = "Do you have any information about my background or projects?";

/// Topic a validation question checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    Project,
    Technical,
    Preference,
}

impl std::fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionCategory::Project => write!(f, "project"),
            QuestionCategory::Technical => write!(f, "technical"),
            QuestionCategory::Preference => write!(f, "preference"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationQuestion {
    pub question: String,
    pub expected_answer_summary: String,
    pub category: QuestionCategory,
}

impl ValidationQuestion {
    fn new(question: impl Into<String>, expected: impl Into<String>, category: QuestionCategory) -> Self {
        Self {
            question: question.into(),
            expected_answer_summary: expected.into(),
            category,
        }
    }
}

/// Questions for one target plus the platform's testing artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSuite {
    pub target_platform: TargetPlatform,
    pub questions: Vec<ValidationQuestion>,
    pub platform_artifacts: Metadata,
}

impl ValidationSuite {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Iterates the questions of one category.
    pub fn by_category(&self, category: QuestionCategory) -> impl Iterator<Item = &ValidationQuestion> {
        self.questions.iter().filter(move |q| q.category == category)
    }
}

/// Builds validation suites.
#[derive(Debug, Clone, Copy)]
pub struct ValidationGenerator {
    top_n: usize,
}

impl Default for ValidationGenerator {
    fn default() -> Self {
        Self { top_n: 3 }
    }
}

impl ValidationGenerator {
    /// Creates a generator asking about the `top_n` most relevant projects.
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Generates the suite for `pack` on `target`.
    ///
    /// Questions come in category order: project, technical, preference.
    /// A single fallback question is produced when the pack has nothing to
    /// ask about.
    #[instrument(skip_all, fields(target_platform = %target))]
    pub fn generate(&self, pack: &UniversalContextPack, target: TargetPlatform) -> ValidationSuite {
        let mut questions = self.project_questions(pack);
        questions.extend(technical_questions(pack));
        questions.extend(preference_questions(pack));
        if questions.is_empty() {
            questions.push(ValidationQuestion::new(
                FALLBACK_QUESTION,
                "Should say that little or no personal context is available",
                QuestionCategory::Preference,
            ));
        }
        debug!(questions = questions.len(), "generated validation questions");

        let platform_artifacts = match target {
            TargetPlatform::Gemini => gemini_checklist(&questions),
            TargetPlatform::Ollama => ollama_commands(&questions),
        };
        ValidationSuite {
            target_platform: target,
            questions,
            platform_artifacts,
        }
    }

    fn project_questions(&self, pack: &UniversalContextPack) -> Vec<ValidationQuestion> {
        let top: Vec<_> = pack.projects.iter().take(self.top_n).collect();
        if top.is_empty() {
            return Vec::new();
        }
        let mut questions = vec![ValidationQuestion::new(
            "What projects am I currently working on?",
            format!("Should mention: {}", join(top.iter().map(|p| p.name.as_str()), ", ")),
            QuestionCategory::Project,
        )];
        for project in top {
            if !project.tech_stack.is_empty() {
                questions.push(ValidationQuestion::new(
                    format!("What technologies am I using in {}?", project.name),
                    format!("Should mention: {}", join(project.tech_stack.iter().take(3), ", ")),
                    QuestionCategory::Project,
                ));
            }
            if let Some(challenge) = project.key_challenges.first() {
                questions.push(ValidationQuestion::new(
                    format!("What challenges have I faced in {}?", project.name),
                    format!("Should mention: {challenge}"),
                    QuestionCategory::Project,
                ));
            }
        }
        questions
    }
}

fn technical_questions(pack: &UniversalContextPack) -> Vec<ValidationQuestion> {
    let tech = &pack.technical_context;
    [
        ("What programming languages do I use?", &tech.languages),
        ("Which frameworks and libraries do I work with?", &tech.frameworks),
        ("What development tools do I use?", &tech.tools),
        ("What technical domains do I work in?", &tech.domains),
    ]
    .into_iter()
    .filter(|(_, items)| !items.is_empty())
    .map(|(question, items)| {
        ValidationQuestion::new(
            question,
            format!("Should mention: {}", join(items.iter().take(3), ", ")),
            QuestionCategory::Technical,
        )
    })
    .collect()
}

fn preference_questions(pack: &UniversalContextPack) -> Vec<ValidationQuestion> {
    let mut questions = Vec::new();
    if let Some(role) = &pack.user_profile.role {
        questions.push(ValidationQuestion::new(
            "What is my professional role?",
            format!("Should identify me as: {role}"),
            QuestionCategory::Preference,
        ));
    }
    let prefs = &pack.preferences;
    if !prefs.preferred_tools.is_empty() {
        questions.push(ValidationQuestion::new(
            "What are my preferred development tools?",
            format!("Should mention: {}", join(prefs.preferred_tools.iter().take(3), ", ")),
            QuestionCategory::Preference,
        ));
    }
    if !prefs.communication_style.is_empty() {
        questions.push(ValidationQuestion::new(
            "How do I like answers to be written?",
            format!("Should describe: {}", prefs.communication_style),
            QuestionCategory::Preference,
        ));
    }
    if !prefs.coding_style.is_empty() {
        let items = prefs.coding_style.iter().map(|(k, v)| format!("{k}: {v}"));
        questions.push(ValidationQuestion::new(
            "What coding conventions do I prefer?",
            format!("Should mention: {}", join(items, "; ")),
            QuestionCategory::Preference,
        ));
    }
    if !prefs.work_patterns.is_empty() {
        let items = prefs.work_patterns.iter().map(|(k, v)| format!("{k}: {v}"));
        questions.push(ValidationQuestion::new(
            "When and how often do I usually work with you?",
            format!("Should mention: {}", join(items, "; ")),
            QuestionCategory::Preference,
        ));
    }
    questions
}

fn gemini_checklist(questions: &[ValidationQuestion]) -> Metadata {
    let items: Vec<_> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            json!({
                "step": i + 1,
                "action": format!("Ask Gemini: '{}'", q.question),
                "expected": q.expected_answer_summary,
                "category": q.category,
                "checked": false,
            })
        })
        .collect();
    let mut artifacts = Metadata::new();
    artifacts.insert("type".to_string(), "manual_checklist".into());
    artifacts.insert("title".to_string(), "Gemini Context Validation Checklist".into());
    artifacts.insert(
        "instructions".to_string(),
        json!([
            "Open Gemini and start a new chat with your Gem",
            "Ask each question below and compare the answer with the expectation",
            "Tick each item whose answer matches",
            "If answers are generic, check that the Gem instructions were pasted in full",
        ]),
    );
    artifacts.insert("checklist".to_string(), items.into());
    artifacts.insert(
        "success_criteria".to_string(),
        format!("All {} questions receive answers that use your context", questions.len()).into(),
    );
    artifacts
}

fn ollama_commands(questions: &[ValidationQuestion]) -> Metadata {
    let commands: Vec<_> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            json!({
                "step": i + 1,
                "command": format!("ollama run your-custom-model \"{}\"", q.question.replace('"', "\\\"")),
                "expected": q.expected_answer_summary,
                "category": q.category,
            })
        })
        .collect();
    let mut artifacts = Metadata::new();
    artifacts.insert("type".to_string(), "cli_commands".into());
    artifacts.insert("title".to_string(), "Ollama Model Validation Commands".into());
    artifacts.insert(
        "instructions".to_string(),
        json!([
            "Create the model from the generated Modelfile",
            "Replace 'your-custom-model' with the model name you used",
            "Run each command and compare the answer with the expectation",
            "If answers are generic, check the SYSTEM block of the Modelfile",
        ]),
    );
    artifacts.insert("commands".to_string(), commands.into());
    artifacts.insert(
        "success_criteria".to_string(),
        format!("The model answers all {} questions using your context", questions.len()).into(),
    );
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pack::ProjectBrief;
    use chrono::Utc;

    fn rich_pack() -> UniversalContextPack {
        let now = Utc::now();
        let projects = vec![
            ProjectBrief::new("Alpha", 0.9, now)
                .with_tech(["Rust", "Tokio"])
                .with_challenge("backpressure"),
            ProjectBrief::new("Beta", 0.7, now),
            ProjectBrief::new("Gamma", 0.5, now).with_tech(["Go"]),
            ProjectBrief::new("Delta", 0.1, now).with_tech(["Zig"]),
        ];
        let mut pack = UniversalContextPack::new("chatgpt", now).with_projects(projects);
        pack.user_profile.role = Some("platform engineer".to_string());
        pack.technical_context.languages.insert("Rust".to_string());
        pack.technical_context.domains.insert("distributed systems".to_string());
        pack.preferences.preferred_tools.insert("neovim".to_string());
        pack
    }

    #[test]
    fn test_categories_in_order() {
        let suite = ValidationGenerator::new(3).generate(&rich_pack(), TargetPlatform::Gemini);
        let categories: Vec<_> = suite.questions.iter().map(|q| q.category).collect();
        let mut sorted = categories.clone();
        sorted.sort();
        assert_eq!(categories, sorted);
        assert_eq!(suite.by_category(QuestionCategory::Technical).count(), 2);
        assert_eq!(suite.by_category(QuestionCategory::Preference).count(), 2);
    }

    #[test]
    fn test_top_n_projects_only() {
        let suite = ValidationGenerator::new(3).generate(&rich_pack(), TargetPlatform::Gemini);
        let first = &suite.questions[0];
        assert_eq!(first.expected_answer_summary, "Should mention: Alpha, Beta, Gamma");
        assert!(suite.questions.iter().any(|q| q.question.contains("in Gamma")));
        assert!(!suite.questions.iter().any(|q| q.question.contains("Delta")));
        assert!(
            suite
                .questions
                .iter()
                .any(|q| q.expected_answer_summary == "Should mention: backpressure")
        );
    }

    #[test]
    fn test_fallback_question() {
        let pack = UniversalContextPack::new("chatgpt", Utc::now());
        let suite = ValidationGenerator::default().generate(&pack, TargetPlatform::Ollama);
        assert_eq!(suite.len(), 1);
        assert_eq!(suite.questions[0].question, FALLBACK_QUESTION);
        assert_eq!(suite.questions[0].category, QuestionCategory::Preference);
    }

    #[test]
    fn test_work_patterns_only() {
        let mut pack = UniversalContextPack::new("chatgpt", Utc::now());
        pack.preferences
            .work_patterns
            .insert("work_schedule".to_string(), "Evening hours".to_string());
        pack.preferences
            .work_patterns
            .insert("usage_frequency".to_string(), "Daily".to_string());

        let suite = ValidationGenerator::default().generate(&pack, TargetPlatform::Gemini);
        assert_eq!(suite.len(), 1);
        let question = &suite.questions[0];
        assert_ne!(question.question, FALLBACK_QUESTION);
        assert_eq!(question.category, QuestionCategory::Preference);
        assert_eq!(
            question.expected_answer_summary,
            "Should mention: usage_frequency: Daily; work_schedule: Evening hours"
        );
    }

    #[test]
    fn test_platform_artifacts() {
        let pack = rich_pack();
        let gemini = ValidationGenerator::default().generate(&pack, TargetPlatform::Gemini);
        assert_eq!(gemini.platform_artifacts["type"], "manual_checklist");
        let checklist = gemini.platform_artifacts["checklist"].as_array().unwrap();
        assert_eq!(checklist.len(), gemini.len());
        assert_eq!(checklist[0]["step"], 1);
        assert_eq!(checklist[0]["category"], "project");

        let ollama = ValidationGenerator::default().generate(&pack, TargetPlatform::Ollama);
        assert_eq!(ollama.platform_artifacts["type"], "cli_commands");
        let commands = ollama.platform_artifacts["commands"].as_array().unwrap();
        assert_eq!(
            commands[0]["command"],
            "ollama run your-custom-model \"What projects am I currently working on?\""
        );
    }

    #[test]
    fn test_suite_serde() {
        let suite = ValidationGenerator::default().generate(&rich_pack(), TargetPlatform::Ollama);
        let json = serde_json::to_string(&suite).unwrap();
        assert!(json.contains("\"target_platform\":\"ollama\""));
        let back: ValidationSuite = serde_json::from_str(&json).unwrap();
        assert_eq!(back, suite);
    }
}
