//! Heuristic rule table: pattern → signal → weight.
//!
//! Every keyword and phrase the extractor reacts to is a [`RuleSpec`]. Specs
//! are plain data (they deserialize from TOML), and [`RuleTable`] compiles
//! them once into regexes plus a [`RegexSet`] prefilter.
//!
//! Value resolution for a hit:
//!
//! 1. the rule's `value`, when non-empty
//! 2. otherwise the `value` named capture group
//! 3. otherwise the whole match
//!
//! `weight` scales how much a hit adds to tallies (tech mentions, preference
//! votes). A rule with a weight of zero or less is ignored.
//!
//! # Example
//!
//! ```
//! use ctxpack::extract::rules::{RuleTable, SignalKind};
//!
//! let table = RuleTable::builtin().unwrap();
//! let hits = table.scan("I'm building Carvis with Rust and Docker");
//!
//! assert!(hits.iter().any(|h| h.signal == SignalKind::Project && h.value == "Carvis"));
//! assert!(hits.iter().any(|h| h.signal == SignalKind::Language && h.value == "Rust"));
//! assert!(hits.iter().any(|h| h.signal == SignalKind::Tool && h.value == "Docker"));
//! ```

use std::collections::BTreeSet;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

use crate::error::{CtxpackError, Result};

/// What a rule hit tells the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Language,
    Framework,
    Tool,
    Domain,
    /// Job title self-statement ("I'm a backend engineer")
    Role,
    /// Stated expertise ("I'm experienced with Kubernetes")
    Expertise,
    /// Project name mention or statement
    Project,
    /// Problem phrase inside project content
    Challenge,
    /// Coding-style vote; `key` names the preference
    Preference,
    /// Project status keyword; value is `active`, `paused` or `completed`
    Status,
}

impl SignalKind {
    /// Returns `true` for the technical vocabulary signals.
    pub fn is_tech(self) -> bool {
        matches!(
            self,
            SignalKind::Language | SignalKind::Framework | SignalKind::Tool
        )
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Serializable description of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regex in `regex` crate syntax.
    pub pattern: String,
    pub signal: SignalKind,
    /// Canonical value; empty means "take it from the match".
    #[serde(default)]
    pub value: String,
    /// Preference key, used by [`SignalKind::Preference`] rules.
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl RuleSpec {
    pub fn new(pattern: impl Into<String>, signal: SignalKind, value: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            signal,
            value: value.into(),
            key: String::new(),
            weight: 1.0,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    regex: Regex,
    spec: RuleSpec,
}

impl Rule {
    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }
}

/// One signal found in a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHit {
    pub signal: SignalKind,
    pub key: String,
    pub value: String,
    pub weight: f64,
    /// Byte offset of the match start.
    pub start: usize,
}

/// Compiled rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    prefilter: RegexSet,
    vocabulary: BTreeSet<String>,
}

impl RuleTable {
    /// Compiles a table from specs.
    ///
    /// # Errors
    ///
    /// Returns [`CtxpackError::Config`] naming the first pattern that fails to
    /// compile.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs.iter().filter(|s| s.weight > 0.0) {
            let regex = Regex::new(&spec.pattern).map_err(|e| {
                CtxpackError::config(format!("invalid rule pattern '{}': {e}", spec.pattern))
            })?;
            rules.push(Rule {
                regex,
                spec: spec.clone(),
            });
        }
        let prefilter = RegexSet::new(rules.iter().map(|r| r.spec.pattern.as_str()))
            .map_err(|e| CtxpackError::config(format!("rule table too large: {e}")))?;
        let vocabulary = rules
            .iter()
            .filter(|r| r.spec.signal.is_tech() && !r.spec.value.is_empty())
            .map(|r| r.spec.value.to_lowercase())
            .collect();
        Ok(Self {
            rules,
            prefilter,
            vocabulary,
        })
    }

    /// The built-in vocabulary and phrase rules.
    pub fn builtin() -> Result<Self> {
        Self::from_specs(&builtin_specs())
    }

    /// Built-in rules followed by `extra`.
    pub fn with_extra(extra: &[RuleSpec]) -> Result<Self> {
        let mut specs = builtin_specs();
        specs.extend_from_slice(extra);
        Self::from_specs(&specs)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns every hit in `text`, ordered by rule then position.
    pub fn scan(&self, text: &str) -> Vec<SignalHit> {
        let mut hits = Vec::new();
        for idx in self.prefilter.matches(text).iter() {
            let rule = &self.rules[idx];
            for caps in rule.regex.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let value = if rule.spec.value.is_empty() {
                    let raw = caps.name("value").unwrap_or(whole).as_str();
                    clean_value(raw)
                } else {
                    rule.spec.value.clone()
                };
                if value.is_empty() {
                    continue;
                }
                hits.push(SignalHit {
                    signal: rule.spec.signal,
                    key: rule.spec.key.clone(),
                    value,
                    weight: rule.spec.weight,
                    start: whole.start(),
                });
            }
        }
        hits
    }

    /// Returns the canonical technology names mentioned in `text`.
    pub fn technologies_in(&self, text: &str) -> BTreeSet<String> {
        self.scan(text)
            .into_iter()
            .filter(|h| h.signal.is_tech())
            .map(|h| h.value)
            .collect()
    }

    /// Returns `true` if `term` is a canonical language, framework or tool name.
    pub fn is_vocabulary_term(&self, term: &str) -> bool {
        self.vocabulary.contains(&term.trim().to_lowercase())
    }
}

fn clean_value(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '.' | ',' | ':' | ';' | '-' | '!' | '?'))
        .to_string()
}

// ============================================================================
// Built-in vocabulary
// ============================================================================

const LANGUAGES: &[(&str, &str)] = &[
    (r"(?i)\bpython\b", "Python"),
    (r"(?i)\bjavascript\b", "JavaScript"),
    (r"(?i)\btypescript\b", "TypeScript"),
    (r"(?i)\bjava\b", "Java"),
    (r"(?i)\bc\+\+", "C++"),
    (r"(?i)\bc#", "C#"),
    (r"(?i:\bgolang\b)|\bGo (?:code|modules?|routines?|programs?|services?|backend|server)\b|\bin Go\b", "Go"),
    (r"(?i)\brust\b", "Rust"),
    (r"(?i)\bruby\b", "Ruby"),
    (r"(?i)\bphp\b", "PHP"),
    (r"(?i)\bswift\b", "Swift"),
    (r"(?i)\bkotlin\b", "Kotlin"),
    (r"(?i)\bscala\b", "Scala"),
    (r"(?i)\bmatlab\b", "MATLAB"),
    (r"(?i)\bsql\b", "SQL"),
];

const FRAMEWORKS: &[(&str, &str)] = &[
    (r"\bReact\b|(?i:\breact\.?js\b)", "React"),
    (r"(?i)\bvue(?:\.?js)?\b", "Vue"),
    (r"(?i)\bangular\b", "Angular"),
    (r"(?i)\bdjango\b", "Django"),
    (r"(?i)\bflask\b", "Flask"),
    (r"(?i)\bfastapi\b", "FastAPI"),
    (r"\bSpring(?: Boot)?\b", "Spring"),
    (r"\bExpress\b|(?i:\bexpress\.js\b)", "Express"),
    (r"(?i)\brails\b", "Rails"),
    (r"(?i)\blaravel\b", "Laravel"),
    (r"(?i)\btensorflow\b", "TensorFlow"),
    (r"(?i)\bpytorch\b", "PyTorch"),
    (r"(?i)\bpandas\b", "pandas"),
    (r"(?i)\bnumpy\b", "NumPy"),
    (r"(?i)\bnext\.js\b|\bnextjs\b", "Next.js"),
    (r"(?i)\bnode\.?js\b", "Node.js"),
    (r"(?i)\bsvelte\b", "Svelte"),
    (r"(?i)\btokio\b", "Tokio"),
    (r"(?i)\baxum\b", "Axum"),
];

const TOOLS: &[(&str, &str)] = &[
    (r"(?i)\bgit\b", "Git"),
    (r"(?i)\bgithub\b", "GitHub"),
    (r"(?i)\bgitlab\b", "GitLab"),
    (r"(?i)\bvs ?code\b|\bvisual studio code\b", "VS Code"),
    (r"(?i)\bpycharm\b", "PyCharm"),
    (r"(?i)\bintellij\b", "IntelliJ"),
    (r"(?i)\bn?vim\b|\bneovim\b", "Vim"),
    (r"(?i)\baws\b|\bamazon web services\b", "AWS"),
    (r"(?i)\bazure\b", "Azure"),
    (r"(?i)\bgcp\b|\bgoogle cloud\b", "GCP"),
    (r"(?i)\bpostgres(?:ql)?\b", "PostgreSQL"),
    (r"(?i)\bmysql\b", "MySQL"),
    (r"(?i)\bmongo(?:db)?\b", "MongoDB"),
    (r"(?i)\bredis\b", "Redis"),
    (r"(?i)\bnginx\b", "Nginx"),
    (r"(?i)\bdocker\b", "Docker"),
    (r"(?i)\bkubernetes\b|\bk8s\b", "Kubernetes"),
    (r"(?i)\bterraform\b", "Terraform"),
    (r"(?i)\bjupyter\b", "Jupyter"),
];

const DOMAINS: &[(&str, &str)] = &[
    (r"(?i)\bweb ?(?:app|development|site)s?\b|\bwebsite\b|\bfront-?end\b|\bback-?end\b|\bhtml\b|\bcss\b", "Web Development"),
    (r"(?i)\bdata science\b|\bmachine learning\b|\bdeep learning\b|\bneural network\b|\bdatasets?\b|\bdata analysis\b", "Data Science"),
    (r"(?i)\bmobile app\b|\bios app\b|\bandroid\b|\breact native\b|\bflutter\b", "Mobile Development"),
    (r"(?i)\bdevops\b|\bci/cd\b|\bdeployment pipeline\b|\binfrastructure as code\b", "DevOps"),
    (r"(?i)\bdatabases?\b|\bschema design\b|\bquery optimization\b", "Databases"),
    (r"(?i)\bembedded\b|\boperating systems?\b|\bkernel\b|\bsystems programming\b", "Systems Programming"),
];

const ROLE_PATTERNS: &[&str] = &[
    r"(?i)\b(?:i'?m|i am|i work as|my role is|my job is)\s+(?:an?\s+)?(?P<value>(?:(?:senior|junior|lead|staff|principal)\s+)?(?:(?:software|backend|back-end|frontend|front-end|full[- ]?stack|data|ml|machine learning|devops|mobile|web|game|embedded|platform|security|qa|research)\s+)?(?:engineer|developer|scientist|analyst|architect|designer|researcher|student|consultant|freelancer|founder|product manager|cto))\b",
];

const EXPERTISE_PATTERNS: &[&str] = &[
    r"(?i)\b(?:i'?m|i am)\s+(?:very\s+)?(?:experienced|proficient|skilled|an expert|fluent)\s+(?:with|in|at)\s+(?P<value>[a-z][\w+#.]*(?:\s+[a-z][\w+#.]*){0,2}?)(?:[.,;!?\n]|\s+and\b|\s+but\b|$)",
    r"(?i)\bi specialize in\s+(?P<value>[a-z][\w+#.]*(?:\s+[a-z][\w+#.]*){0,2}?)(?:[.,;!?\n]|\s+and\b|\s+but\b|$)",
    r"(?i)\bmy (?:background|expertise) is (?:in\s+)?(?P<value>[a-z][\w+#.]*(?:\s+[a-z][\w+#.]*){0,2}?)(?:[.,;!?\n]|\s+and\b|\s+but\b|$)",
];

const PROJECT_PATTERNS: &[&str] = &[
    r#"\b(?i:i'?m|i am|we'?re|we are)\s+(?i:currently\s+)?(?i:building|developing|creating|making|writing|working on)\s+(?:(?i:an?|the|my|our)\s+)?(?:(?i:new)\s+)?(?:(?i:project|app|application|tool|service|library|website|game|bot)\s+(?:(?i:called|named)\s+)?)?"?(?P<value>[A-Z][\w+#-]*(?:[ \t]+[A-Z][\w+#-]*){0,2})"#,
    r#"\b(?i:project|app|repo|startup|side project|tool|library)\s+(?i:called|named)\s+"?(?P<value>[A-Z][\w+#-]*(?:[ \t]+[A-Z][\w+#-]*){0,2})"#,
    r"\b(?P<value>(?i:project)[ \t]+[A-Z][\w+#-]*)",
];

const CHALLENGE_PATTERNS: &[&str] = &[
    r"(?i)\b(?:problem with|issue with|struggling with|bug in|having trouble(?: with)?|stuck on|can'?t figure out|cannot figure out|error when|fails when|keeps failing)\b[^.!?\n]{0,80}",
];

const STATUS_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\b(?:finished|completed|shipped|launched|released)\b", "completed"),
    (r"(?i)\b(?:paused|on hold|put aside|shelved|abandoned)\b", "paused"),
    (r"(?i)\b(?:resumed|picking (?:it )?back up|getting back to)\b", "active"),
];

const PREFERENCES: &[(&str, &str, &str)] = &[
    (r"(?i)\bfunctional (?:programming|style|approach)\b|\bimmutab(?:le|ility)\b|\bpure functions?\b", "paradigm", "functional"),
    (r"(?i)\bobject[- ]oriented\b|\boop\b|\binheritance\b", "paradigm", "object-oriented"),
    (r"(?i)\btdd\b|\btest[- ]driven\b", "testing_approach", "test-driven"),
    (r"(?i)\bunit tests?\b|\bpytest\b|\bjest\b", "testing_approach", "unit testing"),
    (r"(?i)\bintegration tests?\b|\bend-to-end tests?\b", "testing_approach", "integration testing"),
    (r"(?i)\btype hints?\b|\bstatic typing\b|\bstrongly typed\b|\bmypy\b", "typing", "static"),
    (r"(?i)\bdocstrings?\b|\bwell[- ]documented\b", "documentation", "documented"),
    (r"(?i)\b(?:show|give) me (?:an? |some )?(?:code )?examples?\b", "explanations", "code examples"),
    (r"(?i)\bstep[- ]by[- ]step\b", "explanations", "step-by-step"),
];

/// The built-in rule specs, in evaluation order.
pub fn builtin_specs() -> Vec<RuleSpec> {
    let mut specs = Vec::new();
    let vocab = [
        (LANGUAGES, SignalKind::Language),
        (FRAMEWORKS, SignalKind::Framework),
        (TOOLS, SignalKind::Tool),
        (DOMAINS, SignalKind::Domain),
    ];
    for (table, signal) in vocab {
        specs.extend(
            table
                .iter()
                .map(|(pattern, value)| RuleSpec::new(*pattern, signal, *value)),
        );
    }
    specs.extend(ROLE_PATTERNS.iter().map(|p| RuleSpec::new(*p, SignalKind::Role, "")));
    specs.extend(
        EXPERTISE_PATTERNS
            .iter()
            .map(|p| RuleSpec::new(*p, SignalKind::Expertise, "")),
    );
    specs.extend(
        PROJECT_PATTERNS
            .iter()
            .map(|p| RuleSpec::new(*p, SignalKind::Project, "")),
    );
    specs.extend(
        CHALLENGE_PATTERNS
            .iter()
            .map(|p| RuleSpec::new(*p, SignalKind::Challenge, "")),
    );
    specs.extend(
        STATUS_PATTERNS
            .iter()
            .map(|(p, v)| RuleSpec::new(*p, SignalKind::Status, *v)),
    );
    specs.extend(
        PREFERENCES
            .iter()
            .map(|(p, k, v)| RuleSpec::new(*p, SignalKind::Preference, *v).with_key(*k)),
    );
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RuleTable {
        RuleTable::builtin().unwrap()
    }

    fn values(text: &str, signal: SignalKind) -> Vec<String> {
        table()
            .scan(text)
            .into_iter()
            .filter(|h| h.signal == signal)
            .map(|h| h.value)
            .collect()
    }

    #[test]
    fn test_builtin_compiles() {
        let t = table();
        assert!(!t.is_empty());
        assert_eq!(t.len(), builtin_specs().len());
    }

    #[test]
    fn test_language_rules() {
        assert_eq!(values("I write Python daily", SignalKind::Language), vec!["Python"]);
        assert_eq!(values("C++ templates", SignalKind::Language), vec!["C++"]);
        assert_eq!(values("a golang service", SignalKind::Language), vec!["Go"]);
        assert!(values("let's go home", SignalKind::Language).is_empty());
        assert!(values("javascript only", SignalKind::Language).contains(&"JavaScript".to_string()));
        assert!(!values("javascript only", SignalKind::Language).contains(&"Java".to_string()));
    }

    #[test]
    fn test_react_verb_is_not_framework() {
        assert!(values("how should I react to this", SignalKind::Framework).is_empty());
        assert_eq!(values("a React component", SignalKind::Framework), vec!["React"]);
    }

    #[test]
    fn test_domain_rules() {
        assert_eq!(
            values("training a machine learning model", SignalKind::Domain),
            vec!["Data Science"]
        );
    }

    #[test]
    fn test_role_rule() {
        assert_eq!(
            values("Hi, I'm a senior backend engineer at a startup", SignalKind::Role),
            vec!["senior backend engineer"]
        );
        assert_eq!(values("I am a data scientist.", SignalKind::Role), vec!["data scientist"]);
        assert!(values("I'm a bit confused", SignalKind::Role).is_empty());
    }

    #[test]
    fn test_expertise_rule() {
        assert_eq!(
            values("I'm experienced with kubernetes and terraform", SignalKind::Expertise),
            vec!["kubernetes"]
        );
        assert_eq!(
            values("My background is in computer vision.", SignalKind::Expertise),
            vec!["computer vision"]
        );
    }

    #[test]
    fn test_project_statement_rules() {
        assert_eq!(values("I'm building Carvis. It is fun", SignalKind::Project), vec!["Carvis"]);
        let mut called = values("we are working on an app called Flight Log", SignalKind::Project);
        called.dedup();
        assert_eq!(called, vec!["Flight Log"]);
        let hits = values("Status update on Project Alpha today", SignalKind::Project);
        assert_eq!(hits, vec!["Project Alpha"]);
        assert!(values("i'm building something small", SignalKind::Project).is_empty());
    }

    #[test]
    fn test_challenge_rule_captures_context() {
        let hits = values(
            "I'm having trouble with the websocket reconnect logic. Any ideas?",
            SignalKind::Challenge,
        );
        assert_eq!(hits, vec!["having trouble with the websocket reconnect logic"]);
    }

    #[test]
    fn test_preference_rule_keys() {
        let hits: Vec<_> = table()
            .scan("I follow TDD and prefer functional programming")
            .into_iter()
            .filter(|h| h.signal == SignalKind::Preference)
            .map(|h| (h.key, h.value))
            .collect();
        assert!(hits.contains(&("testing_approach".to_string(), "test-driven".to_string())));
        assert!(hits.contains(&("paradigm".to_string(), "functional".to_string())));
    }

    #[test]
    fn test_status_rule() {
        assert_eq!(values("we shipped it last week", SignalKind::Status), vec!["completed"]);
        assert_eq!(values("that project is on hold", SignalKind::Status), vec!["paused"]);
    }

    #[test]
    fn test_vocabulary_terms() {
        let t = table();
        assert!(t.is_vocabulary_term("React"));
        assert!(t.is_vocabulary_term(" python "));
        assert!(!t.is_vocabulary_term("Carvis"));
        assert!(!t.is_vocabulary_term("Web Development"));
    }

    #[test]
    fn test_extra_rules_and_zero_weight() {
        let extra = vec![
            RuleSpec::new(r"(?i)\bzig\b", SignalKind::Language, "Zig"),
            RuleSpec::new(r"(?i)\bcobol\b", SignalKind::Language, "COBOL").with_weight(0.0),
        ];
        let t = RuleTable::with_extra(&extra).unwrap();
        let langs: Vec<_> = t
            .scan("zig and cobol")
            .into_iter()
            .filter(|h| h.signal == SignalKind::Language)
            .map(|h| h.value)
            .collect();
        assert_eq!(langs, vec!["Zig"]);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = RuleTable::from_specs(&[RuleSpec::new("(unclosed", SignalKind::Tool, "X")])
            .unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_technologies_in() {
        let techs = table().technologies_in("Django app on PostgreSQL with Docker");
        let expected: BTreeSet<String> = ["Django", "PostgreSQL", "Docker"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(techs, expected);
    }
}
