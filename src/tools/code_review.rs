//! AI-backed code review.
//!
//! The primary path asks the configured LLM for a structured review. When the
//! model is unavailable the fallback executor substitutes [`heuristic_review`],
//! a deterministic scan for common risky patterns.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::fallback::{DependencyError, FallbackReason};
use crate::core::registry::{ExternalTool, ParamType, ParameterSpec, ToolArguments, ToolDescriptor};
use crate::tools::llm::{ChatClient, ChatMessage};

pub const NAME: &str = "review_code";

/// Lines longer than this are reported.
const MAX_LINE_LENGTH: usize = 120;

const SYSTEM_PROMPT: &str = "You are a meticulous senior code reviewer. Reply with a single JSON object \
and nothing else, using the shape {\"summary\": string, \"issues\": [{\"severity\": \"high\"|\"medium\"|\"low\", \
\"line\": number|null, \"message\": string}], \"suggestions\": [string]}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
enum Focus {
    #[default]
    General,
    Security,
    Performance,
    Readability,
}

impl Focus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Readability => "readability",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "general" => Some(Self::General),
            "security" => Some(Self::Security),
            "performance" => Some(Self::Performance),
            "readability" => Some(Self::Readability),
            _ => None,
        }
    }
}

struct ReviewRequest<'a> {
    code: &'a str,
    language: Option<&'a str>,
    focus: Focus,
}

impl<'a> ReviewRequest<'a> {
    fn from_arguments(arguments: &'a ToolArguments) -> Self {
        Self {
            code: arguments.str("code").unwrap_or_default(),
            language: arguments.str("language"),
            focus: arguments.str("focus").and_then(Focus::parse).unwrap_or_default(),
        }
    }
}

struct Rule {
    regex: Regex,
    kind: &'static str,
    category: Focus,
    severity: &'static str,
    message: &'static str,
}

impl Rule {
    #[allow(clippy::expect_used)]
    fn new(
        pattern: &str,
        kind: &'static str,
        category: Focus,
        severity: &'static str,
        message: &'static str,
    ) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Hardcoded review rule pattern should be valid"),
            kind,
            category,
            severity,
            message,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(r"\beval\s*\(", "dynamic_eval", Focus::Security, "high", "Dynamic code evaluation"),
        Rule::new(
            r#"(?i)\b(password|passwd|secret|api_?key|token)\b\s*[:=]\s*["'][^"']+["']"#,
            "hardcoded_secret",
            Focus::Security,
            "high",
            "Possible hard-coded credential",
        ),
        Rule::new(r"\.innerHTML\s*=", "inner_html", Focus::Security, "medium", "Assignment to innerHTML can enable XSS"),
        Rule::new(
            r"\b(os\.system|subprocess\.call|exec)\s*\(",
            "shell_exec",
            Focus::Security,
            "medium",
            "Command execution with possibly untrusted input",
        ),
        Rule::new(r"(?i)select\s+\*\s+from", "select_star", Focus::Performance, "low", "Query selects every column"),
        Rule::new(
            r"\b(time\.sleep|Thread\.sleep|std::thread::sleep)\s*\(",
            "blocking_sleep",
            Focus::Performance,
            "low",
            "Blocking sleep",
        ),
        Rule::new(r"\.unwrap\(\)", "unwrap", Focus::General, "medium", "unwrap() panics on error"),
        Rule::new(r"\bconsole\.log\s*\(", "debug_logging", Focus::Readability, "low", "Leftover debug logging"),
        Rule::new(r"\b(TODO|FIXME|XXX)\b", "todo_marker", Focus::Readability, "low", "Unresolved TODO/FIXME marker"),
    ]
});

#[derive(Debug, Serialize)]
struct Finding {
    #[serde(rename = "type")]
    kind: &'static str,
    category: Focus,
    severity: &'static str,
    line: usize,
    message: String,
}

/// Code reviewer backed by a chat-completion model.
pub struct CodeReviewer {
    descriptor: ToolDescriptor,
    client: ChatClient,
}

impl CodeReviewer {
    pub fn new(client: ChatClient) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                NAME,
                "Review source code with an AI model. Falls back to a local heuristic review \
                 (status \"mock_analysis\") when the model is unavailable.",
            )
            .with_parameter(ParameterSpec::new("code", ParamType::String, "Source code to review").required())
            .with_parameter(ParameterSpec::new(
                "language",
                ParamType::String,
                "Programming language of the code",
            ))
            .with_parameter(
                ParameterSpec::new("focus", ParamType::String, "Aspect to concentrate on")
                    .one_of(&["general", "security", "performance", "readability"])
                    .with_default("general"),
            ),
            client,
        }
    }
}

#[async_trait::async_trait]
impl ExternalTool for CodeReviewer {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    async fn primary(&self, arguments: &ToolArguments) -> Result<Value, DependencyError> {
        let request = ReviewRequest::from_arguments(arguments);
        let prompt = format!(
            "Review the following {} code with a {} focus.\n\n```\n{}\n```",
            request.language.unwrap_or("source"),
            request.focus.as_str(),
            request.code,
        );

        let completion = self
            .client
            .complete(&[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)])
            .await?;

        let mut review = parse_completion(&completion);
        review.insert("focus".to_string(), json!(request.focus));
        review.insert("model".to_string(), json!(self.client.model()));
        if let Some(language) = request.language {
            review.insert("language".to_string(), json!(language));
        }
        Ok(Value::Object(review))
    }

    fn fallback(&self, arguments: &ToolArguments, reason: &FallbackReason) -> Value {
        let mut review = heuristic_review(&ReviewRequest::from_arguments(arguments));
        if let Value::Object(map) = &mut review {
            map.insert(
                "note".to_string(),
                json!(format!("AI analysis unavailable ({}); results are heuristic", reason)),
            );
        }
        review
    }
}

/// Decode the model's reply. A JSON object (optionally inside a markdown
/// fence) is used as is; anything else becomes the summary.
fn parse_completion(completion: &str) -> Map<String, Value> {
    let trimmed = completion.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("summary".to_string(), json!(trimmed));
            map
        }
    }
}

/// Deterministic local review used when the model cannot be reached.
fn heuristic_review(request: &ReviewRequest<'_>) -> Value {
    let mut findings = Vec::new();
    let mut non_blank = 0;
    let mut comments = 0;
    let mut longest = 0;

    for (index, line) in request.code.lines().enumerate() {
        let number = index + 1;
        let trimmed = line.trim_start();
        let length = line.chars().count();
        longest = longest.max(length);

        if trimmed.is_empty() {
            continue;
        }
        non_blank += 1;
        if ["//", "#", "/*", "*", "--"].iter().any(|p| trimmed.starts_with(p)) {
            comments += 1;
        }

        if length > MAX_LINE_LENGTH {
            findings.push(Finding {
                kind: "long_line",
                category: Focus::Readability,
                severity: "low",
                line: number,
                message: format!("Line is {} characters long (limit {})", length, MAX_LINE_LENGTH),
            });
        }

        for rule in RULES.iter().filter(|r| r.regex.is_match(line)) {
            findings.push(Finding {
                kind: rule.kind,
                category: rule.category,
                severity: rule.severity,
                line: number,
                message: rule.message.to_string(),
            });
        }
    }

    if request.focus != Focus::General {
        findings.retain(|f| f.category == request.focus);
    }

    let total_lines = request.code.lines().count();
    json!({
        "summary": format!(
            "Heuristic review of {} lines found {} potential issue(s).",
            total_lines,
            findings.len()
        ),
        "issues": findings,
        "metrics": {
            "lines": total_lines,
            "non_blank_lines": non_blank,
            "comment_lines": comments,
            "longest_line": longest,
        },
        "focus": request.focus,
        "language": request.language,
    })
}
