//! Markdown accessibility checker.
//!
//! Flags images without alt text, broken heading structure and unhelpful link
//! text. Fenced code blocks are skipped. Purely local and deterministic.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::error::ToolError;
use crate::core::registry::{ParamType, ParameterSpec, Tool, ToolArguments, ToolDescriptor};

pub const NAME: &str = "check_markdown";

#[allow(clippy::expect_used)]
static IMAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("Hardcoded image regex pattern should be valid")
});

#[allow(clippy::expect_used)]
static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").expect("Hardcoded link regex pattern should be valid")
});

#[allow(clippy::expect_used)]
static HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})(?:\s+(.*))?$").expect("Hardcoded heading regex pattern should be valid")
});

const AMBIGUOUS_LINK_TEXT: &[&str] = &["click here", "here", "read more", "more", "link", "this link"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
struct Issue {
    #[serde(rename = "type")]
    kind: &'static str,
    severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    message: String,
}

impl Issue {
    fn at(line: usize, kind: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            line: Some(line),
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarkdownArgs {
    content: String,
    #[serde(default = "default_check_links")]
    check_links: bool,
}

fn default_check_links() -> bool {
    true
}

/// Local markdown accessibility checker.
pub struct MarkdownChecker {
    descriptor: ToolDescriptor,
}

impl MarkdownChecker {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                NAME,
                "Check markdown content for accessibility problems: images without alt text, \
                 skipped heading levels, empty headings and unhelpful link text.",
            )
            .with_parameter(
                ParameterSpec::new("content", ParamType::String, "Markdown document to check")
                    .required(),
            )
            .with_parameter(
                ParameterSpec::new(
                    "check_links",
                    ParamType::Boolean,
                    "Also report empty or ambiguous link text",
                )
                .with_default(true),
            ),
        }
    }
}

impl Default for MarkdownChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for MarkdownChecker {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, arguments: &ToolArguments) -> Result<Value, ToolError> {
        let args: MarkdownArgs = arguments.deserialize()?;
        Ok(analyze(&args.content, args.check_links))
    }
}

fn analyze(content: &str, check_links: bool) -> Value {
    let mut issues = Vec::new();
    let mut in_fence = false;
    let mut previous_level: Option<usize> = None;
    let mut h1_count = 0;

    for (index, line) in content.lines().enumerate() {
        let number = index + 1;
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = HEADING_REGEX.captures(trimmed) {
            let level = caps[1].len();
            let text = caps
                .get(2)
                .map(|m| m.as_str().trim().trim_end_matches('#').trim())
                .unwrap_or("");

            if text.is_empty() {
                issues.push(Issue::at(number, "empty_heading", Severity::Error, "Heading has no text"));
            }
            if level == 1 {
                h1_count += 1;
                if h1_count == 2 {
                    issues.push(Issue::at(
                        number,
                        "multiple_h1",
                        Severity::Warning,
                        "Document has more than one top-level heading",
                    ));
                }
            }
            if let Some(prev) = previous_level {
                if level > prev + 1 {
                    issues.push(Issue::at(
                        number,
                        "heading_level_skip",
                        Severity::Warning,
                        format!("Heading level jumps from h{} to h{}", prev, level),
                    ));
                }
            }
            previous_level = Some(level);
            continue;
        }

        for caps in IMAGE_REGEX.captures_iter(line) {
            if caps[1].trim().is_empty() {
                issues.push(Issue::at(
                    number,
                    "missing_alt_text",
                    Severity::Error,
                    format!("Image '{}' is missing alt text", caps[2].trim()),
                ));
            }
        }

        if check_links {
            for caps in LINK_REGEX.captures_iter(line) {
                let start = caps.get(0).map_or(0, |m| m.start());
                // Images are checked above
                if line[..start].ends_with('!') {
                    continue;
                }
                let text = caps[1].trim();
                let target = caps[2].trim();
                if text.is_empty() {
                    issues.push(Issue::at(
                        number,
                        "empty_link_text",
                        Severity::Error,
                        format!("Link to '{}' has no text", target),
                    ));
                } else if AMBIGUOUS_LINK_TEXT.contains(&text.to_lowercase().as_str()) {
                    issues.push(Issue::at(
                        number,
                        "ambiguous_link_text",
                        Severity::Warning,
                        format!("Link text '{}' does not describe its target '{}'", text, target),
                    ));
                }
            }
        }
    }

    if h1_count == 0 && !content.trim().is_empty() {
        issues.push(Issue {
            kind: "missing_h1",
            severity: Severity::Warning,
            line: None,
            message: "Document has no top-level heading".to_string(),
        });
    }

    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let warnings = issues.len() - errors;
    let score = 100usize.saturating_sub(errors * 10 + warnings * 5);

    json!({
        "issues": issues,
        "summary": {
            "total": issues.len(),
            "errors": errors,
            "warnings": warnings,
        },
        "score": score,
        "lines": content.lines().count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(report: &Value) -> Vec<String> {
        report["issues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_missing_alt_text() {
        let report = analyze("# Title\n\n![](diagram.png)\n![A cat](cat.png)\n", true);
        let issues = report["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["type"], "missing_alt_text");
        assert_eq!(issues[0]["line"], 3);
        assert!(issues[0]["message"].as_str().unwrap().contains("alt text"));
        assert!(issues[0]["message"].as_str().unwrap().contains("diagram.png"));
    }

    #[test]
    fn test_heading_structure() {
        let report = analyze("# One\n### Three\n# Again\n##\n", true);
        let kinds = kinds(&report);
        assert!(kinds.contains(&"heading_level_skip".to_string()));
        assert!(kinds.contains(&"multiple_h1".to_string()));
        assert!(kinds.contains(&"empty_heading".to_string()));
        assert!(!kinds.contains(&"missing_h1".to_string()));
    }

    #[test]
    fn test_missing_h1() {
        let report = analyze("## Section\ntext\n", true);
        assert_eq!(kinds(&report), vec!["missing_h1"]);
        assert!(report["issues"][0].get("line").is_none());
    }

    #[test]
    fn test_link_text_checks_can_be_disabled() {
        let doc = "# Doc\n[click here](https://example.com) and [](https://x.dev)\n";
        let kinds_on = kinds(&analyze(doc, true));
        assert!(kinds_on.contains(&"ambiguous_link_text".to_string()));
        assert!(kinds_on.contains(&"empty_link_text".to_string()));

        assert!(kinds(&analyze(doc, false)).is_empty());
    }

    #[test]
    fn test_images_are_not_links() {
        let report = analyze("# Doc\n![logo](logo.png)\n", true);
        assert!(kinds(&report).is_empty());
        assert_eq!(report["score"], 100);
    }

    #[test]
    fn test_adjacent_links_are_all_checked() {
        let report = analyze("# Doc\n[a](x)[here](y)\n", true);
        assert_eq!(kinds(&report), vec!["ambiguous_link_text"]);

        let report = analyze("# Doc\n[docs](d)![](p.png)\n", true);
        assert_eq!(kinds(&report), vec!["missing_alt_text"]);
    }

    #[test]
    fn test_code_fences_are_ignored() {
        let doc = "# Doc\n```md\n![](x.png)\n### skipped\n```\n";
        assert!(kinds(&analyze(doc, true)).is_empty());
    }

    #[test]
    fn test_score_and_determinism() {
        let doc = "![](a.png)\n### deep\n";
        let first = analyze(doc, true);
        assert_eq!(first, analyze(doc, true));
        // one error, one warning (missing h1)
        assert_eq!(first["summary"]["errors"], 1);
        assert_eq!(first["summary"]["warnings"], 1);
        assert_eq!(first["score"], 85);
    }

    #[tokio::test]
    async fn test_execute_uses_validated_arguments() {
        let tool = MarkdownChecker::new();
        let args = tool
            .descriptor()
            .validate(json!({ "content": "# Hi\n![](x.png)" }))
            .unwrap();
        let report = tool.execute(&args).await.unwrap();
        assert_eq!(report["summary"]["errors"], 1);
    }
}
