use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

/// A worked example shown with the problem statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub id: u32,
    pub input_text: String,
    pub output_text: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complexity {
    pub time: String,
    pub space: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub approach: String,
    #[serde(default)]
    pub explanation: Vec<String>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
    /// Display text shown to the learner
    pub code: String,
    /// Reference markup for markup problems (starter HTML when absent)
    #[serde(default)]
    pub html: Option<String>,
    /// Reference stylesheet for markup problems (`code` when absent)
    #[serde(default)]
    pub css: Option<String>,
}

/// One fixed input/output pair for an algorithmic problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    pub args: Vec<Value>,
    pub expected: Value,
}

/// Markup assertion over the constructed document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum StructuralAssertion {
    /// At least one element matches `selector`
    Exists {
        selector: String,
        #[serde(default)]
        message: Option<String>,
    },
    /// At least `min` elements match `selector`
    MinCount {
        selector: String,
        min: usize,
        #[serde(default)]
        message: Option<String>,
    },
}

impl StructuralAssertion {
    pub fn selector(&self) -> &str {
        match self {
            StructuralAssertion::Exists { selector, .. } => selector,
            StructuralAssertion::MinCount { selector, .. } => selector,
        }
    }

    pub fn label(&self) -> String {
        match self {
            StructuralAssertion::Exists { selector, .. } => format!("element `{}` exists", selector),
            StructuralAssertion::MinCount { selector, min, .. } => {
                format!("at least {} × `{}`", min, selector)
            }
        }
    }
}

/// Declaration assertion over the merged rule block of one selector
///
/// Passes when any of `properties` is declared and, if `token` is set,
/// the declared value contains that token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleAssertion {
    pub selector: String,
    pub properties: Vec<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StyleAssertion {
    pub fn label(&self) -> String {
        match &self.token {
            Some(token) => format!("`{}` {}: {}", self.selector, self.properties.join(" | "), token),
            None => format!("`{}` declares {}", self.selector, self.properties.join(" | ")),
        }
    }
}

/// Validation payload, one variant per problem kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProblemKind {
    Algorithmic {
        entry_point: String,
        starter_code: String,
        vectors: Vec<TestVector>,
    },
    Markup {
        starter_html: String,
        starter_css: String,
        #[serde(default)]
        structure: Vec<StructuralAssertion>,
        #[serde(default)]
        style: Vec<StyleAssertion>,
    },
}

impl ProblemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProblemKind::Algorithmic { .. } => "algorithmic",
            ProblemKind::Markup { .. } => "markup",
        }
    }

    pub fn language(&self) -> &'static str {
        match self {
            ProblemKind::Algorithmic { .. } => "JavaScript",
            ProblemKind::Markup { .. } => "HTML/CSS",
        }
    }
}

/// Immutable problem definition, keyed by `slug` in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub category: String,
    pub order: u32,
    #[serde(default)]
    pub video_id: Option<String>,
    pub statement: Vec<String>,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub solution: Solution,
    pub kind: ProblemKind,
}

impl Problem {
    /// Declared signature the learner source is sliced from
    pub fn signature(&self) -> Option<String> {
        match &self.kind {
            ProblemKind::Algorithmic { entry_point, .. } => Some(format!("function {}(", entry_point)),
            ProblemKind::Markup { .. } => None,
        }
    }

    /// Fresh submission holding the starter code
    pub fn starter(&self) -> Submission {
        match &self.kind {
            ProblemKind::Algorithmic { starter_code, .. } => Submission::code(starter_code.clone()),
            ProblemKind::Markup {
                starter_html,
                starter_css,
                ..
            } => Submission::markup(starter_html.clone(), starter_css.clone()),
        }
    }

    /// The reference solution as a submission of the matching kind
    pub fn reference(&self) -> Submission {
        match &self.kind {
            ProblemKind::Algorithmic { .. } => Submission::code(self.solution.code.clone()),
            ProblemKind::Markup { starter_html, .. } => Submission::markup(
                self.solution.html.clone().unwrap_or_else(|| starter_html.clone()),
                self.solution.css.clone().unwrap_or_else(|| self.solution.code.clone()),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    Code { source: String },
    Markup { html: String, css: String },
}

impl Submission {
    pub fn code(source: impl Into<String>) -> Self {
        Submission::Code {
            source: source.into(),
        }
    }

    pub fn markup(html: impl Into<String>, css: impl Into<String>) -> Self {
        Submission::Markup {
            html: html.into(),
            css: css.into(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Submission::Code { .. } => "algorithmic",
            Submission::Markup { .. } => "markup",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Submission::Code { source } => source.len(),
            Submission::Markup { html, css } => html.len() + css.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one evaluation attempt, as consumed by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verdict {
    pub fn passed() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Passed,
    Failed,
    RuntimeError,
    TimeLimitExceeded,
}

/// Outcome of a single test vector or markup assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub index: usize,
    pub label: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Accepted,
    Rejected,
}

/// Detailed grading of one attempt: every check is run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub attempt_id: Uuid,
    pub slug: String,
    pub evaluated_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub total: usize,
    pub verdict: Verdict,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verdict_wire_shape() {
        let passed = serde_json::to_value(Verdict::passed()).unwrap();
        assert_eq!(passed, json!({ "passed": true }));

        let failed = serde_json::to_value(Verdict::failed("nope")).unwrap();
        assert_eq!(failed, json!({ "passed": false, "message": "nope" }));
    }

    #[test]
    fn test_submission_tagging() {
        let code = serde_json::to_value(Submission::code("function f(){}")).unwrap();
        assert_eq!(code["kind"], "code");
        assert_eq!(code["source"], "function f(){}");

        let markup: Submission =
            serde_json::from_value(json!({ "kind": "markup", "html": "<p></p>", "css": "" })).unwrap();
        assert_eq!(markup.kind_name(), "markup");
        assert_eq!(markup.len(), 7);
    }

    #[test]
    fn test_structural_assertion_tagging() {
        let assertion: StructuralAssertion =
            serde_json::from_value(json!({ "check": "min_count", "selector": ".navbar a", "min": 3 })).unwrap();
        assert_eq!(assertion.selector(), ".navbar a");
        assert!(assertion.label().contains("3"));
    }
}
