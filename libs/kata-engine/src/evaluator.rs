/// Evaluation Invocation - Submission In, Verdict Out
///
/// **Core Responsibility:**
/// Look up a problem, materialize the submission the way its kind requires,
/// run the kind's checker and fold the outcome into a `Verdict`.
///
/// **Critical Properties:**
/// - Never fails: every error becomes a failed `Verdict`
/// - Stateless: the registry is borrowed, nothing is cached between calls
/// - Idempotent: identical inputs produce identical verdicts
///
/// **Message Rules:**
/// - Validation mismatch → "One or more test cases failed"
/// - Any other error → the error's own message
/// - Success → no message
///
/// **Two Entry Points:**
/// - `evaluate`: stops at the first failing check (editor Run/Submit)
/// - `grade`: runs every check and returns an `EvaluationReport`
use std::time::Instant;

use chrono::Utc;
use kata_common::config::EngineConfig;
use kata_common::types::{
    CheckResult, CheckStatus, EvaluationReport, Problem, ProblemKind, ReportStatus, Submission,
    TestVector, Verdict,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::checks;
use crate::dom::create_test_dom;
use crate::error::{EvalError, Result};
use crate::registry::Registry;
use crate::script::{
    extract_from_signature, run_with_deadline, Callable, SandboxLimits, ScriptFunction,
};

pub const VALIDATION_FAILED_MESSAGE: &str = "One or more test cases failed";

/// Fold a checker outcome into the wire-level verdict
pub fn verdict_from(outcome: Result<()>) -> Verdict {
    match outcome {
        Ok(()) => Verdict::passed(),
        Err(e) if e.is_validation() => Verdict::failed(VALIDATION_FAILED_MESSAGE),
        Err(e) => Verdict::failed(e.to_string()),
    }
}

pub struct Evaluator<'r> {
    registry: &'r Registry,
    limits: SandboxLimits,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry, config: &EngineConfig) -> Self {
        Self {
            registry,
            limits: SandboxLimits::from(config),
        }
    }

    pub fn with_limits(registry: &'r Registry, limits: SandboxLimits) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Evaluate `submission` against the problem registered under `slug`
    #[tracing::instrument(skip(self, submission), fields(slug = %slug, kind = submission.kind_name()))]
    pub fn evaluate(&self, slug: &str, submission: &Submission) -> Verdict {
        let start = Instant::now();
        let outcome = self.check(slug, submission);

        if let Err(EvalError::UnknownProblem(_)) = &outcome {
            error!(slug, "Evaluation requested for a slug that is not in the registry");
        }

        let verdict = verdict_from(outcome);
        info!(
            slug,
            passed = verdict.passed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluation finished"
        );
        verdict
    }

    /// The fallible core of `evaluate`
    pub fn check(&self, slug: &str, submission: &Submission) -> Result<()> {
        let problem = self.lookup(slug)?;
        self.check_size(submission)?;

        match (&problem.kind, submission) {
            (
                ProblemKind::Algorithmic {
                    entry_point,
                    vectors,
                    ..
                },
                Submission::Code { source },
            ) => self.check_script(entry_point, source, vectors),
            (
                ProblemKind::Markup {
                    structure, style, ..
                },
                Submission::Markup { html, css },
            ) => {
                let doc = create_test_dom(html, css);
                checks::check_markup(&doc, structure, style)
            }
            (kind, submission) => Err(mismatch(problem, kind, submission)),
        }
    }

    /// Grade every check of `slug` and report each outcome
    #[tracing::instrument(
        skip(self, submission),
        fields(slug = %slug, attempt_id = tracing::field::Empty)
    )]
    pub fn grade(&self, slug: &str, submission: &Submission) -> EvaluationReport {
        let attempt_id = Uuid::new_v4();
        tracing::Span::current().record("attempt_id", tracing::field::display(&attempt_id));
        let start = Instant::now();

        let (checks, verdict) = match self.grade_checks(slug, submission) {
            Ok((checks, verdict)) => (checks, verdict),
            Err(e) => {
                if let EvalError::UnknownProblem(_) = &e {
                    error!(slug, "Grading requested for a slug that is not in the registry");
                }
                (Vec::new(), verdict_from(Err(e)))
            }
        };

        let passed = checks
            .iter()
            .filter(|c| c.status == CheckStatus::Passed)
            .count();
        let status = if verdict.passed {
            ReportStatus::Accepted
        } else {
            ReportStatus::Rejected
        };

        info!(
            slug,
            attempt_id = %attempt_id,
            status = ?status,
            passed,
            total = checks.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Grading finished"
        );

        EvaluationReport {
            attempt_id,
            slug: slug.to_string(),
            evaluated_at: Utc::now(),
            status,
            total: checks.len(),
            passed,
            checks,
            verdict,
        }
    }

    fn grade_checks(
        &self,
        slug: &str,
        submission: &Submission,
    ) -> Result<(Vec<CheckResult>, Verdict)> {
        let problem = self.lookup(slug)?;
        self.check_size(submission)?;

        let (checks, validation_is_generic) = match (&problem.kind, submission) {
            (
                ProblemKind::Algorithmic {
                    entry_point,
                    vectors,
                    ..
                },
                Submission::Code { source },
            ) => (self.grade_script(entry_point, source, vectors), true),
            (
                ProblemKind::Markup {
                    structure, style, ..
                },
                Submission::Markup { html, css },
            ) => {
                let doc = create_test_dom(html, css);
                (checks::grade_markup(&doc, structure, style), false)
            }
            (kind, submission) => return Err(mismatch(problem, kind, submission)),
        };

        let verdict = match checks.iter().find(|c| c.status != CheckStatus::Passed) {
            None => Verdict::passed(),
            Some(c) if c.status == CheckStatus::Failed && validation_is_generic => {
                Verdict::failed(VALIDATION_FAILED_MESSAGE)
            }
            Some(c) => Verdict::failed(c.detail.clone().unwrap_or_default()),
        };

        Ok((checks, verdict))
    }

    fn lookup(&self, slug: &str) -> Result<&'r Problem> {
        self.registry
            .get(slug)
            .ok_or_else(|| EvalError::UnknownProblem(slug.to_string()))
    }

    fn check_size(&self, submission: &Submission) -> Result<()> {
        if submission.len() > self.limits.max_source_bytes {
            return Err(EvalError::SourceTooLarge {
                size: submission.len(),
                limit: self.limits.max_source_bytes,
            });
        }
        Ok(())
    }

    /// One sandbox for the whole run, sharing the wall-clock budget
    fn check_script(&self, entry_point: &str, source: &str, vectors: &[TestVector]) -> Result<()> {
        let signature = format!("function {}(", entry_point);
        let sliced = extract_from_signature(source, &signature)?.to_string();
        let entry_point = entry_point.to_string();
        let vectors = vectors.to_vec();
        let limits = self.limits.clone();

        run_with_deadline(self.limits.timeout, move |deadline| {
            let mut function = ScriptFunction::materialize(&sliced, &entry_point, &limits, deadline)?;
            checks::check_vectors(&vectors, &mut function)
        })
    }

    /// One sandbox per vector, each with its own wall-clock budget, so a
    /// hang in one case does not hide the outcome of the others
    fn grade_script(&self, entry_point: &str, source: &str, vectors: &[TestVector]) -> Vec<CheckResult> {
        let signature = format!("function {}(", entry_point);
        let sliced = match extract_from_signature(source, &signature) {
            Ok(sliced) => sliced.to_string(),
            Err(e) => return checks::grade_all_failed(vectors, &e),
        };

        vectors
            .iter()
            .enumerate()
            .map(|(index, vector)| {
                let sliced = sliced.clone();
                let entry_point = entry_point.to_string();
                let args = vector.args.clone();
                let limits = self.limits.clone();

                let actual = run_with_deadline(self.limits.timeout, move |deadline| {
                    let mut function =
                        ScriptFunction::materialize(&sliced, &entry_point, &limits, deadline)?;
                    function.call(&args)
                });
                checks::grade_vector(index, vector, actual)
            })
            .collect()
    }
}

fn mismatch(problem: &Problem, kind: &ProblemKind, submission: &Submission) -> EvalError {
    EvalError::SubmissionMismatch {
        slug: problem.slug.clone(),
        expected: kind.name(),
        actual: submission.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(registry: &Registry) -> Evaluator<'_> {
        Evaluator::new(registry, &EngineConfig::default())
    }

    #[test]
    fn test_verdict_from_messages() {
        assert_eq!(verdict_from(Ok(())), Verdict::passed());

        let validation = EvalError::Validation {
            case: 1,
            actual: "1".to_string(),
            expected: "2".to_string(),
        };
        assert_eq!(
            verdict_from(Err(validation)),
            Verdict::failed(VALIDATION_FAILED_MESSAGE)
        );

        let runtime = EvalError::Runtime("ReferenceError: x is not defined".to_string());
        assert_eq!(
            verdict_from(Err(runtime)),
            Verdict::failed("ReferenceError: x is not defined")
        );
    }

    #[test]
    fn test_unknown_slug_is_failed_verdict() {
        let registry = Registry::builtin().unwrap();
        let verdict = evaluator(&registry).evaluate("nope", &Submission::code("function add(){}"));
        assert!(!verdict.passed);
        assert_eq!(verdict.message.as_deref(), Some("Unknown problem: nope"));
    }

    #[test]
    fn test_kind_mismatch_is_failed_verdict() {
        let registry = Registry::builtin().unwrap();
        let verdict = evaluator(&registry).evaluate("sum", &Submission::markup("<p></p>", ""));
        assert!(!verdict.passed);
        assert!(verdict.message.unwrap().contains("expects algorithmic code, got markup code"));
    }

    #[test]
    fn test_missing_signature() {
        let registry = Registry::builtin().unwrap();
        let verdict = evaluator(&registry).evaluate("sum", &Submission::code("const add = (a, b) => a + b;"));
        assert!(!verdict.passed);
        assert!(verdict.message.unwrap().contains("function add"));
    }

    #[test]
    fn test_oversized_submission() {
        let registry = Registry::builtin().unwrap();
        let limits = SandboxLimits {
            max_source_bytes: 16,
            ..SandboxLimits::default()
        };
        let evaluator = Evaluator::with_limits(&registry, limits);
        let verdict = evaluator.evaluate("sum", &Submission::code("function add(a, b){ return a + b; }"));
        assert!(!verdict.passed);
        assert!(verdict.message.unwrap().contains("limit is 16 bytes"));
    }

    #[test]
    fn test_grade_reports_every_vector() {
        let registry = Registry::builtin().unwrap();
        let report = evaluator(&registry).grade(
            "reversestring",
            &Submission::code("function reverseString(s){ return s; }"),
        );
        assert_eq!(report.status, ReportStatus::Rejected);
        assert_eq!(report.total, 4);
        assert_eq!(report.passed, 2);
        assert_eq!(report.verdict, Verdict::failed(VALIDATION_FAILED_MESSAGE));

        let statuses: Vec<CheckStatus> = report.checks.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                CheckStatus::Failed,
                CheckStatus::Passed,
                CheckStatus::Failed,
                CheckStatus::Passed
            ]
        );
    }

    #[test]
    fn test_grade_unknown_slug() {
        let registry = Registry::builtin().unwrap();
        let report = evaluator(&registry).grade("nope", &Submission::code(""));
        assert_eq!(report.status, ReportStatus::Rejected);
        assert!(report.checks.is_empty());
        assert_eq!(report.total, 0);
    }
}
