/// Checkers - One Handler per Problem Kind
///
/// **Core Responsibility:**
/// Decide whether a materialized submission satisfies a problem's
/// validation payload.
///
/// **Critical Properties:**
/// - Knows nothing about the script engine (works on any `Callable`)
/// - Knows nothing about persistence
/// - Deterministic: no timers, no network, no randomness
///
/// **Two Modes:**
/// - `check_*`: stop at the first failing check and return its error
///   (feeds the pass/fail `Verdict`)
/// - `grade_*`: run every check and record a `CheckResult` for each
///   (feeds the `EvaluationReport`)
use kata_common::types::{CheckResult, CheckStatus, StructuralAssertion, StyleAssertion, TestVector};
use serde_json::Value;

use crate::assert::assert_deep_strict_equal;
use crate::dom::{assert_element_exists, assert_min_count, TestDocument};
use crate::error::{EvalError, Result};
use crate::script::Callable;

/// Call `function` with each vector's arguments in order, stopping at the
/// first mismatch
pub fn check_vectors(vectors: &[TestVector], function: &mut dyn Callable) -> Result<()> {
    for (case, vector) in vectors.iter().enumerate() {
        let actual = function.call(&vector.args)?;
        assert_deep_strict_equal(case, &actual, &vector.expected)?;
    }
    Ok(())
}

/// Status of one graded check given how it ended
pub fn status_for(outcome: &Result<()>) -> CheckStatus {
    match outcome {
        Ok(()) => CheckStatus::Passed,
        Err(EvalError::Validation { .. })
        | Err(EvalError::Structural { .. })
        | Err(EvalError::StyleRule { .. }) => CheckStatus::Failed,
        Err(EvalError::Timeout { .. }) => CheckStatus::TimeLimitExceeded,
        Err(_) => CheckStatus::RuntimeError,
    }
}

fn check_result(index: usize, label: String, outcome: Result<()>) -> CheckResult {
    let status = status_for(&outcome);
    CheckResult {
        index,
        label,
        status,
        detail: outcome.err().map(|e| e.to_string()),
    }
}

pub fn vector_label(vector: &TestVector) -> String {
    let args: Vec<String> = vector.args.iter().map(Value::to_string).collect();
    format!("({}) → {}", args.join(", "), vector.expected)
}

/// Grade a single vector from the value the learner function produced
pub fn grade_vector(index: usize, vector: &TestVector, actual: Result<Value>) -> CheckResult {
    let outcome = actual.and_then(|value| assert_deep_strict_equal(index, &value, &vector.expected));
    check_result(index, vector_label(vector), outcome)
}

/// Every vector fails the same way (e.g. the source never materialized)
pub fn grade_all_failed(vectors: &[TestVector], error: &EvalError) -> Vec<CheckResult> {
    vectors
        .iter()
        .enumerate()
        .map(|(index, vector)| check_result(index, vector_label(vector), Err(error.clone())))
        .collect()
}

pub fn check_structural(doc: &TestDocument, assertion: &StructuralAssertion) -> Result<()> {
    let outcome = match assertion {
        StructuralAssertion::Exists { selector, .. } => assert_element_exists(doc, selector),
        StructuralAssertion::MinCount { selector, min, .. } => assert_min_count(doc, selector, *min),
    };

    let custom = match assertion {
        StructuralAssertion::Exists { message, .. } => message,
        StructuralAssertion::MinCount { message, .. } => message,
    };

    match (outcome, custom) {
        (Err(EvalError::Structural { selector, .. }), Some(message)) => Err(EvalError::Structural {
            selector,
            message: message.clone(),
        }),
        (outcome, _) => outcome,
    }
}

/// Any listed property declared on the selector's merged rule block, with
/// the token present in its value when one is required
pub fn check_style(doc: &TestDocument, assertion: &StyleAssertion) -> Result<()> {
    let Some(block) = doc.stylesheet().declarations(&assertion.selector) else {
        return Err(EvalError::StyleRule {
            selector: assertion.selector.clone(),
            message: format!("CSS rules for `{}` not found", assertion.selector),
        });
    };

    let satisfied = assertion.properties.iter().any(|property| match &assertion.token {
        Some(token) => block.has_token(property, token),
        None => block.contains(property),
    });
    if satisfied {
        return Ok(());
    }

    let message = assertion.message.clone().unwrap_or_else(|| {
        let properties = assertion.properties.join(" or ");
        match &assertion.token {
            Some(token) => format!("`{}` should use {}: {}", assertion.selector, properties, token),
            None => format!("`{}` should declare {}", assertion.selector, properties),
        }
    });

    Err(EvalError::StyleRule {
        selector: assertion.selector.clone(),
        message,
    })
}

/// Structural assertions in order, then style assertions in order; the
/// first failure aborts
pub fn check_markup(
    doc: &TestDocument,
    structure: &[StructuralAssertion],
    style: &[StyleAssertion],
) -> Result<()> {
    for assertion in structure {
        check_structural(doc, assertion)?;
    }
    for assertion in style {
        check_style(doc, assertion)?;
    }
    Ok(())
}

pub fn grade_markup(
    doc: &TestDocument,
    structure: &[StructuralAssertion],
    style: &[StyleAssertion],
) -> Vec<CheckResult> {
    let structural = structure
        .iter()
        .map(|a| (a.label(), check_structural(doc, a)));
    let styled = style.iter().map(|a| (a.label(), check_style(doc, a)));

    structural
        .chain(styled)
        .enumerate()
        .map(|(index, (label, outcome))| check_result(index, label, outcome))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::create_test_dom;
    use serde_json::json;

    fn vectors() -> Vec<TestVector> {
        vec![
            TestVector { args: vec![json!(1), json!(2)], expected: json!(3) },
            TestVector { args: vec![json!(5), json!(5)], expected: json!(10) },
        ]
    }

    fn style(selector: &str, property: &str, token: Option<&str>) -> StyleAssertion {
        StyleAssertion {
            selector: selector.to_string(),
            properties: vec![property.to_string()],
            token: token.map(str::to_string),
            message: None,
        }
    }

    #[test]
    fn test_check_vectors_with_closures() {
        let mut add = |args: &[Value]| -> Result<Value> {
            Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
        };
        assert!(check_vectors(&vectors(), &mut add).is_ok());

        let mut sub = |args: &[Value]| -> Result<Value> {
            Ok(json!(args[0].as_i64().unwrap_or(0) - args[1].as_i64().unwrap_or(0)))
        };
        let err = check_vectors(&vectors(), &mut sub).unwrap_err();
        assert_eq!(
            err,
            EvalError::Validation { case: 0, actual: "-1".to_string(), expected: "3".to_string() }
        );
    }

    #[test]
    fn test_check_vectors_propagates_runtime_errors() {
        let mut boom = |_: &[Value]| -> Result<Value> { Err(EvalError::Runtime("boom".to_string())) };
        let err = check_vectors(&vectors(), &mut boom).unwrap_err();
        assert_eq!(status_for(&Err(err)), CheckStatus::RuntimeError);
    }

    #[test]
    fn test_grade_vector_statuses() {
        let all = vectors();
        let v = &all[0];
        assert_eq!(grade_vector(0, v, Ok(json!(3))).status, CheckStatus::Passed);

        let failed = grade_vector(0, v, Ok(json!(4)));
        assert_eq!(failed.status, CheckStatus::Failed);
        assert!(failed.detail.unwrap().contains("actual 4"));

        let timed_out = grade_vector(0, v, Err(EvalError::Timeout { limit_ms: 10 }));
        assert_eq!(timed_out.status, CheckStatus::TimeLimitExceeded);
        assert_eq!(timed_out.label, "(1, 2) → 3");
    }

    #[test]
    fn test_style_token_and_missing_rules() {
        let doc = create_test_dom(
            "<div class=\"container\"></div>",
            ".container { display: inline-flex; justify-content: center; }",
        );
        assert!(check_style(&doc, &style(".container", "justify-content", Some("center"))).is_ok());
        assert!(check_style(&doc, &style(".container", "display", Some("flex"))).is_err());
        assert!(check_style(&doc, &style(".container", "display", None)).is_ok());

        let err = check_style(&doc, &style(".box", "display", None)).unwrap_err();
        assert!(matches!(err, EvalError::StyleRule { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_style_any_of_properties() {
        let doc = create_test_dom("<nav class=\"navbar\"></nav>", ".navbar { background: #333; }");
        let assertion = StyleAssertion {
            selector: ".navbar".to_string(),
            properties: vec!["background-color".to_string(), "background".to_string()],
            token: None,
            message: Some("Navbar should have a background color".to_string()),
        };
        assert!(check_style(&doc, &assertion).is_ok());

        let bare = create_test_dom("<nav class=\"navbar\"></nav>", ".navbar { padding: 1rem; }");
        let err = check_style(&bare, &assertion).unwrap_err();
        assert_eq!(err.to_string(), "Navbar should have a background color");
    }

    #[test]
    fn test_markup_checks_structure_first() {
        let doc = create_test_dom("<div class=\"box\"></div>", "");
        let structure = vec![StructuralAssertion::Exists {
            selector: ".container".to_string(),
            message: Some("Missing .container".to_string()),
        }];
        let styles = vec![style(".container", "display", Some("flex"))];

        let err = check_markup(&doc, &structure, &styles).unwrap_err();
        assert!(matches!(err, EvalError::Structural { .. }));
        assert_eq!(err.to_string(), "Missing .container");

        let graded = grade_markup(&doc, &structure, &styles);
        assert_eq!(graded.len(), 2);
        assert!(graded.iter().all(|c| c.status == CheckStatus::Failed));
        assert_eq!(graded[1].index, 1);
    }
}
