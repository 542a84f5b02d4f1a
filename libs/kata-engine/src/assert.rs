/// Assertion Utility - Exact Structural Equality
///
/// **Comparison Rules:**
/// - Numbers: equal when their f64 values are identical (`3` equals `3.0`)
/// - Strings, booleans, null: equal by value, never coerced across types
/// - Arrays: same length, element-wise, order-sensitive
/// - Objects: same key set, value-wise
/// - Floating-point tolerance: NO
use serde_json::Value;

use crate::error::{EvalError, Result};

/// Structural strict equality over JSON values
pub fn deep_strict_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_strict_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| deep_strict_equal(x, y)))
        }
        _ => false,
    }
}

/// Succeeds silently; on mismatch fails with `EvalError::Validation`
///
/// `case` is the zero-based index of the test vector being checked.
pub fn assert_deep_strict_equal(case: usize, actual: &Value, expected: &Value) -> Result<()> {
    if deep_strict_equal(actual, expected) {
        return Ok(());
    }
    Err(EvalError::Validation {
        case,
        actual: actual.to_string(),
        expected: expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert!(deep_strict_equal(&json!(3), &json!(3)));
        assert!(deep_strict_equal(&json!(3), &json!(3.0)));
        assert!(deep_strict_equal(&json!("olleh"), &json!("olleh")));
        assert!(deep_strict_equal(&json!(true), &json!(true)));
        assert!(deep_strict_equal(&Value::Null, &Value::Null));

        assert!(!deep_strict_equal(&json!(3), &json!("3")));
        assert!(!deep_strict_equal(&json!(0), &json!(false)));
        assert!(!deep_strict_equal(&Value::Null, &json!("")));
        assert!(!deep_strict_equal(&json!(0.1 + 0.2), &json!(0.3)));
    }

    #[test]
    fn test_arrays_are_order_sensitive() {
        assert!(deep_strict_equal(&json!([1, 2, 3]), &json!([1, 2, 3])));
        assert!(!deep_strict_equal(&json!([1, 2, 3]), &json!([3, 2, 1])));
        assert!(!deep_strict_equal(&json!([1, 2]), &json!([1, 2, 3])));
    }

    #[test]
    fn test_objects_compare_keywise() {
        assert!(deep_strict_equal(
            &json!({ "a": 1, "b": [true] }),
            &json!({ "b": [true], "a": 1.0 })
        ));
        assert!(!deep_strict_equal(&json!({ "a": 1 }), &json!({ "a": 1, "b": 2 })));
        assert!(!deep_strict_equal(&json!({ "a": 1 }), &json!({ "b": 1 })));
    }

    #[test]
    fn test_assert_reports_both_values() {
        assert!(assert_deep_strict_equal(0, &json!(3), &json!(3)).is_ok());

        let err = assert_deep_strict_equal(2, &json!(-1), &json!(3)).unwrap_err();
        assert!(err.is_validation());
        let message = err.to_string();
        assert!(message.contains("case 2"));
        assert!(message.contains("actual -1"));
        assert!(message.contains("expected 3"));
    }
}
