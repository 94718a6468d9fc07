//! Bind expressions and the input placeholder.
//!
//! The only supported expression is `get-current-value`, which yields the
//! job's bound value. The value is injected into prompt text wherever the
//! `${input}` marker appears.

use std::fmt::Display;

pub const CURRENT_VALUE_EXPRESSION: &str = "get-current-value";
pub const INPUT_PLACEHOLDER: &str = "${input}";

pub fn is_supported(expr: Option<&str>) -> bool {
    matches!(expr.map(str::trim), Some(CURRENT_VALUE_EXPRESSION))
}

/// Evaluate `expr` against `value`. Returns `None` when there is nothing to
/// substitute (blank, absent or unrecognised expression); a missing value
/// evaluates to the empty string.
pub fn evaluate<T: Display>(expr: Option<&str>, value: Option<T>) -> Option<String> {
    if !is_supported(expr) {
        return None;
    }
    Some(value.map(|v| v.to_string()).unwrap_or_default())
}

/// Literal replacement of every `${input}` marker.
pub fn replace_input_placeholder(content: &str, value: Option<&str>) -> String {
    if !content.contains(INPUT_PLACEHOLDER) {
        return content.to_string();
    }
    content.replace(INPUT_PLACEHOLDER, value.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_recognises_only_current_value() {
        assert_eq!(
            evaluate(Some("  get-current-value "), Some("x")),
            Some("x".to_string())
        );
        assert_eq!(evaluate(Some("Get-Current-Value"), Some("x")), None);
        assert_eq!(evaluate(Some(""), Some("x")), None);
        assert_eq!(evaluate::<&str>(None, Some("x")), None);
        assert_eq!(evaluate::<i64>(Some("get-current-value"), None), Some(String::new()));
    }

    #[test]
    fn test_bound_integer_replaces_every_placeholder() {
        let value = evaluate(Some(CURRENT_VALUE_EXPRESSION), Some(7));
        let out = replace_input_placeholder("fix ${input}, then verify ${input}", value.as_deref());
        assert_eq!(out, "fix 7, then verify 7");
        assert!(!out.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn test_replace_is_literal_and_case_sensitive() {
        assert_eq!(replace_input_placeholder("${INPUT} $input", Some("v")), "${INPUT} $input");
        assert_eq!(replace_input_placeholder("a ${input} b", None), "a  b");
    }
}
