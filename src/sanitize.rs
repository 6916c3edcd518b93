//! Argument Sanitizer (C3).
//!
//! Strips path-traversal segments from string command arguments before they
//! reach the Permission Evaluator or the Agent. Non-string arguments pass
//! through untouched.

use serde_json::Value;

use crate::permissions::normalize_path;

fn strip_traversal(mut s: String) -> String {
    loop {
        let stripped_dotdot = s.replace("../", "");
        let stripped = stripped_dotdot.replace("./", "");
        if stripped == s {
            break;
        }
        s = stripped;
    }
    s
}

fn sanitize_one(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let stripped = strip_traversal(s);
            let cleaned = if stripped.is_empty() {
                stripped
            } else {
                normalize_path(&stripped)
            };
            Value::String(cleaned)
        }
        other => other,
    }
}

/// Sanitizes every element of `args` in place. Always returns a list of the
/// same length as the input — a length mismatch would indicate a bug in
/// this function, not a condition callers need to branch on, so it is
/// treated as a defensive invariant rather than a reported error.
pub fn sanitize_args(args: Vec<Value>) -> Vec<Value> {
    let original_len = args.len();
    let sanitized: Vec<Value> = args.into_iter().map(sanitize_one).collect();
    debug_assert_eq!(sanitized.len(), original_len);
    sanitized
}
