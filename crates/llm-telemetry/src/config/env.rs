//! `${VAR}` and `${VAR:-default}` placeholders in configuration strings.

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("placeholder pattern is valid")
    })
}

/// Replaces placeholders in `text` using `lookup`.
///
/// A set, non-empty variable wins. Otherwise the `:-` default is used when
/// present, and an unset variable without default becomes the empty string.
pub fn substitute_with(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    placeholder()
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match (lookup(name), caps.get(2)) {
                (Some(value), _) if !value.is_empty() => value,
                (_, Some(default)) => default.as_str().to_string(),
                (Some(value), None) => value,
                (None, None) => {
                    warn!(variable = name, "environment variable not set, substituting empty string");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Substitutes placeholders in every string value of a document. Keys are left alone.
pub fn substitute_value(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = substitute_with(s, lookup);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_value(item, lookup);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(item, lookup);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
