//! Sensitive-data masking for error envelopes and log records.
//!
//! Structured payloads lose every field whose name looks sensitive; free text
//! has credentials, bearer tokens, PEM blocks and card-like numbers replaced
//! with [`REDACTED`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Replacement for masked text
pub const REDACTED: &str = "[REDACTED]";

/// Lowercase, separator-free fragments that mark a field name as sensitive
const SENSITIVE_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "secret",
    "apikey",
    "authorization",
    "cookie",
    "session",
    "creditcard",
    "cardnumber",
    "cvv",
    "ssn",
    "privatekey",
    "keymaterial",
];

struct TextRule {
    regex: Regex,
}

static TEXT_RULES: LazyLock<Vec<TextRule>> = LazyLock::new(|| {
    [
        // PEM blocks (certificates, private keys)
        r"-----BEGIN [A-Z0-9 ]+-----[\s\S]*?-----END [A-Z0-9 ]+-----",
        // Bearer / Basic credentials
        r"(?i)\b(?:bearer|basic)\s+[A-Za-z0-9\-._~+/]+=*",
        // key=value or "key": "value" pairs whose key looks sensitive
        r#"(?i)"?\b[a-z0-9_\-]*(?:password|passwd|token|secret|api[_\-]?key|authorization|cookie|session|card[_\-]?number|credit[_\-]?card|cvv|ssn|private[_\-]?key)[a-z0-9_\-]*"?\s*[:=]\s*(?:"[^"]*"|'[^']*'|[^\s,;&}]+)"#,
        // 13-19 digit card-like numbers, optionally grouped
        r"\b(?:\d[ \-]?){12,18}\d\b",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok().map(|regex| TextRule { regex }))
    .collect()
});

/// Whether a field name refers to sensitive material
///
/// Matching ignores case and separators, so `api_key`, `apiKey` and `API-KEY`
/// are all sensitive.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    SENSITIVE_FRAGMENTS.iter().any(|fragment| normalized.contains(fragment))
}

/// Mask sensitive substrings in free text
pub fn redact_text(text: &str) -> String {
    let mut out = text.to_string();
    for rule in TEXT_RULES.iter() {
        if rule.regex.is_match(&out) {
            out = rule.regex.replace_all(&out, REDACTED).into_owned();
        }
    }
    out
}

/// Strip sensitive fields from a JSON value in place, recursively
///
/// Object entries with sensitive names are removed outright so the name itself
/// never reaches the caller. Remaining strings are passed through
/// [`redact_text`].
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !is_sensitive_key(key));
            for nested in map.values_mut() {
                redact_value(nested);
            }
        },
        Value::Array(items) => {
            for item in items {
                redact_value(item);
            }
        },
        Value::String(s) => {
            let redacted = redact_text(s);
            if redacted != *s {
                *s = redacted;
            }
        },
        _ => {},
    }
}
