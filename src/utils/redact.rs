//! Redaction of secrets before they reach the logs

use regex::Regex;
use std::sync::LazyLock;

static BEARER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Bearer\s+)([A-Za-z0-9._-]+)").expect("Invalid Bearer token regex"));

/// Redact a token completely, showing only first and last few characters
pub fn redact_token(token: &str) -> String {
    if token.len() <= 8 || !token.is_ascii() {
        return "[REDACTED]".to_string();
    }

    let prefix = &token[..4];
    let suffix = &token[token.len() - 4..];
    format!("{}...{}", prefix, suffix)
}

/// Strip bearer credentials from a message (e.g. a reqwest error)
pub fn redact_error_message(message: &str) -> String {
    BEARER_PATTERN
        .replace_all(message, "${1}[REDACTED]")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_token() {
        assert_eq!(redact_token("short"), "[REDACTED]");
        assert_eq!(redact_token("abcdefghijklmnop"), "abcd...mnop");
    }

    #[test]
    fn test_redact_bearer() {
        let msg = "header Authorization: Bearer sk_live_123.abc rejected";
        assert_eq!(
            redact_error_message(msg),
            "header Authorization: Bearer [REDACTED] rejected"
        );
    }
}
