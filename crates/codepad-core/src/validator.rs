//! Denylist screening for submitted snippets
//!
//! The validator is a cheap deterrent, not a security boundary. It works on
//! regular expressions over the raw source text, so it over-rejects harmless
//! code (an identifier such as `popupwindow.x` trips the global-object rule)
//! and under-rejects obfuscated equivalents of the constructs it looks for.
//! Never treat a passing result as proof that a snippet is safe to run.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DYNAMIC_CODE_MESSAGE: &str = "Dynamic imports and eval-like functions are not allowed";
pub const GLOBAL_ACCESS_MESSAGE: &str = "Access to DOM and global objects is restricted";
pub const NETWORK_MESSAGE: &str = "Network requests are not allowed";
pub const TEMPLATE_LITERAL_MESSAGE: &str = "Template literals are not allowed";

pub const DEFAULT_MAX_CODE_LENGTH: usize = 100_000;

/// Outcome of screening one snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
        }
    }
}

struct DenyRule {
    pattern: Regex,
    message: &'static str,
}

// Order matters: the first matching rule names the rejection.
fn deny_rules() -> &'static [DenyRule] {
    static RULES: OnceLock<Vec<DenyRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (
                r"\b(?:import|require|eval)\s*\(|\bFunction\s*\(",
                DYNAMIC_CODE_MESSAGE,
            ),
            (
                r"(?:document|window|process|globalThis|global)\s*[.\[]",
                GLOBAL_ACCESS_MESSAGE,
            ),
            (r"\bfetch\s*\(", NETWORK_MESSAGE),
            (r"`", TEMPLATE_LITERAL_MESSAGE),
        ]
        .into_iter()
        .filter_map(|(pattern, message)| match Regex::new(pattern) {
            Ok(pattern) => Some(DenyRule { pattern, message }),
            Err(e) => {
                log::error!("Invalid denylist pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

/// Pattern-based snippet screener.
#[derive(Debug, Clone)]
pub struct CodeValidator {
    max_code_length: usize,
}

impl CodeValidator {
    /// `max_code_length` of `0` disables the length guard.
    pub fn new(max_code_length: usize) -> Self {
        Self { max_code_length }
    }

    pub fn max_code_length(&self) -> usize {
        self.max_code_length
    }

    pub fn validate(&self, source: &str) -> ValidationResult {
        if self.max_code_length > 0 && source.len() > self.max_code_length {
            return ValidationResult::rejected(format!(
                "Code exceeds the maximum length of {} bytes",
                self.max_code_length
            ));
        }

        deny_rules()
            .iter()
            .find(|rule| rule.pattern.is_match(source))
            .map(|rule| ValidationResult::rejected(rule.message))
            .unwrap_or_else(ValidationResult::valid)
    }
}

impl Default for CodeValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CODE_LENGTH)
    }
}

/// Screen `source` with the default validator.
pub fn validate_code_safety(source: &str) -> ValidationResult {
    CodeValidator::default().validate(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(source: &str) -> Option<String> {
        validate_code_safety(source).error
    }

    #[test]
    fn test_plain_code_passes() {
        let result = validate_code_safety("const xs = [1, 2, 3];\nconsole.log(xs.map(x => x * 2));");
        assert_eq!(result, ValidationResult::valid());
    }

    #[test]
    fn test_dynamic_code_rules() {
        for source in [
            "import('fs')",
            "const fs = require('fs');",
            "eval('1 + 1')",
            "new Function('return 1')()",
            "Function ('return this')()",
        ] {
            assert_eq!(rejection(source).as_deref(), Some(DYNAMIC_CODE_MESSAGE), "{source}");
        }
    }

    #[test]
    fn test_dynamic_code_rule_respects_identifier_boundaries() {
        assert!(validate_code_safety("function evaluate(x) { return x; }\nevaluate(1);").is_valid);
        assert!(validate_code_safety("const myrequire = 1;").is_valid);
    }

    #[test]
    fn test_global_access_rule() {
        for source in [
            "document.title = \"x\"",
            "window.location",
            "process.exit(1)",
            "globalThis.foo = 1",
            "global['foo']",
            "window [\"x\"]",
        ] {
            assert_eq!(rejection(source).as_deref(), Some(GLOBAL_ACCESS_MESSAGE), "{source}");
        }
    }

    #[test]
    fn test_global_access_rule_over_rejects_substrings() {
        assert_eq!(
            rejection("const popupwindow = {}; popupwindow.x = 1;").as_deref(),
            Some(GLOBAL_ACCESS_MESSAGE)
        );
        // Bare mention without a property access is allowed.
        assert!(validate_code_safety("const window = 3; console.log(window);").is_valid);
    }

    #[test]
    fn test_network_rule() {
        assert_eq!(rejection("fetch('https://example.com')").as_deref(), Some(NETWORK_MESSAGE));
        assert!(validate_code_safety("const prefetch = 1;").is_valid);
    }

    #[test]
    fn test_template_literal_rule() {
        assert_eq!(rejection("`hello`").as_deref(), Some(TEMPLATE_LITERAL_MESSAGE));
        assert_eq!(rejection("const s = 'a' + '`';").as_deref(), Some(TEMPLATE_LITERAL_MESSAGE));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        assert_eq!(
            rejection("eval(document.cookie)").as_deref(),
            Some(DYNAMIC_CODE_MESSAGE)
        );
        assert_eq!(
            rejection("window.fetch(`x`)").as_deref(),
            Some(GLOBAL_ACCESS_MESSAGE)
        );
        assert_eq!(rejection("fetch(`x`)").as_deref(), Some(NETWORK_MESSAGE));
    }

    #[test]
    fn test_length_guard() {
        let validator = CodeValidator::new(8);
        let result = validator.validate("console.log(1)");
        assert!(!result.is_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("Code exceeds the maximum length of 8 bytes")
        );

        let unlimited = CodeValidator::new(0);
        assert!(unlimited.validate(&"1;".repeat(200_000)).is_valid);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(validate_code_safety("`x`")).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["error"], TEMPLATE_LITERAL_MESSAGE);

        let json = serde_json::to_value(ValidationResult::valid()).unwrap();
        assert_eq!(json, serde_json::json!({ "isValid": true }));
    }
}
