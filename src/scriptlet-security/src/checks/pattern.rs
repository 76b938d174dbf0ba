//! Pattern-level backstop checks: these run over raw source text rather than the AST,
//! by design — they catch things a grammar-level parse doesn't naturally see, like an
//! encoded payload hidden in a long string literal, or source that is simply too big or
//! too deeply nested for the sandbox to be worth compiling.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Issue, Severity};

/// Source size above which the analyzer flags regardless of AST content.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;

/// Brace nesting depth above which the analyzer flags.
pub const MAX_NESTING_DEPTH: u32 = 10;

/// Minimum run length of base64-alphabet characters to be treated as a probable
/// encoded payload rather than an ordinary identifier or short token.
const MIN_BASE64_RUN: usize = 50;

/// Minimum count of consecutive `\xNN`/`\uNNNN` escapes to be treated as an encoded
/// payload rather than the occasional escaped character.
const MIN_ESCAPE_RUN: usize = 8;

static BASE64_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{50,}={0,2}").unwrap());

static HEX_OR_UNICODE_ESCAPE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\\x[0-9A-Fa-f]{2}|\\u[0-9A-Fa-f]{4}){8,}").unwrap());

pub fn run(source: &str) -> Vec<Issue> {
    let mut issues = Vec::new();

    if source.len() > MAX_SOURCE_BYTES {
        issues.push(Issue::new(
            Severity::Medium,
            "oversized_source",
            format!(
                "source is {} bytes, exceeding the {MAX_SOURCE_BYTES} byte limit",
                source.len()
            ),
        ));
    }

    if let Some(depth) = max_brace_nesting(source) {
        if depth > MAX_NESTING_DEPTH {
            issues.push(Issue::new(
                Severity::Medium,
                "excessive_nesting",
                format!("brace nesting depth {depth} exceeds the {MAX_NESTING_DEPTH} limit"),
            ));
        }
    }

    if let Some(m) = BASE64_RUN.find(source) {
        if m.as_str().len() >= MIN_BASE64_RUN {
            issues.push(
                Issue::new(
                    Severity::Medium,
                    "encoded_payload",
                    "long base64-like run detected, possibly an obfuscated payload"
                        .to_string(),
                )
                .at(m.start() as u32),
            );
        }
    }

    if let Some(m) = HEX_OR_UNICODE_ESCAPE_RUN.find(source) {
        issues.push(
            Issue::new(
                Severity::Medium,
                "encoded_payload",
                format!(
                    "{} or more consecutive hex/unicode escapes detected, possibly an \
                     obfuscated payload",
                    MIN_ESCAPE_RUN
                ),
            )
            .at(m.start() as u32),
        );
    }

    issues
}

/// Tracks the maximum nesting depth of `{`/`}` pairs across the whole source. This is a
/// character-level scan, not AST-aware, deliberately — it is meant to catch
/// pathologically nested source even when the AST checks above would otherwise pass.
fn max_brace_nesting(source: &str) -> Option<u32> {
    let mut depth: u32 = 0;
    let mut max_depth: u32 = 0;
    for ch in source.chars() {
        match ch {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Some(max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_source_flagged() {
        let source = "x".repeat(MAX_SOURCE_BYTES + 1);
        let issues = run(&source);
        assert!(issues.iter().any(|i| i.kind == "oversized_source"));
    }

    #[test]
    fn test_small_source_not_flagged() {
        let issues = run("const x = 1;");
        assert!(!issues.iter().any(|i| i.kind == "oversized_source"));
    }

    #[test]
    fn test_deep_nesting_flagged() {
        let source = "{".repeat(11) + &"}".repeat(11);
        let issues = run(&source);
        assert!(issues.iter().any(|i| i.kind == "excessive_nesting"));
    }

    #[test]
    fn test_encoded_base64_flagged() {
        let payload = "A".repeat(60);
        let source = format!("const blob = \"{payload}\";");
        let issues = run(&source);
        assert!(issues.iter().any(|i| i.kind == "encoded_payload"));
    }
}
