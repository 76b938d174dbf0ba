//! Pure-function source analysis for tenant scripts.
//!
//! [`analyze`] never executes the script it is given — it parses the source to an AST
//! (so identifier/property checks can't be fooled by a string literal or a comment),
//! walks it for forbidden-capability references and unbounded loop shapes, and runs a
//! handful of pattern-level backstop checks over the raw text for things an AST walk
//! doesn't naturally see (encoded payloads, oversized or pathologically nested source).
//!
//! A parse failure is itself reported as a high-severity `syntax_error` issue rather
//! than as an `Err` — the analyzer must never panic or abort given attacker-controlled
//! source, so "the source doesn't even parse" is just another finding.

mod checks;
mod types;

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;

pub use types::{Analysis, Issue, RiskLevel, Severity};

const SCORE_DEDUCTION_HIGH: u8 = 30;
const SCORE_DEDUCTION_MEDIUM: u8 = 10;
const SCORE_DEDUCTION_LOW: u8 = 5;

/// Analyze a script's source and return its aggregate score and findings.
///
/// Never panics, never executes the source, and always terminates — a script
/// containing an unbounded loop in its own top-level code is itself just a finding,
/// since the analyzer is a static walk over the parsed AST, not an interpreter.
#[tracing::instrument(skip_all, level = "debug")]
pub fn analyze(source: &str) -> Analysis {
    let mut issues = checks::pattern::run(source);

    let allocator = Allocator::default();
    let source_type = SourceType::mjs();
    let parsed = Parser::new(&allocator, source, source_type).parse();

    if parsed.panicked || !parsed.errors.is_empty() {
        let message = parsed
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "failed to parse script source".to_string());
        issues.push(Issue::new(Severity::High, "syntax_error", message));
    } else {
        issues.extend(checks::forbidden::run(&parsed.program));
        issues.extend(checks::loop_shape::run(&parsed.program));
    }

    let score = score_from_issues(&issues);
    Analysis { score, issues }
}

fn score_from_issues(issues: &[Issue]) -> u8 {
    let mut score: i32 = 100;
    for issue in issues {
        score -= match issue.severity {
            Severity::High => SCORE_DEDUCTION_HIGH as i32,
            Severity::Medium => SCORE_DEDUCTION_MEDIUM as i32,
            Severity::Low => SCORE_DEDUCTION_LOW as i32,
        };
    }
    score.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_script_scores_100() {
        let analysis = analyze("function handler(event) { return { ok: true }; }");
        assert_eq!(analysis.score, 100);
        assert!(analysis.issues.is_empty());
        assert_eq!(analysis.risk_level(), RiskLevel::Low);
    }

    #[test]
    fn test_eval_is_blocking() {
        let analysis = analyze("function handler(event) { return eval(event.code); }");
        assert!(analysis.has_blocking_issue());
        assert!(analysis
            .issues
            .iter()
            .any(|i| i.kind == "forbidden_identifier"));
    }

    #[test]
    fn test_eval_in_string_literal_is_not_flagged() {
        let analysis = analyze("function handler(event) { return 'please do not eval this'; }");
        assert!(!analysis
            .issues
            .iter()
            .any(|i| i.kind == "forbidden_identifier"));
    }

    #[test]
    fn test_eval_in_comment_is_not_flagged() {
        let analysis = analyze(
            "// do not eval user input\nfunction handler(event) { return event.value; }",
        );
        assert!(!analysis
            .issues
            .iter()
            .any(|i| i.kind == "forbidden_identifier"));
    }

    #[test]
    fn test_infinite_while_loop_flagged() {
        let analysis = analyze("function handler(event) { while (true) {} return 1; }");
        assert!(analysis.has_blocking_issue());
        assert!(analysis.issues.iter().any(|i| i.kind == "infinite_loop"));
    }

    #[test]
    fn test_while_loop_with_break_not_flagged() {
        let analysis =
            analyze("function handler(event) { while (true) { if (event.done) break; } return 1; }");
        assert!(!analysis.issues.iter().any(|i| i.kind == "infinite_loop"));
    }

    #[test]
    fn test_for_ever_flagged() {
        let analysis = analyze("function handler(event) { for (;;) {} }");
        assert!(analysis.issues.iter().any(|i| i.kind == "infinite_loop"));
    }

    #[test]
    fn test_delete_global_flagged() {
        let analysis = analyze("function handler(event) { delete globalThis.console; return 1; }");
        assert!(analysis.issues.iter().any(|i| i.kind == "delete_builtin"));
    }

    #[test]
    fn test_proto_access_flagged() {
        let analysis =
            analyze("function handler(event) { return event.__proto__.constructor; }");
        assert!(analysis
            .issues
            .iter()
            .any(|i| i.kind == "forbidden_property"));
    }

    #[test]
    fn test_arguments_callee_flagged() {
        let analysis =
            analyze("function handler(event) { return arguments.callee; }");
        assert!(analysis.issues.iter().any(|i| i.kind == "arguments_callee"));
    }

    #[test]
    fn test_unrelated_callee_property_not_flagged() {
        let analysis = analyze("function handler(event) { return event.callee; }");
        assert!(!analysis.issues.iter().any(|i| i.kind == "arguments_callee"));
    }

    #[test]
    fn test_syntax_error_is_high_severity() {
        let analysis = analyze("function handler(event) { return (((; }");
        assert!(analysis.has_blocking_issue());
        assert!(analysis.issues.iter().any(|i| i.kind == "syntax_error"));
    }

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(79), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Critical);
    }
}
