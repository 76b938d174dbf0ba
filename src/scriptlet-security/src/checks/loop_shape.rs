//! Structural detection of unbounded loop shapes: `while (true)`, `for (;;)`, and
//! `do ... while (true)` with no reachable `break`, `return`, or `throw` inside the loop
//! body. This is a shape check, not a halting-problem solver — a loop whose only escape
//! is buried behind runtime state is still flagged, which is the conservative (and
//! correct) choice for a security gate.

use oxc_ast::ast::{DoWhileStatement, Expression, ForStatement, Function, WhileStatement};
use oxc_ast_visit::{walk, Visit};

use crate::types::{Issue, Severity};

pub fn run(program: &oxc_ast::ast::Program) -> Vec<Issue> {
    let mut visitor = LoopVisitor {
        issues: Vec::new(),
    };
    visitor.visit_program(program);
    visitor.issues
}

fn is_literal_true(expr: &Expression) -> bool {
    matches!(expr, Expression::BooleanLiteral(lit) if lit.value)
}

/// Scans a statement subtree for a `break`, `return`, or `throw` that could let control
/// flow leave the loop, stopping at nested function boundaries (their own `return`s
/// don't help the outer loop terminate).
struct EscapeFinder {
    found: bool,
}

impl<'a> Visit<'a> for EscapeFinder {
    fn visit_break_statement(&mut self, it: &oxc_ast::ast::BreakStatement<'a>) {
        self.found = true;
        walk::walk_break_statement(self, it);
    }

    fn visit_return_statement(&mut self, it: &oxc_ast::ast::ReturnStatement<'a>) {
        self.found = true;
        walk::walk_return_statement(self, it);
    }

    fn visit_throw_statement(&mut self, it: &oxc_ast::ast::ThrowStatement<'a>) {
        self.found = true;
        walk::walk_throw_statement(self, it);
    }

    fn visit_function(&mut self, _it: &Function<'a>, _flags: oxc_ast::ast::ScopeFlags) {
        // Don't descend into nested function bodies — their control flow is independent
        // of the enclosing loop.
    }
}

fn has_escape_stmt(stmt: &oxc_ast::ast::Statement) -> bool {
    let mut finder = EscapeFinder { found: false };
    finder.visit_statement(stmt);
    finder.found
}

struct LoopVisitor {
    issues: Vec<Issue>,
}

impl LoopVisitor {
    fn flag_infinite_loop(&mut self, offset: u32, shape: &str) {
        self.issues.push(
            Issue::new(
                Severity::High,
                "infinite_loop",
                format!("`{shape}` loop with no reachable break/return/throw"),
            )
            .at(offset),
        );
    }
}

impl<'a> Visit<'a> for LoopVisitor {
    fn visit_while_statement(&mut self, it: &WhileStatement<'a>) {
        if is_literal_true(&it.test) && !has_escape_stmt(&it.body) {
            self.flag_infinite_loop(it.span.start, "while (true)");
        }
        walk::walk_while_statement(self, it);
    }

    fn visit_do_while_statement(&mut self, it: &DoWhileStatement<'a>) {
        if is_literal_true(&it.test) && !has_escape_stmt(&it.body) {
            self.flag_infinite_loop(it.span.start, "do...while (true)");
        }
        walk::walk_do_while_statement(self, it);
    }

    fn visit_for_statement(&mut self, it: &ForStatement<'a>) {
        let unbounded = match &it.test {
            None => true,
            Some(expr) => is_literal_true(expr),
        };
        if unbounded && !has_escape_stmt(&it.body) {
            self.flag_infinite_loop(it.span.start, "for (;;)");
        }
        walk::walk_for_statement(self, it);
    }
}
