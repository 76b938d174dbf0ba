//! AST-level detection of forbidden identifiers, member accesses, `delete` on globals,
//! `with` statements, and dynamic `import`.
//!
//! These checks walk the real parsed AST rather than matching against source text, so
//! a string literal or comment containing the word `eval` never trips a finding — only
//! an actual identifier reference, property access, or statement shape does.

use oxc_ast::ast::{
    Expression, IdentifierReference, ImportDeclaration, ImportExpression, UnaryExpression,
    UnaryOperator, WithStatement,
};
use oxc_ast_visit::{walk, Visit};

use crate::types::{Issue, Severity};

/// Identifiers that give a script access to the host, the network, or dynamic code
/// execution, and so are never allowed to be referenced by name.
const FORBIDDEN_IDENTIFIERS: &[&str] = &[
    "eval",
    "Function",
    "setTimeout",
    "setInterval",
    "XMLHttpRequest",
    "fetch",
    "require",
    "process",
    "Deno",
    "window",
    "document",
    "global",
    "globalThis",
    "fs",
    "net",
    "os",
    "child_process",
];

/// Property names that, however reached, indicate prototype-pollution-style escapes.
const FORBIDDEN_PROPERTIES: &[&str] = &["__proto__", "prototype", "constructor"];

pub fn run(program: &oxc_ast::ast::Program) -> Vec<Issue> {
    let mut visitor = ForbiddenVisitor {
        issues: Vec::new(),
    };
    visitor.visit_program(program);
    visitor.issues
}

struct ForbiddenVisitor {
    issues: Vec<Issue>,
}

impl ForbiddenVisitor {
    fn flag(&mut self, kind: &str, message: String, offset: u32) {
        self.issues
            .push(Issue::new(Severity::High, kind, message).at(offset));
    }
}

impl<'a> Visit<'a> for ForbiddenVisitor {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if FORBIDDEN_IDENTIFIERS.contains(&it.name.as_str()) {
            self.flag(
                "forbidden_identifier",
                format!("reference to forbidden identifier `{}`", it.name),
                it.span.start,
            );
        }
        walk::walk_identifier_reference(self, it);
    }

    fn visit_expression(&mut self, it: &Expression<'a>) {
        if let Expression::StaticMemberExpression(member) = it {
            let name = member.property.name.as_str();
            if FORBIDDEN_PROPERTIES.contains(&name) {
                self.flag(
                    "forbidden_property",
                    format!("access to forbidden property `.{name}`"),
                    member.span.start,
                );
            } else if name == "callee" {
                if let Expression::Identifier(object) = &member.object {
                    if object.name.as_str() == "arguments" {
                        self.flag(
                            "arguments_callee",
                            "access to `arguments.callee` is forbidden".to_string(),
                            member.span.start,
                        );
                    }
                }
            }
        }
        walk::walk_expression(self, it);
    }

    fn visit_unary_expression(&mut self, it: &UnaryExpression<'a>) {
        if it.operator == UnaryOperator::Delete {
            if let Expression::Identifier(_) | Expression::StaticMemberExpression(_) =
                &it.argument
            {
                self.flag(
                    "delete_builtin",
                    "`delete` applied to a global identifier or property".to_string(),
                    it.span.start,
                );
            }
        }
        walk::walk_unary_expression(self, it);
    }

    fn visit_with_statement(&mut self, it: &WithStatement<'a>) {
        self.flag(
            "with_statement",
            "`with` statements are forbidden".to_string(),
            it.span.start,
        );
        walk::walk_with_statement(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        self.flag(
            "dynamic_import",
            "dynamic `import()` is forbidden".to_string(),
            it.span.start,
        );
        walk::walk_import_expression(self, it);
    }

    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        self.flag(
            "module_import",
            "`import` declarations are forbidden; scripts are single-file".to_string(),
            it.span.start,
        );
        walk::walk_import_declaration(self, it);
    }
}
