//! Serializer for the flat textual AST form produced by the parser.
//!
//! Counts precede repeated elements, identifiers take two lines (line number
//! and text), and expressions write their line and tag followed by the
//! tag-specific children. Grouping parentheses are unwrapped here.
use super::{CaseBranch, Class, Expr, ExprKind, Feature, Formal, Identifier, LetBinding, Program};

#[derive(Debug, Default)]
pub struct AstWriter {
    out: String,
}

impl AstWriter {
    pub fn write_program(program: &Program) -> String {
        let mut writer = AstWriter::default();
        writer.line(program.classes.len());
        for class in &program.classes {
            writer.class(class);
        }
        writer.out
    }

    fn line(&mut self, value: impl ToString) {
        self.out.push_str(&value.to_string());
        self.out.push('\n');
    }

    fn identifier(&mut self, id: &Identifier) {
        self.line(id.line);
        self.line(&id.name);
    }

    fn class(&mut self, class: &Class) {
        self.identifier(&class.name);
        match &class.parent {
            Some(parent) => {
                self.line("inherits");
                self.identifier(parent);
            }
            None => self.line("no_inherits"),
        }
        self.line(class.features.len());
        for feature in &class.features {
            self.feature(feature);
        }
    }

    fn feature(&mut self, feature: &Feature) {
        match feature {
            Feature::Attribute { name, ty, init: None } => {
                self.line("attribute_no_init");
                self.identifier(name);
                self.identifier(ty);
            }
            Feature::Attribute { name, ty, init: Some(init) } => {
                self.line("attribute_init");
                self.identifier(name);
                self.identifier(ty);
                self.expr(init);
            }
            Feature::Method { name, formals, return_ty, body } => {
                self.line("method");
                self.identifier(name);
                self.line(formals.len());
                for formal in formals {
                    self.formal(formal);
                }
                self.identifier(return_ty);
                self.expr(body);
            }
        }
    }

    fn formal(&mut self, formal: &Formal) {
        self.identifier(&formal.name);
        self.identifier(&formal.ty);
    }

    fn binding(&mut self, binding: &LetBinding) {
        match &binding.init {
            Some(init) => {
                self.line("let_binding_init");
                self.identifier(&binding.name);
                self.identifier(&binding.ty);
                self.expr(init);
            }
            None => {
                self.line("let_binding_no_init");
                self.identifier(&binding.name);
                self.identifier(&binding.ty);
            }
        }
    }

    fn branch(&mut self, branch: &CaseBranch) {
        self.identifier(&branch.name);
        self.identifier(&branch.ty);
        self.expr(&branch.body);
    }

    fn expr(&mut self, expr: &Expr) {
        if let ExprKind::Paren(inner) = &expr.kind {
            return self.expr(inner);
        }

        self.line(expr.line);
        self.line(tag_of(&expr.kind));

        match &expr.kind {
            ExprKind::Assign { target, value } => {
                self.identifier(target);
                self.expr(value);
            }
            ExprKind::DynamicDispatch { receiver, method, args } => {
                self.expr(receiver);
                self.identifier(method);
                self.exprs(args);
            }
            ExprKind::StaticDispatch { receiver, ty, method, args } => {
                self.expr(receiver);
                self.identifier(ty);
                self.identifier(method);
                self.exprs(args);
            }
            ExprKind::SelfDispatch { method, args } => {
                self.identifier(method);
                self.exprs(args);
            }
            ExprKind::If { predicate, then_body, else_body } => {
                self.expr(predicate);
                self.expr(then_body);
                self.expr(else_body);
            }
            ExprKind::While { predicate, body } => {
                self.expr(predicate);
                self.expr(body);
            }
            ExprKind::Block { body } => self.exprs(body),
            ExprKind::Let { bindings, body } => {
                self.line(bindings.len());
                for binding in bindings {
                    self.binding(binding);
                }
                self.expr(body);
            }
            ExprKind::Case { scrutinee, branches } => {
                self.expr(scrutinee);
                self.line(branches.len());
                for branch in branches {
                    self.branch(branch);
                }
            }
            ExprKind::New { ty } => self.identifier(ty),
            ExprKind::Ident { name } => self.identifier(name),
            ExprKind::Int { value } | ExprKind::Str { value } => self.line(value),
            ExprKind::True | ExprKind::False => {}
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Internal { name } => self.line(name),
            ExprKind::Paren(_) => unreachable!("parentheses are unwrapped above"),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        self.line(exprs.len());
        for expr in exprs {
            self.expr(expr);
        }
    }
}

/// The serialized tag of an expression kind.
pub fn tag_of(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::Assign { .. } => "assign",
        ExprKind::DynamicDispatch { .. } => "dynamic_dispatch",
        ExprKind::StaticDispatch { .. } => "static_dispatch",
        ExprKind::SelfDispatch { .. } => "self_dispatch",
        ExprKind::If { .. } => "if",
        ExprKind::While { .. } => "while",
        ExprKind::Block { .. } => "block",
        ExprKind::Let { .. } => "let",
        ExprKind::Case { .. } => "case",
        ExprKind::New { .. } => "new",
        ExprKind::Ident { .. } => "identifier",
        ExprKind::Int { .. } => "integer",
        ExprKind::Str { .. } => "string",
        ExprKind::True => "true",
        ExprKind::False => "false",
        ExprKind::Binary { op, .. } => op.tag(),
        ExprKind::Unary { op, .. } => op.tag(),
        ExprKind::Paren(_) => "paren_exp",
        ExprKind::Internal { .. } => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    #[test]
    fn test_write_minimal_class() {
        let program = Program {
            classes: vec![Class {
                name: Identifier::new(1, "Main"),
                parent: None,
                features: vec![],
            }],
        };

        assert_eq!("1\n1\nMain\nno_inherits\n0\n", AstWriter::write_program(&program));
    }

    #[test]
    fn test_parens_are_unwrapped() {
        let inner = Expr::new(2, ExprKind::Int { value: "1".into() });
        let expr = Expr::new(
            2,
            ExprKind::Binary {
                op: BinaryOp::Plus,
                lhs: Box::new(Expr::new(2, ExprKind::Paren(Box::new(inner.clone())))),
                rhs: Box::new(inner),
            },
        );
        let program = Program {
            classes: vec![Class {
                name: Identifier::new(1, "Main"),
                parent: None,
                features: vec![Feature::Attribute {
                    name: Identifier::new(2, "x"),
                    ty: Identifier::new(2, "Int"),
                    init: Some(expr),
                }],
            }],
        };

        let text = AstWriter::write_program(&program);
        assert!(!text.contains("paren_exp"));
        assert!(text.contains("plus\n2\ninteger\n1\n2\ninteger\n1\n"));
    }
}
