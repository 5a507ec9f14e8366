//! Reader for the serialized AST form consumed by the semantic analyzer.
use std::{error::Error, fmt::Display, io::BufRead};

use super::{
    BinaryOp, CaseBranch, Class, Expr, ExprKind, Feature, Formal, Identifier, LetBinding, Program,
    UnaryOp,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstReadError(pub String);

impl Display for AstReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Error for AstReadError {}

type ReadResult<T> = Result<T, AstReadError>;

pub struct AstReader<R> {
    input: R,
    annotated: bool,
}

impl<R: BufRead> AstReader<R> {
    pub fn new(input: R) -> Self {
        Self { input, annotated: false }
    }

    /// A reader for the annotated form, where every expression carries its
    /// static type and `internal` bodies may appear.
    pub fn new_annotated(input: R) -> Self {
        Self { input, annotated: true }
    }

    pub fn read_program(&mut self) -> ReadResult<Program> {
        let count = self.count()?;
        let mut classes = vec![];
        for _ in 0..count {
            classes.push(self.class()?);
        }
        Ok(Program { classes })
    }

    pub(crate) fn line(&mut self) -> ReadResult<String> {
        let mut buf = String::new();
        match self.input.read_line(&mut buf) {
            Ok(0) => Err(AstReadError("unexpected end of AST file".to_string())),
            Ok(_) => {
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    buf.pop();
                }
                Ok(buf)
            }
            Err(e) => Err(AstReadError(format!("failed to read AST file: {e}"))),
        }
    }

    pub(crate) fn count(&mut self) -> ReadResult<usize> {
        let line = self.line()?;
        line.trim()
            .parse::<usize>()
            .map_err(|_| AstReadError(format!("expected a count, found '{line}'")))
    }

    fn number(&mut self) -> ReadResult<usize> {
        let line = self.line()?;
        line.trim()
            .parse::<usize>()
            .map_err(|_| AstReadError(format!("expected a line number, found '{line}'")))
    }

    pub(crate) fn identifier(&mut self) -> ReadResult<Identifier> {
        let line = self.number()?;
        let name = self.line()?;
        Ok(Identifier { line, name })
    }

    pub(crate) fn class(&mut self) -> ReadResult<Class> {
        let name = self.identifier()?;
        let parent = match self.line()?.as_str() {
            "inherits" => Some(self.identifier()?),
            "no_inherits" => None,
            other => {
                return Err(AstReadError(format!(
                    "expected inherits or no_inherits, found '{other}'"
                )))
            }
        };

        let count = self.count()?;
        let mut features = vec![];
        for _ in 0..count {
            features.push(self.feature()?);
        }

        Ok(Class { name, parent, features })
    }

    fn feature(&mut self) -> ReadResult<Feature> {
        let tag = self.line()?;
        match tag.as_str() {
            "attribute_no_init" => {
                let name = self.identifier()?;
                let ty = self.identifier()?;
                Ok(Feature::Attribute { name, ty, init: None })
            }
            "attribute_init" => {
                let name = self.identifier()?;
                let ty = self.identifier()?;
                let init = self.expr()?;
                Ok(Feature::Attribute { name, ty, init: Some(init) })
            }
            "method" => {
                let name = self.identifier()?;
                let count = self.count()?;
                let mut formals = vec![];
                for _ in 0..count {
                    let name = self.identifier()?;
                    let ty = self.identifier()?;
                    formals.push(Formal { name, ty });
                }
                let return_ty = self.identifier()?;
                let body = self.expr()?;
                Ok(Feature::Method { name, formals, return_ty, body })
            }
            other => Err(AstReadError(format!("unrecognized feature '{other}'"))),
        }
    }

    fn binding(&mut self) -> ReadResult<LetBinding> {
        let tag = self.line()?;
        let name = self.identifier()?;
        let ty = self.identifier()?;
        let init = match tag.as_str() {
            "let_binding_init" => Some(self.expr()?),
            "let_binding_no_init" => None,
            other => return Err(AstReadError(format!("unrecognized let binding '{other}'"))),
        };
        Ok(LetBinding { name, ty, init })
    }

    fn branch(&mut self) -> ReadResult<CaseBranch> {
        let name = self.identifier()?;
        let ty = self.identifier()?;
        let body = self.expr()?;
        Ok(CaseBranch { name, ty, body })
    }

    fn exprs(&mut self) -> ReadResult<Vec<Expr>> {
        let count = self.count()?;
        let mut exprs = vec![];
        for _ in 0..count {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    pub(crate) fn expr(&mut self) -> ReadResult<Expr> {
        let line = self.number()?;
        let annotated_type = if self.annotated { Some(self.line()?) } else { None };
        let tag = self.line()?;

        let kind = match tag.as_str() {
            "assign" => {
                let target = self.identifier()?;
                let value = Box::new(self.expr()?);
                ExprKind::Assign { target, value }
            }
            "dynamic_dispatch" => {
                let receiver = Box::new(self.expr()?);
                let method = self.identifier()?;
                let args = self.exprs()?;
                ExprKind::DynamicDispatch { receiver, method, args }
            }
            "static_dispatch" => {
                let receiver = Box::new(self.expr()?);
                let ty = self.identifier()?;
                let method = self.identifier()?;
                let args = self.exprs()?;
                ExprKind::StaticDispatch { receiver, ty, method, args }
            }
            "self_dispatch" => {
                let method = self.identifier()?;
                let args = self.exprs()?;
                ExprKind::SelfDispatch { method, args }
            }
            "if" => {
                let predicate = Box::new(self.expr()?);
                let then_body = Box::new(self.expr()?);
                let else_body = Box::new(self.expr()?);
                ExprKind::If { predicate, then_body, else_body }
            }
            "while" => {
                let predicate = Box::new(self.expr()?);
                let body = Box::new(self.expr()?);
                ExprKind::While { predicate, body }
            }
            "block" => ExprKind::Block { body: self.exprs()? },
            "let" => {
                let count = self.count()?;
                let mut bindings = vec![];
                for _ in 0..count {
                    bindings.push(self.binding()?);
                }
                let body = Box::new(self.expr()?);
                ExprKind::Let { bindings, body }
            }
            "case" => {
                let scrutinee = Box::new(self.expr()?);
                let count = self.count()?;
                let mut branches = vec![];
                for _ in 0..count {
                    branches.push(self.branch()?);
                }
                ExprKind::Case { scrutinee, branches }
            }
            "new" => ExprKind::New { ty: self.identifier()? },
            "identifier" => ExprKind::Ident { name: self.identifier()? },
            "integer" => ExprKind::Int { value: self.line()? },
            "string" => ExprKind::Str { value: self.line()? },
            "true" => ExprKind::True,
            "false" => ExprKind::False,
            "internal" if self.annotated => ExprKind::Internal { name: self.line()? },
            other => {
                if let Some(op) = UnaryOp::from_tag(other) {
                    ExprKind::Unary { op, operand: Box::new(self.expr()?) }
                } else if let Some(op) = BinaryOp::from_tag(other) {
                    let lhs = Box::new(self.expr()?);
                    let rhs = Box::new(self.expr()?);
                    ExprKind::Binary { op, lhs, rhs }
                } else {
                    return Err(AstReadError(format!(
                        "unrecognized expression '{other}' at line {line}"
                    )));
                }
            }
        };

        Ok(Expr {
            line,
            annotated_type,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstWriter;

    #[test]
    fn test_read_minimal_class() {
        let mut reader = AstReader::new("1\n1\nMain\nno_inherits\n0\n".as_bytes());
        let program = reader.read_program().unwrap();

        assert_eq!(1, program.classes.len());
        assert_eq!("Main", program.classes[0].name.name);
        assert!(program.classes[0].parent.is_none());
    }

    #[test]
    fn test_reader_inverts_writer() {
        let text = "1\n\
                    1\nMain\ninherits\n1\nIO\n\
                    1\n\
                    method\n2\nmain\n0\n2\nObject\n\
                    3\nself_dispatch\n3\nout_string\n1\n3\nstring\nhello\n";

        let mut reader = AstReader::new(text.as_bytes());
        let program = reader.read_program().unwrap();

        assert_eq!(text, AstWriter::write_program(&program));
    }

    #[test]
    fn test_unrecognized_expression_is_rejected() {
        let text = "1\n1\nMain\nno_inherits\n1\nattribute_init\n2\nx\n2\nInt\n2\nbogus\n";
        let mut reader = AstReader::new(text.as_bytes());

        assert!(reader.read_program().is_err());
    }
}
