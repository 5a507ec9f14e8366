//! AST for Cool programs.
//!
//! The same node types flow through the whole pipeline: the parser produces
//! them without type information, the analyzer fills in `annotated_type` in
//! place, and the code generator consumes the fully annotated form.
mod reader;
mod writer;

pub use self::reader::*;
pub use self::writer::*;

use serde::{Deserialize, Serialize};

/// A name together with the source line it was written on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub line: usize,
    pub name: String,
}

impl Identifier {
    pub fn new(line: usize, name: impl ToString) -> Identifier {
        Identifier {
            line,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub classes: Vec<Class>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub name: Identifier,
    pub parent: Option<Identifier>,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    Attribute {
        name: Identifier,
        ty: Identifier,
        init: Option<Expr>,
    },
    Method {
        name: Identifier,
        formals: Vec<Formal>,
        return_ty: Identifier,
        body: Expr,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formal {
    pub name: Identifier,
    pub ty: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetBinding {
    pub name: Identifier,
    pub ty: Identifier,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub name: Identifier,
    pub ty: Identifier,
    pub body: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Divide,
    Lt,
    Le,
    Eq,
}

impl BinaryOp {
    pub fn tag(&self) -> &'static str {
        match self {
            BinaryOp::Plus => "plus",
            BinaryOp::Minus => "minus",
            BinaryOp::Times => "times",
            BinaryOp::Divide => "divide",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Eq => "eq",
        }
    }

    pub fn from_tag(tag: &str) -> Option<BinaryOp> {
        Some(match tag {
            "plus" => BinaryOp::Plus,
            "minus" => BinaryOp::Minus,
            "times" => BinaryOp::Times,
            "divide" => BinaryOp::Divide,
            "lt" => BinaryOp::Lt,
            "le" => BinaryOp::Le,
            "eq" => BinaryOp::Eq,
            _ => return None,
        })
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Divide
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    IsVoid,
}

impl UnaryOp {
    pub fn tag(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "negate",
            UnaryOp::Not => "not",
            UnaryOp::IsVoid => "isvoid",
        }
    }

    pub fn from_tag(tag: &str) -> Option<UnaryOp> {
        Some(match tag {
            "negate" => UnaryOp::Negate,
            "not" => UnaryOp::Not,
            "isvoid" => UnaryOp::IsVoid,
            _ => return None,
        })
    }
}

/// An expression node. `annotated_type` is `None` until the type checker has
/// visited the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    pub line: usize,
    pub annotated_type: Option<String>,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(line: usize, kind: ExprKind) -> Expr {
        Expr {
            line,
            annotated_type: None,
            kind,
        }
    }

    /// The annotated static type. Only valid after type checking.
    pub fn ty(&self) -> &str {
        self.annotated_type
            .as_deref()
            .unwrap_or("<unannotated>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprKind {
    Assign {
        target: Identifier,
        value: Box<Expr>,
    },
    DynamicDispatch {
        receiver: Box<Expr>,
        method: Identifier,
        args: Vec<Expr>,
    },
    StaticDispatch {
        receiver: Box<Expr>,
        ty: Identifier,
        method: Identifier,
        args: Vec<Expr>,
    },
    SelfDispatch {
        method: Identifier,
        args: Vec<Expr>,
    },
    If {
        predicate: Box<Expr>,
        then_body: Box<Expr>,
        else_body: Box<Expr>,
    },
    While {
        predicate: Box<Expr>,
        body: Box<Expr>,
    },
    Block {
        body: Vec<Expr>,
    },
    Let {
        bindings: Vec<LetBinding>,
        body: Box<Expr>,
    },
    Case {
        scrutinee: Box<Expr>,
        branches: Vec<CaseBranch>,
    },
    New {
        ty: Identifier,
    },
    Ident {
        name: Identifier,
    },
    Int {
        value: String,
    },
    Str {
        value: String,
    },
    True,
    False,
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Grouping parentheses. Only produced by the parser; the serializer
    /// writes the inner expression directly.
    Paren(Box<Expr>),
    /// Body marker for a built-in method, e.g. `Object.abort`.
    Internal {
        name: String,
    },
}
