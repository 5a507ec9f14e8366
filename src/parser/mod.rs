//! Parser for Cool.
//!
//! Consumes the pre-lexed token stream and produces the program AST. The
//! expression grammar is parsed by precedence level, tightest first:
//! `.`, `@`, the unary operators `isvoid` and `~`, `*` `/`, `+` `-`, the
//! non-associative comparisons `<=` `<` `=`, prefix `not`, and finally `<-`.
use std::{error::Error, fmt::Display};

use crate::ast::{
    BinaryOp, CaseBranch, Class, Expr, ExprKind, Feature, Formal, Identifier, LetBinding, Program,
    UnaryOp,
};
use crate::tokens::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A parse error near a concrete token.
    Near { line: usize, lexeme: String },
    /// The token stream ended in the middle of a production.
    Eof,
}

impl ParseError {
    fn near(token: &Token) -> ParseError {
        ParseError::Near {
            line: token.line,
            lexeme: token.kind.lexeme().to_string(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Near { line, lexeme } => {
                write!(f, "ERROR: {line}: Parser: parse error near {lexeme}")
            }
            ParseError::Eof => f.write_str("ERROR: Syntax error at EOF"),
        }
    }
}

impl Error for ParseError {}

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, position: 0 }
    }

    /// Parse a whole program: one or more `class ... ;` declarations.
    pub fn parse(mut self) -> ParseResult<Program> {
        let mut classes = vec![self.class()?];
        while self.peek().is_some() {
            classes.push(self.class()?);
        }
        Ok(Program { classes })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn advance(&mut self) -> ParseResult<&Token> {
        let token = self.tokens.get(self.position).ok_or(ParseError::Eof)?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<&Token> {
        let token = self.tokens.get(self.position).ok_or(ParseError::Eof)?;
        if token.kind == kind {
            self.position += 1;
            Ok(token)
        } else {
            Err(ParseError::near(token))
        }
    }

    fn error_here<T>(&self) -> ParseResult<T> {
        match self.peek() {
            Some(token) => Err(ParseError::near(token)),
            None => Err(ParseError::Eof),
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.peek().map(|t| t.kind == kind).unwrap_or(false) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn type_name(&mut self) -> ParseResult<Identifier> {
        let token = self.tokens.get(self.position).ok_or(ParseError::Eof)?;
        match &token.kind {
            TokenKind::Type(name) => {
                let id = Identifier::new(token.line, name);
                self.position += 1;
                Ok(id)
            }
            _ => Err(ParseError::near(token)),
        }
    }

    fn identifier(&mut self) -> ParseResult<Identifier> {
        let token = self.tokens.get(self.position).ok_or(ParseError::Eof)?;
        match &token.kind {
            TokenKind::Identifier(name) => {
                let id = Identifier::new(token.line, name);
                self.position += 1;
                Ok(id)
            }
            _ => Err(ParseError::near(token)),
        }
    }

    fn class(&mut self) -> ParseResult<Class> {
        self.expect(TokenKind::Class)?;
        let name = self.type_name()?;
        let parent = if self.matches(TokenKind::Inherits) {
            Some(self.type_name()?)
        } else {
            None
        };

        self.expect(TokenKind::LBrace)?;
        let mut features = vec![];
        while !self.matches(TokenKind::RBrace) {
            features.push(self.feature()?);
            self.expect(TokenKind::Semi)?;
        }
        self.expect(TokenKind::Semi)?;

        Ok(Class { name, parent, features })
    }

    fn feature(&mut self) -> ParseResult<Feature> {
        let name = self.identifier()?;
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Colon) => {
                self.advance()?;
                let ty = self.type_name()?;
                let init = if self.matches(TokenKind::LArrow) {
                    Some(self.expr()?)
                } else {
                    None
                };
                Ok(Feature::Attribute { name, ty, init })
            }
            Some(TokenKind::LParen) => {
                self.advance()?;
                let mut formals = vec![];
                if !self.matches(TokenKind::RParen) {
                    loop {
                        formals.push(self.formal()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                }
                self.expect(TokenKind::Colon)?;
                let return_ty = self.type_name()?;
                self.expect(TokenKind::LBrace)?;
                let body = self.expr()?;
                self.expect(TokenKind::RBrace)?;
                Ok(Feature::Method { name, formals, return_ty, body })
            }
            _ => self.error_here(),
        }
    }

    fn formal(&mut self) -> ParseResult<Formal> {
        let name = self.identifier()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.type_name()?;
        Ok(Formal { name, ty })
    }

    /// Entry point of the expression ladder: assignment, then `not`.
    fn expr(&mut self) -> ParseResult<Expr> {
        if let (Some(Token { kind: TokenKind::Identifier(_), .. }), Some(next)) =
            (self.peek(), self.peek_at(1))
        {
            if next.kind == TokenKind::LArrow {
                let target = self.identifier()?;
                self.expect(TokenKind::LArrow)?;
                let value = Box::new(self.expr()?);
                let line = target.line;
                return Ok(Expr::new(line, ExprKind::Assign { target, value }));
            }
        }

        self.not_expr()
    }

    fn not_expr(&mut self) -> ParseResult<Expr> {
        if self.peek().map(|t| t.kind == TokenKind::Not).unwrap_or(false) {
            let line = self.advance()?.line;
            let operand = Box::new(self.not_expr()?);
            return Ok(Expr::new(line, ExprKind::Unary { op: UnaryOp::Not, operand }));
        }

        self.comparison()
    }

    /// `<=`, `<` and `=` are non-associative; chains are left for the caller
    /// to reject.
    fn comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.additive()?;

        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Le) => BinaryOp::Le,
            Some(TokenKind::Lt) => BinaryOp::Lt,
            Some(TokenKind::Equals) => BinaryOp::Eq,
            _ => return Ok(lhs),
        };
        self.advance()?;
        let rhs = self.additive()?;

        let line = lhs.line;
        Ok(Expr::new(
            line,
            ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        ))
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.multiplicative()?;

        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOp::Plus,
                Some(TokenKind::Minus) => BinaryOp::Minus,
                _ => return Ok(lhs),
            };
            self.advance()?;
            let rhs = self.multiplicative()?;
            let line = lhs.line;
            lhs = Expr::new(
                line,
                ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            );
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.unary()?;

        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Times) => BinaryOp::Times,
                Some(TokenKind::Divide) => BinaryOp::Divide,
                _ => return Ok(lhs),
            };
            self.advance()?;
            let rhs = self.unary()?;
            let line = lhs.line;
            lhs = Expr::new(
                line,
                ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            );
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::IsVoid) => {
                let line = self.advance()?.line;
                let operand = Box::new(self.unary()?);
                Ok(Expr::new(line, ExprKind::Unary { op: UnaryOp::IsVoid, operand }))
            }
            Some(TokenKind::Tilde) => {
                let line = self.advance()?.line;
                let operand = Box::new(self.unary()?);
                Ok(Expr::new(line, ExprKind::Unary { op: UnaryOp::Negate, operand }))
            }
            _ => self.postfix(),
        }
    }

    /// Dispatch suffixes: `.m(...)` and `@T.m(...)`.
    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut receiver = self.primary()?;

        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Dot) => {
                    self.advance()?;
                    let method = self.identifier()?;
                    let args = self.arguments()?;
                    let line = receiver.line;
                    receiver = Expr::new(
                        line,
                        ExprKind::DynamicDispatch { receiver: Box::new(receiver), method, args },
                    );
                }
                Some(TokenKind::At) => {
                    self.advance()?;
                    let ty = self.type_name()?;
                    self.expect(TokenKind::Dot)?;
                    let method = self.identifier()?;
                    let args = self.arguments()?;
                    let line = receiver.line;
                    receiver = Expr::new(
                        line,
                        ExprKind::StaticDispatch { receiver: Box::new(receiver), ty, method, args },
                    );
                }
                _ => return Ok(receiver),
            }
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = vec![];
        if self.matches(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.tokens.get(self.position).ok_or(ParseError::Eof)?;
        let line = token.line;

        match token.kind.clone() {
            TokenKind::If => {
                self.advance()?;
                let predicate = Box::new(self.expr()?);
                self.expect(TokenKind::Then)?;
                let then_body = Box::new(self.expr()?);
                self.expect(TokenKind::Else)?;
                let else_body = Box::new(self.expr()?);
                self.expect(TokenKind::Fi)?;
                Ok(Expr::new(line, ExprKind::If { predicate, then_body, else_body }))
            }
            TokenKind::While => {
                self.advance()?;
                let predicate = Box::new(self.expr()?);
                self.expect(TokenKind::Loop)?;
                let body = Box::new(self.expr()?);
                self.expect(TokenKind::Pool)?;
                Ok(Expr::new(line, ExprKind::While { predicate, body }))
            }
            TokenKind::LBrace => {
                self.advance()?;
                let mut body = vec![self.expr()?];
                self.expect(TokenKind::Semi)?;
                while !self.matches(TokenKind::RBrace) {
                    body.push(self.expr()?);
                    self.expect(TokenKind::Semi)?;
                }
                Ok(Expr::new(line, ExprKind::Block { body }))
            }
            TokenKind::Let => {
                self.advance()?;
                let mut bindings = vec![self.binding()?];
                while self.matches(TokenKind::Comma) {
                    bindings.push(self.binding()?);
                }
                self.expect(TokenKind::In)?;
                let body = Box::new(self.expr()?);
                Ok(Expr::new(line, ExprKind::Let { bindings, body }))
            }
            TokenKind::Case => {
                self.advance()?;
                let scrutinee = Box::new(self.expr()?);
                self.expect(TokenKind::Of)?;
                let mut branches = vec![self.branch()?];
                while !self.matches(TokenKind::Esac) {
                    branches.push(self.branch()?);
                }
                Ok(Expr::new(line, ExprKind::Case { scrutinee, branches }))
            }
            TokenKind::New => {
                self.advance()?;
                let ty = self.type_name()?;
                Ok(Expr::new(line, ExprKind::New { ty }))
            }
            TokenKind::Identifier(_) => {
                let name = self.identifier()?;
                if self.peek().map(|t| t.kind == TokenKind::LParen).unwrap_or(false) {
                    let args = self.arguments()?;
                    let line = name.line;
                    Ok(Expr::new(line, ExprKind::SelfDispatch { method: name, args }))
                } else {
                    let line = name.line;
                    Ok(Expr::new(line, ExprKind::Ident { name }))
                }
            }
            TokenKind::Integer(value) => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Int { value }))
            }
            TokenKind::StringLit(value) => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::Str { value }))
            }
            TokenKind::True => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::True))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Expr::new(line, ExprKind::False))
            }
            TokenKind::LParen => {
                self.advance()?;
                let inner = Box::new(self.expr()?);
                self.expect(TokenKind::RParen)?;
                Ok(Expr::new(line, ExprKind::Paren(inner)))
            }
            _ => self.error_here(),
        }
    }

    fn binding(&mut self) -> ParseResult<LetBinding> {
        let name = self.identifier()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.type_name()?;
        let init = if self.matches(TokenKind::LArrow) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(LetBinding { name, ty, init })
    }

    fn branch(&mut self) -> ParseResult<CaseBranch> {
        let name = self.identifier()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.type_name()?;
        self.expect(TokenKind::RArrow)?;
        let body = self.expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(CaseBranch { name, ty, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(line: usize, kind: TokenKind) -> Token {
        Token { line, kind }
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.to_string())
    }

    fn int(value: &str) -> TokenKind {
        TokenKind::Integer(value.to_string())
    }

    /// Wraps expression tokens into `class Main { x : Int <- <expr>; };`.
    fn wrap_expr(expr_tokens: Vec<Token>) -> Vec<Token> {
        let mut tokens = vec![
            tok(1, TokenKind::Class),
            tok(1, TokenKind::Type("Main".into())),
            tok(1, TokenKind::LBrace),
            tok(2, ident("x")),
            tok(2, TokenKind::Colon),
            tok(2, TokenKind::Type("Int".into())),
            tok(2, TokenKind::LArrow),
        ];
        tokens.extend(expr_tokens);
        tokens.extend([
            tok(9, TokenKind::Semi),
            tok(9, TokenKind::RBrace),
            tok(9, TokenKind::Semi),
        ]);
        tokens
    }

    fn parse_init(expr_tokens: Vec<Token>) -> Expr {
        let program = Parser::new(wrap_expr(expr_tokens)).parse().unwrap();
        let Feature::Attribute { init: Some(init), .. } = program.classes[0].features[0].clone()
        else {
            panic!("expected an initialized attribute");
        };
        init
    }

    #[test]
    fn test_times_binds_tighter_than_plus() {
        let expr = parse_init(vec![
            tok(2, int("1")),
            tok(2, TokenKind::Plus),
            tok(2, int("2")),
            tok(2, TokenKind::Times),
            tok(2, int("3")),
        ]);

        let ExprKind::Binary { op: BinaryOp::Plus, rhs, .. } = expr.kind else {
            panic!("expected plus at the top, got {:?}", expr.kind);
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Times, .. }));
    }

    #[test]
    fn test_additive_is_left_associative() {
        let expr = parse_init(vec![
            tok(2, int("1")),
            tok(2, TokenKind::Minus),
            tok(2, int("2")),
            tok(2, TokenKind::Minus),
            tok(2, int("3")),
        ]);

        let ExprKind::Binary { op: BinaryOp::Minus, lhs, .. } = expr.kind else {
            panic!("expected minus at the top");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Minus, .. }));
    }

    #[test]
    fn test_comparison_is_non_associative() {
        let result = Parser::new(wrap_expr(vec![
            tok(2, int("1")),
            tok(2, TokenKind::Lt),
            tok(2, int("2")),
            tok(2, TokenKind::Lt),
            tok(2, int("3")),
        ]))
        .parse();

        assert!(result.is_err());
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let expr = parse_init(vec![
            tok(2, TokenKind::Not),
            tok(2, int("1")),
            tok(2, TokenKind::Equals),
            tok(2, int("2")),
        ]);

        let ExprKind::Unary { op: UnaryOp::Not, operand } = expr.kind else {
            panic!("expected not at the top");
        };
        assert!(matches!(operand.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_negate_binds_tighter_than_times() {
        let expr = parse_init(vec![
            tok(2, TokenKind::Tilde),
            tok(2, int("1")),
            tok(2, TokenKind::Times),
            tok(2, int("2")),
        ]);

        let ExprKind::Binary { op: BinaryOp::Times, lhs, .. } = expr.kind else {
            panic!("expected times at the top");
        };
        assert!(matches!(lhs.kind, ExprKind::Unary { op: UnaryOp::Negate, .. }));
    }

    #[test]
    fn test_dispatch_chain() {
        let expr = parse_init(vec![
            tok(2, ident("a")),
            tok(2, TokenKind::Dot),
            tok(2, ident("f")),
            tok(2, TokenKind::LParen),
            tok(2, TokenKind::RParen),
            tok(2, TokenKind::At),
            tok(2, TokenKind::Type("B".into())),
            tok(2, TokenKind::Dot),
            tok(2, ident("g")),
            tok(2, TokenKind::LParen),
            tok(2, int("1")),
            tok(2, TokenKind::RParen),
        ]);

        let ExprKind::StaticDispatch { receiver, ty, method, args } = expr.kind else {
            panic!("expected static dispatch at the top");
        };
        assert_eq!("B", ty.name);
        assert_eq!("g", method.name);
        assert_eq!(1, args.len());
        assert!(matches!(receiver.kind, ExprKind::DynamicDispatch { .. }));
    }

    #[test]
    fn test_assignment_is_right_nested() {
        let expr = parse_init(vec![
            tok(2, ident("a")),
            tok(2, TokenKind::LArrow),
            tok(2, ident("b")),
            tok(2, TokenKind::LArrow),
            tok(2, int("1")),
        ]);

        let ExprKind::Assign { target, value } = expr.kind else {
            panic!("expected assign at the top");
        };
        assert_eq!("a", target.name);
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn test_error_reports_nearest_token() {
        let result = Parser::new(vec![
            tok(1, TokenKind::Class),
            tok(1, TokenKind::Type("Main".into())),
            tok(1, TokenKind::LBrace),
            tok(2, TokenKind::Semi),
        ])
        .parse();

        assert_eq!(
            Err(ParseError::Near { line: 2, lexeme: "semi".into() }),
            result
        );
    }

    #[test]
    fn test_empty_stream_is_eof() {
        assert_eq!(Err(ParseError::Eof), Parser::new(vec![]).parse());
    }
}
