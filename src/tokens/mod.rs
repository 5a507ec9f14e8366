//! Token model for Cool and the reader for pre-lexed token files.
//!
//! A token file carries one token per record: the line number, the token
//! kind, and (for `identifier`, `integer`, `type` and `string`) a third line
//! holding the lexeme.
use std::{collections::HashMap, error::Error, fmt::Display, io::BufRead};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

macro_rules! terminal {
    ($map:ident, $name:ident, $value:expr) => {
        $map.insert($value, TokenKind::$name);
    };
}

static TOKEN_KINDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut m = HashMap::new();

    terminal!(m, LParen, "lparen");
    terminal!(m, RParen, "rparen");
    terminal!(m, LBrace, "lbrace");
    terminal!(m, RBrace, "rbrace");
    terminal!(m, Colon, "colon");
    terminal!(m, Comma, "comma");
    terminal!(m, Dot, "dot");
    terminal!(m, Semi, "semi");
    terminal!(m, At, "at");
    terminal!(m, Times, "times");
    terminal!(m, Divide, "divide");
    terminal!(m, Plus, "plus");
    terminal!(m, Minus, "minus");
    terminal!(m, Tilde, "tilde");
    terminal!(m, Lt, "lt");
    terminal!(m, Equals, "equals");
    terminal!(m, Le, "le");
    terminal!(m, LArrow, "larrow");
    terminal!(m, RArrow, "rarrow");
    terminal!(m, Class, "class");
    terminal!(m, Else, "else");
    terminal!(m, Esac, "esac");
    terminal!(m, False, "false");
    terminal!(m, Fi, "fi");
    terminal!(m, If, "if");
    terminal!(m, In, "in");
    terminal!(m, Inherits, "inherits");
    terminal!(m, IsVoid, "isvoid");
    terminal!(m, Let, "let");
    terminal!(m, Loop, "loop");
    terminal!(m, New, "new");
    terminal!(m, Not, "not");
    terminal!(m, Of, "of");
    terminal!(m, Pool, "pool");
    terminal!(m, Then, "then");
    terminal!(m, True, "true");
    terminal!(m, While, "while");
    terminal!(m, Case, "case");

    m
});

/// The lexical category of a token, with the lexeme attached for the payload
/// carrying kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    Semi,
    At,
    Times,
    Divide,
    Plus,
    Minus,
    Tilde,
    Lt,
    Equals,
    Le,
    LArrow,
    RArrow,
    Class,
    Else,
    Esac,
    False,
    Fi,
    If,
    In,
    Inherits,
    IsVoid,
    Let,
    Loop,
    New,
    Not,
    Of,
    Pool,
    Then,
    True,
    While,
    Case,
    Identifier(String),
    Integer(String),
    Type(String),
    StringLit(String),
}

impl TokenKind {
    /// The surface text used when reporting a parse error near this token.
    pub fn lexeme(&self) -> &str {
        match self {
            TokenKind::Identifier(value)
            | TokenKind::Integer(value)
            | TokenKind::Type(value)
            | TokenKind::StringLit(value) => value,
            TokenKind::LParen => "lparen",
            TokenKind::RParen => "rparen",
            TokenKind::LBrace => "lbrace",
            TokenKind::RBrace => "rbrace",
            TokenKind::Colon => "colon",
            TokenKind::Comma => "comma",
            TokenKind::Dot => "dot",
            TokenKind::Semi => "semi",
            TokenKind::At => "at",
            TokenKind::Times => "times",
            TokenKind::Divide => "divide",
            TokenKind::Plus => "plus",
            TokenKind::Minus => "minus",
            TokenKind::Tilde => "tilde",
            TokenKind::Lt => "lt",
            TokenKind::Equals => "equals",
            TokenKind::Le => "le",
            TokenKind::LArrow => "larrow",
            TokenKind::RArrow => "rarrow",
            TokenKind::Class => "class",
            TokenKind::Else => "else",
            TokenKind::Esac => "esac",
            TokenKind::False => "false",
            TokenKind::Fi => "fi",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Inherits => "inherits",
            TokenKind::IsVoid => "isvoid",
            TokenKind::Let => "let",
            TokenKind::Loop => "loop",
            TokenKind::New => "new",
            TokenKind::Not => "not",
            TokenKind::Of => "of",
            TokenKind::Pool => "pool",
            TokenKind::Then => "then",
            TokenKind::True => "true",
            TokenKind::While => "while",
            TokenKind::Case => "case",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub line: usize,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError(pub String);

impl Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Error for TokenError {}

pub type TokenResult<T> = Result<T, TokenError>;

/// Read a pre-lexed token stream.
pub fn read_tokens(input: impl BufRead) -> TokenResult<Vec<Token>> {
    let mut lines = input.lines();
    let mut tokens = vec![];

    loop {
        let Some(line_no) = next_line(&mut lines)? else {
            break;
        };

        let line = line_no
            .trim()
            .parse::<usize>()
            .map_err(|_| TokenError(format!("invalid token line number '{line_no}'")))?;

        let Some(name) = next_line(&mut lines)? else {
            return Err(TokenError(format!("missing token kind after line {line}")));
        };

        let kind = match name.as_str() {
            "identifier" | "integer" | "type" | "string" => {
                let Some(value) = next_line(&mut lines)? else {
                    return Err(TokenError(format!("missing lexeme for '{name}' at line {line}")));
                };
                match name.as_str() {
                    "identifier" => TokenKind::Identifier(value),
                    "integer" => TokenKind::Integer(value),
                    "type" => TokenKind::Type(value),
                    _ => TokenKind::StringLit(value),
                }
            }
            other => match TOKEN_KINDS.get(other) {
                Some(kind) => kind.clone(),
                None => return Err(TokenError(format!("unknown token kind '{other}' at line {line}"))),
            },
        };

        tokens.push(Token { line, kind });
    }

    Ok(tokens)
}

fn next_line(lines: &mut std::io::Lines<impl BufRead>) -> TokenResult<Option<String>> {
    match lines.next() {
        None => Ok(None),
        Some(Ok(line)) => Ok(Some(line)),
        Some(Err(e)) => Err(TokenError(format!("failed to read token file: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_punctuation() {
        let tokens = read_tokens("1\nlparen\n1\nrparen\n".as_bytes()).unwrap();

        assert_eq!(
            vec![
                Token { line: 1, kind: TokenKind::LParen },
                Token { line: 1, kind: TokenKind::RParen },
            ],
            tokens
        );
    }

    #[test]
    fn test_read_payload_tokens() {
        let tokens = read_tokens("3\nidentifier\nfoo\n4\ninteger\n42\n5\ntype\nMain\n6\nstring\nhi\n".as_bytes())
            .unwrap();

        assert_eq!(
            vec![
                Token { line: 3, kind: TokenKind::Identifier("foo".into()) },
                Token { line: 4, kind: TokenKind::Integer("42".into()) },
                Token { line: 5, kind: TokenKind::Type("Main".into()) },
                Token { line: 6, kind: TokenKind::StringLit("hi".into()) },
            ],
            tokens
        );
    }

    #[test]
    fn test_read_empty_string_lexeme() {
        let tokens = read_tokens("1\nstring\n\n".as_bytes()).unwrap();

        assert_eq!(
            vec![Token { line: 1, kind: TokenKind::StringLit(String::new()) }],
            tokens
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(read_tokens("1\nwhatever\n".as_bytes()).is_err());
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        assert!(read_tokens("7\nidentifier\n".as_bytes()).is_err());
    }
}
