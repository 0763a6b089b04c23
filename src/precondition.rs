//! Boolean precondition expressions gating vulnerabilities.
//!
//! The engine is domain-agnostic: it knows nothing about properties or
//! profiles. Every symbol is handed to a [`SymbolResolver`] and the answer is
//! substituted before the expression is reduced.
//!
//! ```text
//! expr   := term   (('|' | "or")  term)*
//! term   := factor (('&' | "and") factor)*
//! factor := ('~' | '!' | "not") factor | '(' expr ')' | "true" | "false" | symbol
//! symbol := [A-Za-z0-9_.:/-]+
//! ```
//!
//! Keywords are case-insensitive. A symbol the resolver does not know about
//! evaluates to `false`; evaluation never fails.

use crate::error::PreconditionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Answer of a [`SymbolResolver`] for one symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    /// Collapse to a boolean, treating `Unknown` as `false`.
    pub fn is_true(self) -> bool {
        matches!(self, Truth::True)
    }
}

impl From<bool> for Truth {
    fn from(b: bool) -> Self {
        if b { Truth::True } else { Truth::False }
    }
}

/// Supplies truth values for expression symbols.
pub trait SymbolResolver {
    fn resolve(&self, symbol: &str) -> Truth;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Truth,
{
    fn resolve(&self, symbol: &str) -> Truth {
        self(symbol)
    }
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Const(bool),
    Symbol(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    fn evaluate<R: SymbolResolver + ?Sized>(&self, resolver: &R) -> bool {
        match self {
            Expr::Const(b) => *b,
            Expr::Symbol(s) => resolver.resolve(s).is_true(),
            Expr::Not(inner) => !inner.evaluate(resolver),
            Expr::And(terms) => terms.iter().all(|t| t.evaluate(resolver)),
            Expr::Or(terms) => terms.iter().any(|t| t.evaluate(resolver)),
        }
    }

    fn collect_symbols<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Const(_) => {}
            Expr::Symbol(s) => {
                out.insert(s.as_str());
            }
            Expr::Not(inner) => inner.collect_symbols(out),
            Expr::And(terms) | Expr::Or(terms) => {
                for t in terms {
                    t.collect_symbols(out);
                }
            }
        }
    }
}

/// A parsed precondition that keeps its source text for display and serialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Precondition {
    source: String,
    expr: Expr,
}

impl Precondition {
    pub fn parse(input: &str) -> Result<Self, PreconditionError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            end: input.len(),
        };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(PreconditionError {
                message: format!("unexpected {}", tok.kind.describe()),
                position: tok.offset,
            });
        }
        Ok(Precondition {
            source: input.trim().to_string(),
            expr,
        })
    }

    /// The precondition every vulnerability has when none is declared.
    pub fn always() -> Self {
        Precondition {
            source: "true".to_string(),
            expr: Expr::Const(true),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// All distinct symbols, in lexical order.
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.expr.collect_symbols(&mut out);
        out
    }

    pub fn evaluate<R: SymbolResolver + ?Sized>(&self, resolver: &R) -> bool {
        self.expr.evaluate(resolver)
    }
}

impl Default for Precondition {
    fn default() -> Self {
        Precondition::always()
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl TryFrom<String> for Precondition {
    type Error = PreconditionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Precondition::parse(&value)
    }
}

impl From<Precondition> for String {
    fn from(p: Precondition) -> Self {
        p.source
    }
}

// ─── Tokenizer ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    And,
    Or,
    Not,
    LParen,
    RParen,
    True,
    False,
    Symbol(String),
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::And => "'&'".to_string(),
            TokenKind::Or => "'|'".to_string(),
            TokenKind::Not => "'~'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::True => "'true'".to_string(),
            TokenKind::False => "'false'".to_string(),
            TokenKind::Symbol(s) => format!("symbol '{}'", s),
        }
    }
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')
}

fn tokenize(input: &str) -> Result<Vec<Token>, PreconditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '&' => TokenKind::And,
            '|' => TokenKind::Or,
            '~' | '!' => TokenKind::Not,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            c if is_symbol_char(c) => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_symbol_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Symbol(word),
                };
                tokens.push(Token { kind, offset });
                continue;
            }
            other => {
                return Err(PreconditionError {
                    message: format!("unexpected character '{}'", other),
                    position: offset,
                });
            }
        };
        chars.next();
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

// ─── Recursive descent ──────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    end: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, PreconditionError> {
        let mut terms = vec![self.term()?];
        while self.eat(&TokenKind::Or) {
            terms.push(self.term()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn term(&mut self) -> Result<Expr, PreconditionError> {
        let mut factors = vec![self.factor()?];
        while self.eat(&TokenKind::And) {
            factors.push(self.factor()?);
        }
        Ok(if factors.len() == 1 {
            factors.remove(0)
        } else {
            Expr::And(factors)
        })
    }

    fn factor(&mut self) -> Result<Expr, PreconditionError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(PreconditionError {
                message: "unexpected end of expression".to_string(),
                position: self.end,
            });
        };
        self.pos += 1;
        match tok.kind {
            TokenKind::Not => Ok(Expr::Not(Box::new(self.factor()?))),
            TokenKind::LParen => {
                let inner = self.expr()?;
                if !self.eat(&TokenKind::RParen) {
                    return Err(PreconditionError {
                        message: "missing closing parenthesis".to_string(),
                        position: self.peek().map(|t| t.offset).unwrap_or(self.end),
                    });
                }
                Ok(inner)
            }
            TokenKind::True => Ok(Expr::Const(true)),
            TokenKind::False => Ok(Expr::Const(false)),
            TokenKind::Symbol(s) => Ok(Expr::Symbol(s)),
            other => Err(PreconditionError {
                message: format!("unexpected {}", other.describe()),
                position: tok.offset,
            }),
        }
    }
}
