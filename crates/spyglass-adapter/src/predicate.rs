//! Comparison predicate language for the memory backend
//!
//! A deliberately small filter grammar, enough for the inspector's
//! browse-and-filter UI:
//!
//! ```text
//! predicate  := clause ( '&&' clause )*          -- 'AND' also accepted
//! clause     := keypath op literal
//! op         := '==' | '=' | '!=' | '<' | '<=' | '>' | '>='
//! keypath    := ident ( '.' ident )*
//! literal    := 'string' | "string" | number | true | false | null
//! ```
//!
//! The top level is an implicit conjunction of all clauses. Anything that
//! does not parse is a predicate error, surfaced to clients as
//! `InvalidPredicate`.

use std::cmp::Ordering;

use thiserror::Error;

use spyglass_protocol::Value;

/// Parse failure for a predicate string
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PredicateError(pub String);

/// Comparison operator of one clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Literal operand of one clause
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone)]
struct Clause {
    keypath: Vec<String>,
    op: CompareOp,
    literal: Literal,
}

/// A compiled predicate: a conjunction of comparison clauses
#[derive(Debug, Clone)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    /// Compile a predicate string
    pub fn parse(input: &str) -> Result<Self, PredicateError> {
        let tokens = tokenize(input)?;
        Parser { tokens, pos: 0 }.parse()
    }

    /// Evaluate against a serialized document
    ///
    /// Missing keys resolve to null. Clauses over incomparable values are
    /// false.
    pub fn matches(&self, document: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(document))
    }
}

impl Clause {
    fn matches(&self, document: &Value) -> bool {
        let mut current = document;
        for segment in &self.keypath {
            match current.get(segment) {
                Some(v) => current = v,
                None => return self.null_comparison(),
            }
        }
        compare(current, &self.literal)
            .map(|ordering| self.op_holds(ordering))
            .unwrap_or(false)
    }

    /// A missing key behaves like an explicit null
    fn null_comparison(&self) -> bool {
        match self.literal {
            Literal::Null => self.op == CompareOp::Eq,
            _ => self.op == CompareOp::Ne,
        }
    }

    fn op_holds(&self, ordering: Ordering) -> bool {
        match self.op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Compare a document value against a literal; `None` when incomparable
fn compare(value: &Value, literal: &Literal) -> Option<Ordering> {
    match literal {
        Literal::Null => Some(if value.is_null() {
            Ordering::Equal
        } else {
            Ordering::Greater
        }),
        Literal::Bool(b) => value.as_bool().map(|v| v.cmp(b)),
        Literal::Int(i) => value.as_f64().and_then(|v| v.partial_cmp(&(*i as f64))),
        Literal::Float(f) => value.as_f64().and_then(|v| v.partial_cmp(f)),
        Literal::Str(s) => match value {
            Value::Date(ts) => {
                // Allow comparing timestamps against ISO-8601 literals
                let parsed = chrono::DateTime::parse_from_rfc3339(s).ok()?;
                Some(ts.cmp(&parsed.with_timezone(&chrono::Utc)))
            }
            _ => value.as_str().map(|v| v.cmp(s.as_str())),
        },
    }
}

// ============================================================================
// Tokenizer / parser
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(CompareOp),
    And,
    Dot,
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(PredicateError("expected '=' after '!'".into()));
                }
                tokens.push(Token::Op(CompareOp::Ne));
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CompareOp::Le));
                } else {
                    tokens.push(Token::Op(CompareOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CompareOp::Ge));
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                }
            }
            '&' => {
                chars.next();
                if chars.next() != Some('&') {
                    return Err(PredicateError("expected '&&'".into()));
                }
                tokens.push(Token::And);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => return Err(PredicateError("unterminated escape".into())),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(PredicateError("unterminated string literal".into())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut num = String::new();
                num.push(c);
                chars.next();
                let mut is_float = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        num.push(ch);
                        chars.next();
                    } else if ch == '.' && !is_float {
                        is_float = true;
                        num.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = if is_float {
                    Token::Float(
                        num.parse()
                            .map_err(|_| PredicateError(format!("bad number '{num}'")))?,
                    )
                } else {
                    Token::Int(
                        num.parse()
                            .map_err(|_| PredicateError(format!("bad number '{num}'")))?,
                    )
                };
                tokens.push(token);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "AND" | "and" => tokens.push(Token::And),
                    _ => tokens.push(Token::Ident(ident)),
                }
            }
            other => {
                return Err(PredicateError(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse(mut self) -> Result<Predicate, PredicateError> {
        let mut clauses = vec![self.clause()?];
        while self.pos < self.tokens.len() {
            match self.next()? {
                Token::And => clauses.push(self.clause()?),
                other => {
                    return Err(PredicateError(format!("expected '&&', got {other:?}")));
                }
            }
        }
        Ok(Predicate { clauses })
    }

    fn clause(&mut self) -> Result<Clause, PredicateError> {
        let mut keypath = vec![self.ident()?];
        while self.peek() == Some(&Token::Dot) {
            self.next()?;
            keypath.push(self.ident()?);
        }

        let op = match self.next()? {
            Token::Op(op) => op,
            other => return Err(PredicateError(format!("expected operator, got {other:?}"))),
        };

        let literal = match self.next()? {
            Token::Str(s) => Literal::Str(s),
            Token::Int(i) => Literal::Int(i),
            Token::Float(f) => Literal::Float(f),
            Token::Ident(word) => match word.as_str() {
                "true" => Literal::Bool(true),
                "false" => Literal::Bool(false),
                "null" | "nil" => Literal::Null,
                other => {
                    return Err(PredicateError(format!(
                        "expected literal, got identifier '{other}'"
                    )));
                }
            },
            other => return Err(PredicateError(format!("expected literal, got {other:?}"))),
        };

        Ok(Clause {
            keypath,
            op,
            literal,
        })
    }

    fn ident(&mut self) -> Result<String, PredicateError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(PredicateError(format!("expected field name, got {other:?}"))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, PredicateError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| PredicateError("unexpected end of predicate".into()))?;
        self.pos += 1;
        Ok(token)
    }
}

#[cfg(test)]
#[path = "predicate_test.rs"]
mod tests;
