// Copyright 2026 Lexsearch Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parser for the pipe-delimited query language.
//!
//! ```text
//! and(equals|name|Grund||gt|population|100)
//! not(exists|area||contains|name|vik)
//! v_larger_place(freetext|botten)
//! ```
//!
//! `||` separates arguments of a logical operator, `|` separates operator,
//! field and value. Values are bare (no `|`, `(` or `)`) or double quoted.

use crate::ast::AstNode;
use crate::ast::BinaryOperator;
use crate::ast::Literal;
use crate::error::ParseError;

const FRAGMENT_CHARS: usize = 40;
/// Deepest accepted nesting of logical operators and sub queries.
pub const MAX_DEPTH: usize = 128;

pub fn parse(input: &str) -> Result<AstNode, ParseError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new("", "empty query"));
    }
    let mut p = Parser::new(input, tokens);
    let node = p.parse_expr()?;
    if p.pos < p.tokens.len() {
        return Err(p.error_here("unexpected trailing input"));
    }
    Ok(node)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Pipe,
    DoublePipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    offset: usize,
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: Vec<Spanned>) -> Self {
        Self {
            input,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn parse_expr(&mut self) -> Result<AstNode, ParseError> {
        let Some(Token::Word(word)) = self.peek_token() else {
            return Err(self.error_here("expected expression"));
        };
        match self.peek_token_at(1) {
            Some(Token::LParen) => {
                if self.depth >= MAX_DEPTH {
                    return Err(self.error_here("query nested too deeply"));
                }
                self.depth += 1;
                let node = match word.as_str() {
                    "and" | "or" | "not" => self.parse_logical(&word),
                    _ => self.parse_sub_query(),
                };
                self.depth -= 1;
                node
            }
            Some(Token::Pipe) => self.parse_query_expr(&word),
            _ => Err(self.error_here(&format!("expected '|' or '(' after '{word}'"))),
        }
    }

    fn parse_logical(&mut self, kind: &str) -> Result<AstNode, ParseError> {
        let start = self.pos;
        self.next();
        self.expect(Token::LParen)?;
        let mut children = Vec::new();
        if self.peek(&Token::RParen) {
            self.next();
        } else {
            loop {
                children.push(self.parse_expr()?);
                if self.peek(&Token::DoublePipe) {
                    self.next();
                } else if self.peek(&Token::RParen) {
                    self.next();
                    break;
                } else {
                    return Err(self.error_here("expected '||' or ')'"));
                }
            }
        }
        match kind {
            "and" => Ok(AstNode::And(children)),
            "or" => Ok(AstNode::Or(children)),
            _ if children.is_empty() => Err(self.error_at(start, "not() requires at least one argument")),
            _ => Ok(AstNode::Not(children)),
        }
    }

    fn parse_sub_query(&mut self) -> Result<AstNode, ParseError> {
        let field = self.expect_field()?;
        self.expect(Token::LParen)?;
        let inner = self.parse_expr()?;
        self.expect(Token::RParen)?;
        Ok(AstNode::SubQuery {
            field,
            inner: Box::new(inner),
        })
    }

    fn parse_query_expr(&mut self, word: &str) -> Result<AstNode, ParseError> {
        let start = self.pos;
        self.next();
        self.expect(Token::Pipe)?;
        match word {
            "exists" | "missing" => {
                let field = self.expect_field()?;
                if self.peek(&Token::Pipe) {
                    return Err(self.error_here(&format!("{word} takes exactly one field argument")));
                }
                if word == "exists" {
                    Ok(AstNode::Exists(field))
                } else {
                    Ok(AstNode::Missing(field))
                }
            }
            "freetext" => Ok(AstNode::Freetext(self.expect_value()?)),
            "freergxp" => Ok(AstNode::FreeRegexp(self.expect_value()?)),
            _ => {
                let Some(op) = BinaryOperator::from_keyword(word) else {
                    return Err(self.error_at(start, &format!("unknown operator '{word}'")));
                };
                let field = self.expect_field()?;
                self.expect(Token::Pipe)?;
                let arg_pos = self.pos;
                let arg = self.expect_value()?;
                if !op.accepts_numbers() && !arg.is_string() {
                    return Err(self.error_at(
                        arg_pos,
                        &format!("operator '{}' requires a string argument", op.as_str()),
                    ));
                }
                Ok(AstNode::BinaryOp { op, field, arg })
            }
        }
    }

    fn expect_field(&mut self) -> Result<String, ParseError> {
        match self.peek_token() {
            Some(Token::Word(word)) if is_field_name(&word) => {
                self.next();
                Ok(word)
            }
            Some(Token::Word(word)) => Err(self.error_here(&format!("invalid field name '{word}'"))),
            _ => Err(self.error_here("expected field name")),
        }
    }

    fn expect_value(&mut self) -> Result<Literal, ParseError> {
        match self.peek_token() {
            Some(Token::Word(word)) => {
                self.next();
                Ok(bare_literal(word))
            }
            Some(Token::Quoted(text)) => {
                self.next();
                Ok(Literal::QuotedStr(text))
            }
            _ => Err(self.error_here("expected value")),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.peek(&token) {
            self.next();
            Ok(())
        } else {
            Err(self.error_here(&format!("expected {}", describe(&token))))
        }
    }

    fn peek(&self, token: &Token) -> bool {
        self.tokens.get(self.pos).map(|s| &s.token) == Some(token)
    }

    fn peek_token(&self) -> Option<Token> {
        self.peek_token_at(0)
    }

    fn peek_token_at(&self, ahead: usize) -> Option<Token> {
        self.tokens.get(self.pos + ahead).map(|s| s.token.clone())
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|s| s.token.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, description: &str) -> ParseError {
        self.error_at(self.pos, description)
    }

    fn error_at(&self, pos: usize, description: &str) -> ParseError {
        match self.tokens.get(pos) {
            Some(spanned) => ParseError::new(fragment(self.input, spanned.offset), description),
            None if description.starts_with("expected") => {
                ParseError::new("", format!("unexpected end of query, {description}"))
            }
            None => ParseError::new("", description),
        }
    }
}

fn describe(token: &Token) -> &'static str {
    match token {
        Token::Word(_) => "word",
        Token::Quoted(_) => "quoted string",
        Token::Pipe => "'|'",
        Token::DoublePipe => "'||'",
        Token::LParen => "'('",
        Token::RParen => "')'",
    }
}

fn fragment(input: &str, offset: usize) -> String {
    input
        .get(offset..)
        .unwrap_or_default()
        .chars()
        .take(FRAGMENT_CHARS)
        .collect()
}

fn is_field_name(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '*' | ','))
}

fn bare_literal(word: String) -> Literal {
    if !word.is_empty() && word.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = word.parse::<i64>() {
            return Literal::Int(n);
        }
    }
    match parse_float(&word) {
        Some(f) => Literal::Float(f),
        None => Literal::Str(word),
    }
}

/// Accepts `12.5`, `1e20`, `1.5e-7` and the like; always finite.
fn parse_float(word: &str) -> Option<f64> {
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let (mantissa, exponent) = match word.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (word, None),
    };
    let mantissa_ok = match mantissa.split_once('.') {
        Some((int, frac)) => digits(int) && digits(frac),
        None => exponent.is_some() && digits(mantissa),
    };
    let exponent_ok = exponent.is_none_or(|e| digits(e.strip_prefix(['-', '+']).unwrap_or(e)));
    if !(mantissa_ok && exponent_ok) {
        return None;
    }
    word.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn lex(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut chars = input.char_indices().peekable();
    let mut tokens = Vec::new();
    while let Some((offset, ch)) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '|' {
            chars.next();
            if matches!(chars.peek(), Some((_, '|'))) {
                chars.next();
                tokens.push(Spanned {
                    token: Token::DoublePipe,
                    offset,
                });
            } else {
                tokens.push(Spanned {
                    token: Token::Pipe,
                    offset,
                });
            }
            continue;
        }
        if ch == '(' || ch == ')' {
            chars.next();
            let token = if ch == '(' {
                Token::LParen
            } else {
                Token::RParen
            };
            tokens.push(Spanned { token, offset });
            continue;
        }
        if ch == '"' {
            chars.next();
            let mut buf = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == '"' {
                    closed = true;
                    break;
                }
                if c == '\\' && matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    buf.push('"');
                } else {
                    buf.push(c);
                }
            }
            if !closed {
                return Err(ParseError::new(
                    fragment(input, offset),
                    "unterminated quoted string",
                ));
            }
            tokens.push(Spanned {
                token: Token::Quoted(buf),
                offset,
            });
            continue;
        }
        let mut buf = String::new();
        while let Some((_, c)) = chars.peek().copied() {
            if matches!(c, '|' | '(' | ')') {
                break;
            }
            buf.push(c);
            chars.next();
        }
        tokens.push(Spanned {
            token: Token::Word(buf.trim_end().to_string()),
            offset,
        });
    }
    Ok(tokens)
}
