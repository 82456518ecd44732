//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! The `--sample` mini-language.
//!
//! `original_source` builds the sampling predicate with
//! `eval(f"lambda word: {args.sample}")`, handing an arbitrary Python
//! expression straight to `eval`. Per spec.md §9's re-architecture note,
//! this crate instead parses a small, bounded grammar over a single
//! free variable `word`:
//!
//! ```text
//! expr   := term (("and" | "or") term)*
//! term   := "not" term | atom
//! atom   := "word" "==" STRING
//!         | "word" "!=" STRING
//!         | STRING "in" "word"
//!         | "hash(word)" "%" NUMBER "==" NUMBER
//!         | "(" expr ")"
//! ```
//!
//! No arbitrary code ever runs; an expression outside this grammar is a
//! parse error, not a security hole.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SamplePredicate {
    Eq(String),
    NotEq(String),
    Contains(String),
    ModHash { modulus: u64, remainder: u64 },
    And(Box<SamplePredicate>, Box<SamplePredicate>),
    Or(Box<SamplePredicate>, Box<SamplePredicate>),
    Not(Box<SamplePredicate>),
}

impl SamplePredicate {
    pub fn matches(&self, word: &str) -> bool {
        match self {
            SamplePredicate::Eq(s) => word == s,
            SamplePredicate::NotEq(s) => word != s,
            SamplePredicate::Contains(s) => word.contains(s.as_str()),
            SamplePredicate::ModHash { modulus, remainder } => {
                let mut hasher = DefaultHasher::new();
                word.hash(&mut hasher);
                hasher.finish() % modulus == *remainder
            }
            SamplePredicate::And(a, b) => a.matches(word) && b.matches(word),
            SamplePredicate::Or(a, b) => a.matches(word) || b.matches(word),
            SamplePredicate::Not(a) => !a.matches(word),
        }
    }
}

pub fn parse(expr: &str) -> Result<SamplePredicate> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let predicate = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::Sample(format!("unexpected trailing input in '{expr}'")));
    }
    Ok(predicate)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word,
    HashWord,
    And,
    Or,
    Not,
    In,
    Eq,
    NotEq,
    Percent,
    LParen,
    RParen,
    String(String),
    Number(u64),
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(Error::Sample(format!("unterminated string in '{expr}'")));
                }
                i += 1;
                tokens.push(Token::String(s));
            }
            _ if c.is_ascii_digit() => {
                let mut s = String::new();
                while i < chars.len() && chars[i].is_ascii_digit() {
                    s.push(chars[i]);
                    i += 1;
                }
                let n: u64 = s
                    .parse()
                    .map_err(|_| Error::Sample(format!("invalid number in '{expr}'")))?;
                tokens.push(Token::Number(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    s.push(chars[i]);
                    i += 1;
                }
                // allow `hash(word)` as a single token by peeking ahead
                if s == "hash" && chars[i..].iter().collect::<String>().trim_start().starts_with('(') {
                    let rest: String = chars[i..].iter().collect();
                    let trimmed = rest.trim_start();
                    if let Some(after_paren) = trimmed.strip_prefix('(') {
                        let after_paren = after_paren.trim_start();
                        if let Some(after_word) = after_paren.strip_prefix("word") {
                            let after_word = after_word.trim_start();
                            if let Some(after_close) = after_word.strip_prefix(')') {
                                let consumed = rest.len() - after_close.len();
                                i += consumed;
                                tokens.push(Token::HashWord);
                                continue;
                            }
                        }
                    }
                    return Err(Error::Sample(format!("expected hash(word) in '{expr}'")));
                }
                match s.as_str() {
                    "word" => tokens.push(Token::Word),
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::In),
                    other => return Err(Error::Sample(format!("unknown identifier '{other}' in '{expr}'"))),
                }
            }
            other => return Err(Error::Sample(format!("unexpected character '{other}' in '{expr}'"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<SamplePredicate> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = SamplePredicate::And(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Or) => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = SamplePredicate::Or(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<SamplePredicate> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_term()?;
            return Ok(SamplePredicate::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<SamplePredicate> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(Error::Sample("expected ')'".into())),
                }
            }
            Some(Token::Word) => match self.advance() {
                Some(Token::Eq) => match self.advance() {
                    Some(Token::String(s)) => Ok(SamplePredicate::Eq(s)),
                    _ => Err(Error::Sample("expected string after 'word =='".into())),
                },
                Some(Token::NotEq) => match self.advance() {
                    Some(Token::String(s)) => Ok(SamplePredicate::NotEq(s)),
                    _ => Err(Error::Sample("expected string after 'word !='".into())),
                },
                _ => Err(Error::Sample("expected '==' or '!=' after 'word'".into())),
            },
            Some(Token::String(s)) => match self.advance() {
                Some(Token::In) => match self.advance() {
                    Some(Token::Word) => Ok(SamplePredicate::Contains(s)),
                    _ => Err(Error::Sample("expected 'word' after 'in'".into())),
                },
                _ => Err(Error::Sample("expected 'in word' after string literal".into())),
            },
            Some(Token::HashWord) => match self.advance() {
                Some(Token::Percent) => match self.advance() {
                    Some(Token::Number(modulus)) => match self.advance() {
                        Some(Token::Eq) => match self.advance() {
                            Some(Token::Number(remainder)) => {
                                Ok(SamplePredicate::ModHash { modulus, remainder })
                            }
                            _ => Err(Error::Sample("expected number after '=='".into())),
                        },
                        _ => Err(Error::Sample("expected '==' after modulus".into())),
                    },
                    _ => Err(Error::Sample("expected number after '%'".into())),
                },
                _ => Err(Error::Sample("expected '%' after 'hash(word)'".into())),
            },
            other => Err(Error::Sample(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_predicate() {
        let p = parse("word == \"Smith\"").unwrap();
        assert!(p.matches("Smith"));
        assert!(!p.matches("Jones"));
    }

    #[test]
    fn substring_predicate() {
        let p = parse("\"mit\" in word").unwrap();
        assert!(p.matches("Smith"));
        assert!(!p.matches("Jones"));
    }

    #[test]
    fn modulo_hash_predicate_is_deterministic() {
        let p = parse("hash(word) % 4 == 1").unwrap();
        let first = p.matches("repeatable-input");
        let second = p.matches("repeatable-input");
        assert_eq!(first, second);
    }

    #[test]
    fn combined_and_not() {
        let p = parse("not word == \"Smith\" and \"o\" in word").unwrap();
        assert!(p.matches("Jones"));
        assert!(!p.matches("Smith"));
    }

    #[test]
    fn rejects_arbitrary_code() {
        assert!(parse("__import__('os').system('rm -rf /')").is_err());
    }
}
