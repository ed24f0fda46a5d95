//! TreeQL tokenizer
//!
//! Lexing happens in two layers. Each non-blank line is classified by a
//! line-level pattern (root open, relationship open, close, attribute). An
//! attribute line may carry a bracketed filter, which a logos sub-lexer
//! breaks into grouping, logic and `<selector> <operator> <value>` terms.
//!
//! Lines are lexed lazily: [`Tokenizer`] only looks at a line once the
//! consumer has drained the tokens of the previous one.

use crate::ast::{BoolTerm, Literal, LiteralKind, LogicOp, Operator, Selector};
use logos::Logos;
use regex::Regex;
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;
use treeql_core::{Error, Result};

static ROOT_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^query\s+([A-Za-z_]\w*)\s*\{$").expect("valid regex"));

static RELATIONSHIP_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?:\(\s*([A-Za-z_]\w*)\s*\))?\s*\{$").expect("valid regex")
});

static CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\}$").expect("valid regex"));

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)\s*(?:\[(.*)\])?$").expect("valid regex"));

/// Parser-level token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `query <Model> {`
    RootOpen(String),
    /// `<relationship> {`
    RelationshipOpen(String),
    /// `(<Class>)` on a relationship line, emitted right after it
    Cast(String),
    /// `}`
    Close,
    /// Attribute name
    Attribute(String),
    /// `[`
    FilterStart,
    /// `]`
    FilterEnd,
    /// `(` inside a filter
    FilterOpenParen,
    /// `)` inside a filter
    FilterCloseParen,
    /// `<selector> <operator> <value>`
    BoolTerm(BoolTerm),
    /// `and` / `or`
    BinaryLogic(LogicOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::RootOpen(model) => write!(f, "`query {} {{`", model),
            Token::RelationshipOpen(name) => write!(f, "`{} {{`", name),
            Token::Cast(class) => write!(f, "cast `({})`", class),
            Token::Close => write!(f, "`}}`"),
            Token::Attribute(name) => write!(f, "attribute `{}`", name),
            Token::FilterStart => write!(f, "`[`"),
            Token::FilterEnd => write!(f, "`]`"),
            Token::FilterOpenParen => write!(f, "`(`"),
            Token::FilterCloseParen => write!(f, "`)`"),
            Token::BoolTerm(term) => write!(f, "`{}`", term),
            Token::BinaryLogic(op) => write!(f, "`{}`", op),
        }
    }
}

/// A token with the 1-based source line it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Character-level tokens of a filter expression
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
enum FilterToken {
    #[token("and")]
    And,

    #[token("or")]
    Or,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    // Selectors
    #[token("*")]
    Star,

    #[token("any")]
    Any,

    #[token("all")]
    All,

    // Operators
    #[token("==")]
    Eq,

    #[token("!=")]
    Ne,

    #[token(">")]
    Gt,

    #[token("<")]
    Lt,

    #[token(">=")]
    Ge,

    #[token("<=")]
    Le,

    #[token("in")]
    In,

    // Literals
    #[token("true")]
    True,

    #[token("false")]
    False,

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    StringDouble(String),

    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    StringSingle(String),

    /// Any other word; never valid, lexed only to report it whole
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Word,
}

/// Strip the quotes and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Lazily tokenize query text
pub fn tokenize(text: &str) -> Tokenizer<'_> {
    Tokenizer::new(text)
}

/// Forward-only token stream over query text
pub struct Tokenizer<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    pending: VecDeque<Spanned>,
    seen_root: bool,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            pending: VecDeque::new(),
            seen_root: false,
            failed: false,
        }
    }

    fn lex_line(&mut self, line: usize, text: &str) -> Result<()> {
        let mut push = |token: Token| self.pending.push_back(Spanned { token, line });

        if !self.seen_root {
            let caps = ROOT_OPEN.captures(text).ok_or_else(|| Error::MissingRoot {
                line,
                text: text.to_string(),
            })?;
            push(Token::RootOpen(caps[1].to_string()));
            self.seen_root = true;
            return Ok(());
        }

        if let Some(caps) = ROOT_OPEN.captures(text) {
            push(Token::RootOpen(caps[1].to_string()));
        } else if CLOSE.is_match(text) {
            push(Token::Close);
        } else if let Some(caps) = RELATIONSHIP_OPEN.captures(text) {
            push(Token::RelationshipOpen(caps[1].to_string()));
            if let Some(class) = caps.get(2) {
                push(Token::Cast(class.as_str().to_string()));
            }
        } else if let Some(caps) = ATTRIBUTE.captures(text) {
            push(Token::Attribute(caps[1].to_string()));
            if let Some(body) = caps.get(2) {
                for token in lex_filter(line, text, body.start(), body.as_str())? {
                    push(token);
                }
            }
        } else {
            return Err(Error::MalformedLine {
                line,
                text: text.to_string(),
            });
        }
        Ok(())
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Spanned>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.failed {
                return None;
            }
            let (idx, raw) = self.lines.next()?;
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            if let Err(e) = self.lex_line(idx + 1, text) {
                self.failed = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Build a `MalformedFilter` with a caret under byte `offset` of `text`
fn malformed(line: usize, text: &str, offset: usize, message: impl Into<String>) -> Error {
    let column = text.get(..offset).map_or(offset, |prefix| prefix.chars().count());
    Error::MalformedFilter {
        line,
        offset,
        message: message.into(),
        pointer: format!("{}\n{}^", text, " ".repeat(column)),
    }
}

/// Walks the raw filter tokens of one bracketed group
struct FilterScanner<'s> {
    line: usize,
    text: &'s str,
    base: usize,
    end: usize,
    raw: Vec<(FilterToken, Range<usize>)>,
    pos: usize,
}

impl FilterScanner<'_> {
    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        malformed(self.line, self.text, self.base + offset, message)
    }

    /// Offset of the current token, or the end of the group
    fn offset(&self) -> usize {
        self.raw.get(self.pos).map_or(self.end, |(_, span)| span.start)
    }

    fn next(&mut self) -> Option<FilterToken> {
        let token = self.raw.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn scalar(token: &FilterToken) -> Option<Literal> {
        match token {
            FilterToken::Integer(i) => Some(Literal::Integer(*i)),
            FilterToken::StringDouble(s) | FilterToken::StringSingle(s) => {
                Some(Literal::String(s.clone()))
            }
            FilterToken::True => Some(Literal::Boolean(true)),
            FilterToken::False => Some(Literal::Boolean(false)),
            _ => None,
        }
    }

    fn value(&mut self) -> Result<Literal> {
        let offset = self.offset();
        match self.next() {
            Some(FilterToken::LBracket) => self.list(offset),
            Some(token) => {
                Self::scalar(&token).ok_or_else(|| self.error(offset, "expected a value"))
            }
            None => Err(self.error(offset, "missing value")),
        }
    }

    fn list(&mut self, open: usize) -> Result<Literal> {
        let mut items: Vec<Literal> = Vec::new();
        loop {
            let offset = self.offset();
            match self.next() {
                Some(FilterToken::RBracket) if items.is_empty() => {
                    return Err(self.error(open, "empty list"));
                }
                Some(token) => {
                    let item = Self::scalar(&token)
                        .ok_or_else(|| self.error(offset, "expected a list element"))?;
                    if let (Some(first), Some(other)) = (
                        items.first().and_then(Literal::kind),
                        item.kind(),
                    ) {
                        if first != other {
                            return Err(Error::HeterogeneousList {
                                line: self.line,
                                first: first.to_string(),
                                other: other.to_string(),
                            });
                        }
                    }
                    items.push(item);
                }
                None => return Err(self.error(open, "unclosed list")),
            }

            let offset = self.offset();
            match self.next() {
                Some(FilterToken::Comma) => continue,
                Some(FilterToken::RBracket) => return Ok(Literal::List(items)),
                _ => return Err(self.error(offset, "expected `,` or `]`")),
            }
        }
    }

    fn term(&mut self, selector: Selector) -> Result<BoolTerm> {
        let offset = self.offset();
        let operator = match self.next() {
            Some(FilterToken::Eq) => Operator::Eq,
            Some(FilterToken::Ne) => Operator::Ne,
            Some(FilterToken::Gt) => Operator::Gt,
            Some(FilterToken::Lt) => Operator::Lt,
            Some(FilterToken::Ge) => Operator::Ge,
            Some(FilterToken::Le) => Operator::Le,
            Some(FilterToken::In) => Operator::In,
            _ => return Err(self.error(offset, "missing operator")),
        };
        let literal = self.value()?;

        if operator.takes_list() != literal.is_list() {
            return Err(Error::OperatorValueMismatch {
                line: self.line,
                operator: operator.to_string(),
                expected: if operator.takes_list() {
                    "a list value".to_string()
                } else {
                    "a scalar value".to_string()
                },
            });
        }
        if literal.kind() == Some(LiteralKind::Boolean) && operator != Operator::Eq {
            return Err(Error::BooleanOperator {
                line: self.line,
                operator: operator.to_string(),
            });
        }
        Ok(BoolTerm {
            selector,
            operator,
            literal,
        })
    }

    fn scan(mut self) -> Result<Vec<Token>> {
        let mut tokens = vec![Token::FilterStart];
        let mut expect_term = true;
        let mut depth = 0usize;

        while self.pos < self.raw.len() {
            let offset = self.offset();
            let Some(token) = self.next() else {
                break;
            };
            if expect_term {
                let selector = match token {
                    FilterToken::LParen => {
                        depth += 1;
                        tokens.push(Token::FilterOpenParen);
                        continue;
                    }
                    FilterToken::Star => Selector::Star,
                    FilterToken::Any => Selector::Any,
                    FilterToken::All => Selector::All,
                    _ => return Err(self.error(offset, "expected a selector or `(`")),
                };
                tokens.push(Token::BoolTerm(self.term(selector)?));
                expect_term = false;
            } else {
                match token {
                    FilterToken::RParen if depth > 0 => {
                        depth -= 1;
                        tokens.push(Token::FilterCloseParen);
                    }
                    FilterToken::RParen => return Err(self.error(offset, "unbalanced `)`")),
                    FilterToken::And => {
                        tokens.push(Token::BinaryLogic(LogicOp::And));
                        expect_term = true;
                    }
                    FilterToken::Or => {
                        tokens.push(Token::BinaryLogic(LogicOp::Or));
                        expect_term = true;
                    }
                    _ => return Err(self.error(offset, "expected `and`, `or` or `)`")),
                }
            }
        }

        if expect_term {
            return Err(self.error(self.end, "missing filter term"));
        }
        if depth > 0 {
            return Err(self.error(self.end, "unbalanced `(`"));
        }
        tokens.push(Token::FilterEnd);
        Ok(tokens)
    }
}

/// Lex the body of a bracketed filter starting at byte `base` of `text`
fn lex_filter(line: usize, text: &str, base: usize, body: &str) -> Result<Vec<Token>> {
    let mut raw = Vec::new();
    let mut lexer = FilterToken::lexer(body);
    while let Some(token) = lexer.next() {
        match token {
            Ok(FilterToken::Word) | Err(_) => {
                return Err(malformed(
                    line,
                    text,
                    base + lexer.span().start,
                    format!("unexpected `{}`", lexer.slice()),
                ));
            }
            Ok(token) => raw.push((token, lexer.span())),
        }
    }

    let tokens = FilterScanner {
        line,
        text,
        base,
        end: body.len(),
        raw,
        pos: 0,
    }
    .scan()?;
    validate_group(line, &tokens)?;
    Ok(tokens)
}

/// Selector kinds and literal types may not be mixed within one group
fn validate_group(line: usize, tokens: &[Token]) -> Result<()> {
    let terms: Vec<&BoolTerm> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::BoolTerm(term) => Some(term),
            _ => None,
        })
        .collect();

    let Some(first) = terms.first() else {
        return Ok(());
    };
    if terms
        .iter()
        .any(|t| t.selector.is_quantified() != first.selector.is_quantified())
    {
        return Err(Error::MixedSelectors { line });
    }

    let first_kind = first.literal.kind();
    for term in &terms[1..] {
        if let (Some(a), Some(b)) = (first_kind, term.literal.kind()) {
            if a != b {
                return Err(Error::MixedLiteralTypes {
                    line,
                    first: a.to_string(),
                    other: b.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Result<Vec<Token>> {
        tokenize(text).map(|r| r.map(|s| s.token)).collect()
    }

    fn term(selector: Selector, operator: Operator, literal: Literal) -> Token {
        Token::BoolTerm(BoolTerm {
            selector,
            operator,
            literal,
        })
    }

    #[test]
    fn test_line_tokens() {
        let tokens = lex("query Sample {\n  id\n  tubes (CryoTube) {\n    name\n  }\n}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::RootOpen("Sample".into()),
                Token::Attribute("id".into()),
                Token::RelationshipOpen("tubes".into()),
                Token::Cast("CryoTube".into()),
                Token::Attribute("name".into()),
                Token::Close,
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_line_numbers_skip_blank_lines() {
        let spanned: Vec<Spanned> = tokenize("\n\nquery Sample {\n\n  id\n}")
            .collect::<Result<_>>()
            .unwrap();
        let lines: Vec<usize> = spanned.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![3, 5, 6]);
    }

    #[test]
    fn test_missing_root() {
        let err = lex("\n  id\nquery Sample {").unwrap_err();
        assert!(matches!(err, Error::MissingRoot { line: 2, ref text } if text == "id"));
    }

    #[test]
    fn test_malformed_line() {
        let err = lex("query Sample {\n  id name\n}").unwrap_err();
        assert!(matches!(err, Error::MalformedLine { line: 2, ref text } if text == "id name"));
    }

    #[test]
    fn test_tokenizer_is_lazy() {
        let mut tokens = tokenize("query Sample {\n  id\n  ???\n}");
        assert!(matches!(tokens.next(), Some(Ok(_))));
        assert!(matches!(tokens.next(), Some(Ok(_))));
        assert!(matches!(tokens.next(), Some(Err(Error::MalformedLine { line: 3, .. }))));
        assert!(tokens.next().is_none());
    }

    #[test]
    fn test_filter_tokens() {
        let tokens = lex("query Sample {\n  type [any in ['a', \"b\"] or (all != 'c')]\n}").unwrap();
        assert_eq!(
            tokens[1..tokens.len() - 1],
            [
                Token::Attribute("type".into()),
                Token::FilterStart,
                term(
                    Selector::Any,
                    Operator::In,
                    Literal::List(vec![Literal::String("a".into()), Literal::String("b".into())])
                ),
                Token::BinaryLogic(LogicOp::Or),
                Token::FilterOpenParen,
                term(Selector::All, Operator::Ne, Literal::String("c".into())),
                Token::FilterCloseParen,
                Token::FilterEnd,
            ]
        );
    }

    #[test]
    fn test_filter_literals() {
        let tokens = lex("query Sample {\n  id [* >= -3]\n  flag [* == true]\n  name [* == 'it\\'s']\n}")
            .unwrap();
        assert!(tokens.contains(&term(Selector::Star, Operator::Ge, Literal::Integer(-3))));
        assert!(tokens.contains(&term(Selector::Star, Operator::Eq, Literal::Boolean(true))));
        assert!(tokens.contains(&term(
            Selector::Star,
            Operator::Eq,
            Literal::String("it's".into())
        )));
    }

    #[test]
    fn test_operator_value_mismatch() {
        let err = lex("query S {\n  id [* in 3]\n}").unwrap_err();
        assert!(matches!(err, Error::OperatorValueMismatch { line: 2, .. }));
        let err = lex("query S {\n  id [* == [1, 2]]\n}").unwrap_err();
        assert!(matches!(err, Error::OperatorValueMismatch { line: 2, .. }));
    }

    #[test]
    fn test_boolean_operator() {
        let err = lex("query S {\n  flag [* != false]\n}").unwrap_err();
        assert!(matches!(err, Error::BooleanOperator { line: 2, ref operator } if operator == "!="));
    }

    #[test]
    fn test_heterogeneous_list() {
        let err = lex("query S {\n  id [* in [1, 'a']]\n}").unwrap_err();
        assert!(matches!(
            err,
            Error::HeterogeneousList { line: 2, ref first, ref other } if first == "integer" && other == "string"
        ));
    }

    #[test]
    fn test_mixed_selectors() {
        let err = lex("query S {\n  id [* == 1 and any == 2]\n}").unwrap_err();
        assert!(matches!(err, Error::MixedSelectors { line: 2 }));
        assert!(lex("query S {\n  id [any == 1 or all == 2]\n}").is_ok());
    }

    #[test]
    fn test_mixed_literal_types() {
        let err = lex("query S {\n  id [any == 1 or any in ['a']]\n}").unwrap_err();
        assert!(matches!(err, Error::MixedLiteralTypes { line: 2, .. }));
    }

    #[test]
    fn test_malformed_filter_pointer() {
        let err = lex("query S {\n  id [* == 1 and]\n}").unwrap_err();
        let Error::MalformedFilter {
            line,
            offset,
            pointer,
            ..
        } = err
        else {
            panic!("expected MalformedFilter, got {:?}", err);
        };
        assert_eq!(line, 2);
        assert_eq!(offset, 14);
        assert_eq!(pointer, "id [* == 1 and]\n              ^");
    }

    #[test]
    fn test_malformed_filters() {
        for text in [
            "id [* == ]",
            "id [* 1]",
            "id [(* == 1]",
            "id [* == 1)]",
            "id [* in []]",
            "id [* == 1 xor * == 2]",
            "id [* == 1 & * == 2]",
            "id []",
        ] {
            let err = lex(&format!("query S {{\n{}\n}}", text)).unwrap_err();
            assert!(
                matches!(err, Error::MalformedFilter { line: 2, .. }),
                "{}: {:?}",
                text,
                err
            );
        }
    }
}
