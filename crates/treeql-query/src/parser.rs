//! Recursive-descent TreeQL parser
//!
//! Grammar:
//!
//! ```text
//! Query        := RootOpen Body Close
//! Body         := (Attribute | Relationship)*
//! Relationship := RelOpen [Cast] Body Close
//! Attribute    := AttrToken [FilterExpr]
//! FilterExpr   := FilterStart BoolExpr FilterEnd
//! BoolExpr     := Term [BinaryLogic BoolExpr]
//! Term         := BoolTerm | '(' BoolExpr ')'
//! ```
//!
//! `BoolExpr` is right-recursive, so `a and b or c` groups as
//! `a and (b or c)`. Parentheses override the grouping.

use crate::ast::{AttributeNode, FilterExpr, Member, RelationshipNode, RootNode};
use crate::lexer::{Spanned, Token, tokenize};
use std::iter::Peekable;
use tracing::debug;
use treeql_core::{Error, Result};
use treeql_schema::SchemaRegistry;

/// Tokenize and parse `text` against `registry`
pub fn parse(text: &str, registry: &SchemaRegistry) -> Result<RootNode> {
    Parser::new(tokenize(text), registry).parse_query()
}

/// Parser over any token stream
pub struct Parser<'r, I: Iterator<Item = Result<Spanned>>> {
    tokens: Peekable<I>,
    registry: &'r SchemaRegistry,
}

impl<'r, I: Iterator<Item = Result<Spanned>>> Parser<'r, I> {
    pub fn new(tokens: I, registry: &'r SchemaRegistry) -> Self {
        Self {
            tokens: tokens.peekable(),
            registry,
        }
    }

    /// Look at the next token without consuming it
    fn peek(&mut self) -> Result<Option<&Token>> {
        if matches!(self.tokens.peek(), Some(Err(_))) {
            if let Some(Err(e)) = self.tokens.next() {
                return Err(e);
            }
        }
        Ok(self
            .tokens
            .peek()
            .and_then(|r| r.as_ref().ok())
            .map(|s| &s.token))
    }

    /// Consume the next token
    fn advance(&mut self) -> Result<Option<Spanned>> {
        self.tokens.next().transpose()
    }

    /// Consume the next token, failing at end of input
    fn take(&mut self, expected: &str) -> Result<Spanned> {
        self.advance()?.ok_or_else(|| Error::UnexpectedEnd {
            expected: expected.to_string(),
        })
    }

    fn unexpected(spanned: Spanned, expected: &str) -> Error {
        Error::UnexpectedToken {
            line: spanned.line,
            expected: expected.to_string(),
            found: spanned.token.to_string(),
        }
    }

    /// Parse a whole query; no token may follow the root block
    pub fn parse_query(mut self) -> Result<RootNode> {
        let first = self.take("`query <Model> {`")?;
        let model = match first.token {
            Token::RootOpen(model) => model,
            _ => return Err(Self::unexpected(first, "`query <Model> {`")),
        };
        self.registry.get_model(&model)?;

        let children = self.parse_body(&model)?;
        if let Some(extra) = self.advance()? {
            return Err(Self::unexpected(extra, "end of query"));
        }

        debug!("Parsed query on {} with {} members", model, children.len());
        Ok(RootNode { model, children })
    }

    /// Members up to and including the block's Close
    fn parse_body(&mut self, model: &str) -> Result<Vec<Member>> {
        let mut children = Vec::new();
        loop {
            let Some(spanned) = self.advance()? else {
                return Err(Error::UnterminatedBlock {
                    model: model.to_string(),
                });
            };
            match spanned.token {
                Token::Close => return Ok(children),
                Token::Attribute(name) => {
                    children.push(Member::Attribute(self.parse_attribute(model, &name)?));
                }
                Token::RelationshipOpen(name) => {
                    children.push(Member::Relationship(self.parse_relationship(model, &name)?));
                }
                _ => {
                    return Err(Self::unexpected(
                        spanned,
                        "an attribute, a relationship or `}`",
                    ));
                }
            }
        }
    }

    fn parse_relationship(&mut self, model: &str, name: &str) -> Result<RelationshipNode> {
        let relationship = self.registry.get_relationship(model, name)?.clone();
        let target = self.registry.get_target_model(model, name)?.name.clone();

        let mut resolved = target.clone();
        if let Some(Token::Cast(_)) = self.peek()? {
            if let Some(Spanned {
                token: Token::Cast(cast),
                ..
            }) = self.advance()?
            {
                self.registry.get_model(&cast)?;
                if !self.registry.is_variant_of(&cast, &target) {
                    return Err(Error::InvalidCast {
                        relationship: format!("{}.{}", model, name),
                        target,
                        cast,
                    });
                }
                resolved = cast;
            }
        }

        let children = self.parse_body(&resolved)?;
        Ok(RelationshipNode {
            relationship,
            model: resolved,
            children,
        })
    }

    fn parse_attribute(&mut self, model: &str, name: &str) -> Result<AttributeNode> {
        let attribute = self.registry.get_attribute(model, name)?.clone();
        let filter = match self.peek()? {
            Some(Token::FilterStart) => {
                self.advance()?;
                let expr = self.parse_bool_expr()?;
                let end = self.take("`]`")?;
                if end.token != Token::FilterEnd {
                    return Err(Self::unexpected(end, "`]`"));
                }
                Some(expr)
            }
            _ => None,
        };
        Ok(AttributeNode { attribute, filter })
    }

    fn parse_bool_expr(&mut self) -> Result<FilterExpr> {
        let left = self.parse_term()?;
        match self.peek()? {
            Some(Token::BinaryLogic(op)) => {
                let op = *op;
                self.advance()?;
                let right = self.parse_bool_expr()?;
                Ok(FilterExpr::binary(op, left, right))
            }
            _ => Ok(left),
        }
    }

    fn parse_term(&mut self) -> Result<FilterExpr> {
        let spanned = self.take("a filter term")?;
        match spanned.token {
            Token::BoolTerm(term) => Ok(FilterExpr::Filter(term)),
            Token::FilterOpenParen => {
                let inner = self.parse_bool_expr()?;
                let close = self.take("`)`")?;
                if close.token != Token::FilterCloseParen {
                    return Err(Self::unexpected(close, "`)`"));
                }
                Ok(inner)
            }
            _ => Err(Self::unexpected(spanned, "a filter term or `(`")),
        }
    }
}
