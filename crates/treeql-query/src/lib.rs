//! TreeQL Query Engine
//!
//! Compiles TreeQL query text into a relational query plan, runs it on a
//! backing engine and serializes the result graph.
//!
//! # Overview
//!
//! The pipeline is:
//! - `lexer` - Line-level tokenizer with a logos filter sub-lexer
//! - `parser` - Recursive-descent parser resolving names against the schema
//! - `planner` - Alias-tracking plan builder (joins, eager loads, predicates)
//! - `coercion` - Literal coercion keyed by declared attribute type
//! - `serializer` - Cycle-safe result graph to JSON conversion
//! - `executor` - The [`QueryFactory`] running the whole pipeline

pub mod ast;
pub mod coercion;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod planner;
pub mod serializer;

pub use ast::{
    AttributeNode, BoolTerm, FilterExpr, FilterNode, Literal, LiteralKind, LogicOp, Member, Operator,
    RelationshipNode, RootNode, Selector,
};
pub use coercion::{Coercer, CoercionRegistry};
pub use executor::QueryFactory;
pub use lexer::{Spanned, Token, Tokenizer, tokenize};
pub use parser::{Parser, parse};
pub use planner::Planner;
pub use serializer::{IdentityKey, serialize};
