//! Abstract Syntax Tree for a TreeQL query
//!
//! Identifiers are resolved against the schema while parsing, so every node
//! carries the descriptor it refers to rather than a bare name.

use serde::{Deserialize, Serialize};
use std::fmt;
use treeql_core::Value;
use treeql_engine::CompareOp;
use treeql_schema::{AttributeDescriptor, RelationshipDescriptor};

/// Subject of a filter term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// `*`: the attribute value itself
    Star,
    /// `any`: some related row satisfies the term
    Any,
    /// `all`: every related row satisfies the term
    All,
}

impl Selector {
    /// Whether the selector quantifies over a to-many relationship
    pub fn is_quantified(self) -> bool {
        !matches!(self, Selector::Star)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Selector::Star => "*",
            Selector::Any => "any",
            Selector::All => "all",
        };
        write!(f, "{}", s)
    }
}

/// Comparison operator of a filter term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
}

impl Operator {
    /// Engine comparison for this operator
    pub fn compare_op(self) -> CompareOp {
        match self {
            Operator::Eq => CompareOp::Eq,
            Operator::Ne => CompareOp::Ne,
            Operator::Gt => CompareOp::Gt,
            Operator::Lt => CompareOp::Lt,
            Operator::Ge => CompareOp::Ge,
            Operator::Le => CompareOp::Le,
            Operator::In => CompareOp::In,
        }
    }

    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compare_op())
    }
}

/// `and` / `or`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicOp::And => write!(f, "and"),
            LogicOp::Or => write!(f, "or"),
        }
    }
}

/// Type of a literal (a list has the type of its elements)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    String,
    Integer,
    Boolean,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LiteralKind::String => "string",
            LiteralKind::Integer => "integer",
            LiteralKind::Boolean => "boolean",
        };
        write!(f, "{}", s)
    }
}

/// Literal value as written in the query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Boolean(bool),
    List(Vec<Literal>),
}

impl Literal {
    /// Type of the literal; `None` for an empty list
    pub fn kind(&self) -> Option<LiteralKind> {
        match self {
            Literal::String(_) => Some(LiteralKind::String),
            Literal::Integer(_) => Some(LiteralKind::Integer),
            Literal::Boolean(_) => Some(LiteralKind::Boolean),
            Literal::List(items) => items.first().and_then(Literal::kind),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Literal::List(_))
    }

    /// Uncoerced value of the literal
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::List(items) => Value::List(items.iter().map(Literal::to_value).collect()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// `<selector> <operator> <value>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoolTerm {
    pub selector: Selector,
    pub operator: Operator,
    pub literal: Literal,
}

impl fmt::Display for BoolTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.selector, self.operator, self.literal)
    }
}

/// A filter leaf
pub type FilterNode = BoolTerm;

/// Filter expression attached to an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    Filter(FilterNode),
    BinaryLogic {
        op: LogicOp,
        left: Box<FilterExpr>,
        right: Box<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn binary(op: LogicOp, left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::BinaryLogic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Attribute selection, optionally filtered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeNode {
    pub attribute: AttributeDescriptor,
    pub filter: Option<FilterExpr>,
}

/// Nested relationship selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipNode {
    pub relationship: RelationshipDescriptor,

    /// Model the children are resolved against: the cast class when one was
    /// given, else the relationship target
    pub model: String,

    pub children: Vec<Member>,
}

impl RelationshipNode {
    /// Cast class, if the relationship was narrowed to a variant
    pub fn cast(&self) -> Option<&str> {
        (self.model != self.relationship.target).then_some(self.model.as_str())
    }
}

/// Child of a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Member {
    Attribute(AttributeNode),
    Relationship(RelationshipNode),
}

/// The `query <Model> { ... }` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    pub model: String,
    pub children: Vec<Member>,
}
