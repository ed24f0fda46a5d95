//! Query plan vocabulary
//!
//! A [`QueryPlan`] is the evaluator's output: the root model, its alias, and
//! the ordered directives (joins, eager-load chains, filters) to hand to a
//! [`RelationalEngine`].

use crate::engine::RelationalEngine;
use crate::graph::ResultGraph;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use treeql_core::{Result, Value};
use treeql_schema::RelationshipDescriptor;

/// A uniquely named reference to a model within one plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Alias {
    /// Aliased model
    pub model: String,

    /// Per-plan unique index
    pub index: usize,
}

impl Alias {
    pub fn new(model: &str, index: usize) -> Self {
        Self {
            model: model.to_string(),
            index,
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.model, self.index)
    }
}

/// Comparison operators understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
}

impl CompareOp {
    /// The operator whose result is the logical negation of this one.
    /// Applying it twice yields the original operator.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::In => CompareOp::NotIn,
            CompareOp::NotIn => CompareOp::In,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        };
        write!(f, "{}", s)
    }
}

/// Column operand of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// Attribute of an aliased model of the outer query
    Aliased { alias: Alias, attribute: String },
    /// Attribute of the row bound by the innermost enclosing `Exists`
    Related { attribute: String },
}

/// Predicate tree handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        column: Column,
        op: CompareOp,
        value: Value,
    },
    /// True when some row related to `parent` through `relationship`
    /// satisfies `predicate`
    Exists {
        parent: Alias,
        relationship: RelationshipDescriptor,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    pub fn and(left: Predicate, right: Predicate) -> Self {
        Predicate::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Predicate, right: Predicate) -> Self {
        Predicate::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }
}

/// Inner join of `alias` through `parent.relationship`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub alias: Alias,
    pub parent: Alias,
    pub relationship: RelationshipDescriptor,
}

/// One hop of an eager-load chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerStep {
    /// Relationship name on the previous hop's model
    pub relationship: String,

    /// Joined alias whose rows populate the relationship
    pub alias: Alias,
}

/// Root-to-leaf eager-load directive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerChain(pub Vec<EagerStep>);

impl EagerChain {
    /// Return a new chain extended by one hop
    pub fn extended(&self, relationship: &str, alias: &Alias) -> Self {
        let mut steps = self.0.clone();
        steps.push(EagerStep {
            relationship: relationship.to_string(),
            alias: alias.clone(),
        });
        Self(steps)
    }

    pub fn steps(&self) -> &[EagerStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Alias of the last hop
    pub fn last_alias(&self) -> Option<&Alias> {
        self.0.last().map(|step| &step.alias)
    }
}

/// A directive in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    Join(Join),
    EagerLoad(EagerChain),
    Filter(Predicate),
}

/// Evaluator output, submitted once to a backing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Root model name
    pub root_model: String,

    /// Alias of the root model
    pub root_alias: Alias,

    /// Directives in the order they were emitted
    pub directives: Vec<Directive>,
}

impl QueryPlan {
    /// Start a plan with no directives; relationships stay lazy unless an
    /// eager-load chain names them
    pub fn new(root_model: &str, root_alias: Alias) -> Self {
        Self {
            root_model: root_model.to_string(),
            root_alias,
            directives: Vec::new(),
        }
    }

    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    /// Joins in emission order
    pub fn joins(&self) -> impl Iterator<Item = &Join> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Join(join) => Some(join),
            _ => None,
        })
    }

    /// Eager-load chains in emission order
    pub fn eager_loads(&self) -> impl Iterator<Item = &EagerChain> {
        self.directives.iter().filter_map(|d| match d {
            Directive::EagerLoad(chain) => Some(chain),
            _ => None,
        })
    }

    /// Filters in emission order
    pub fn filters(&self) -> impl Iterator<Item = &Predicate> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Filter(predicate) => Some(predicate),
            _ => None,
        })
    }

    /// Build the engine query, apply every directive in order and execute once
    pub fn submit<E: RelationalEngine + ?Sized>(&self, engine: &E) -> Result<ResultGraph> {
        let mut query = engine.begin(&self.root_model, &self.root_alias)?;
        for directive in &self.directives {
            match directive {
                Directive::Join(join) => engine.join(&mut query, join)?,
                Directive::EagerLoad(chain) => engine.eager_load(&mut query, chain)?,
                Directive::Filter(predicate) => engine.filter(&mut query, predicate)?,
            }
        }
        debug!(
            "Submitting plan on {} with {} directives",
            self.root_alias,
            self.directives.len()
        );
        engine.execute(query)
    }
}
