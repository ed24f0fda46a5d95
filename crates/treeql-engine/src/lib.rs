//! TreeQL Backing Engine
//!
//! The narrow interface TreeQL uses to talk to a relational engine, plus an
//! in-memory engine that implements it.
//!
//! # Overview
//!
//! - `plan` - Aliases, predicate trees, eager-load chains and the query plan
//! - `engine` - The [`RelationalEngine`] trait
//! - `graph` - The materialized, possibly cyclic result object graph
//! - `memory` - In-memory tables with inner-join / `EXISTS` semantics

pub mod engine;
pub mod graph;
pub mod memory;
pub mod plan;

pub use engine::RelationalEngine;
pub use graph::{Field, Object, ObjectKey, ObjectState, Related, ResultGraph};
pub use memory::{MemoryEngine, Row};
pub use plan::{Alias, Column, CompareOp, Directive, EagerChain, EagerStep, Join, Predicate, QueryPlan};
