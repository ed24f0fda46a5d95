//! Backing relational engine interface

use crate::graph::ResultGraph;
use crate::plan::{Alias, EagerChain, Join, Predicate};
use treeql_core::Result;

/// The narrow interface TreeQL needs from a relational engine.
///
/// A query is started with [`begin`](Self::begin), refined by joins,
/// eager-load chains and filters, and executed exactly once. Every
/// relationship not named by an eager-load chain stays deferred in the
/// result graph.
pub trait RelationalEngine: Send + Sync {
    /// Engine-specific query under construction
    type Query;

    /// Start a query over `model`, addressed as `alias`
    fn begin(&self, model: &str, alias: &Alias) -> Result<Self::Query>;

    /// Inner-join `join.alias` through `join.parent.relationship`
    fn join(&self, query: &mut Self::Query, join: &Join) -> Result<()>;

    /// Populate every relationship along `chain` from its joined alias
    fn eager_load(&self, query: &mut Self::Query, chain: &EagerChain) -> Result<()>;

    /// Restrict the result to rows satisfying `predicate`
    fn filter(&self, query: &mut Self::Query, predicate: &Predicate) -> Result<()>;

    /// Run the query to completion
    fn execute(&self, query: Self::Query) -> Result<ResultGraph>;
}
