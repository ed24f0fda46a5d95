//! Query factory: the per-request pipeline
//!
//! text -> tokens -> AST -> plan -> result graph -> JSON

use crate::ast::RootNode;
use crate::coercion::CoercionRegistry;
use crate::parser::parse;
use crate::planner::Planner;
use crate::serializer::serialize;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, field, info, info_span};
use treeql_core::Result;
use treeql_engine::{QueryPlan, RelationalEngine, ResultGraph};
use treeql_schema::SchemaRegistry;

/// Owns the schema and backing engine and runs whole queries
pub struct QueryFactory<E: RelationalEngine> {
    registry: Arc<SchemaRegistry>,
    engine: Arc<E>,
    coercions: Arc<CoercionRegistry>,
}

impl<E: RelationalEngine> Clone for QueryFactory<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            engine: Arc::clone(&self.engine),
            coercions: Arc::clone(&self.coercions),
        }
    }
}

impl<E: RelationalEngine> fmt::Debug for QueryFactory<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFactory")
            .field("models", &self.registry.len())
            .field("coercions", &self.coercions)
            .finish_non_exhaustive()
    }
}

impl<E: RelationalEngine> QueryFactory<E> {
    /// Create a factory with the default literal coercions
    pub fn new(registry: Arc<SchemaRegistry>, engine: Arc<E>) -> Self {
        Self {
            registry,
            engine,
            coercions: Arc::new(CoercionRegistry::default()),
        }
    }

    /// Builder: replace the literal coercions
    pub fn with_coercions(mut self, coercions: CoercionRegistry) -> Self {
        self.coercions = Arc::new(coercions);
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Tokenize and parse `text`
    pub fn parse(&self, text: &str) -> Result<RootNode> {
        parse(text, &self.registry)
    }

    /// Build the plan for a parsed query
    pub fn plan(&self, root: &RootNode) -> Result<QueryPlan> {
        Planner::new(&self.registry, &self.coercions).plan(root)
    }

    /// Parse, plan and execute `text`
    pub fn run(&self, text: &str) -> Result<ResultGraph> {
        let root = self.parse(text)?;
        let plan = self.plan(&root)?;
        plan.submit(self.engine.as_ref())
    }

    /// Run `text` and serialize the result into a JSON array
    pub fn parse_query(&self, text: &str) -> Result<Json> {
        let span = info_span!("query", root = field::Empty);
        let _enter = span.enter();
        let start = Instant::now();

        let root = self.parse(text)?;
        span.record("root", root.model.as_str());
        debug!("Parsed {} top-level members", root.children.len());

        let plan = self.plan(&root)?;
        debug!("Built plan with {} directives", plan.directives.len());

        let graph = plan.submit(self.engine.as_ref())?;
        debug!("Materialized {} objects", graph.len());

        let document = serialize(&graph)?;
        info!(
            "Query on {} returned {} roots in {:?}",
            root.model,
            graph.roots().len(),
            start.elapsed()
        );
        Ok(document)
    }
}
