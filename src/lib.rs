//! TreeQL - nested selection queries compiled to relational query plans
//!
//! This is the main library crate that re-exports all TreeQL components.

pub use treeql_core as core;
pub use treeql_engine as engine;
pub use treeql_query as query;
pub use treeql_schema as schema;
pub use treeql_server as server;

// Re-export commonly used types
pub use treeql_core::{Error, ErrorCategory, Result, Value};
pub use treeql_engine::{MemoryEngine, QueryPlan, RelationalEngine, ResultGraph, Row};
pub use treeql_query::{CoercionRegistry, QueryFactory, RootNode, parse, serialize, tokenize};
pub use treeql_schema::{
    AttributeType, Cardinality, JoinKeys, ModelDescriptor, SchemaBuilder, SchemaRegistry,
};
