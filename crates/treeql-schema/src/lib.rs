//! TreeQL Schema Registry
//!
//! Describes the object-relational schema a query is resolved against.
//!
//! # Overview
//!
//! The schema crate provides:
//! - Typed model, attribute and relationship descriptors
//! - A registry built once at startup and shared read-only afterwards
//! - Polymorphic variant tracking with attribute inheritance

pub mod model;
pub mod registry;

pub use model::{
    AttributeDescriptor, AttributeType, Cardinality, JoinKeys, ModelDescriptor,
    RelationshipDescriptor,
};
pub use registry::{SchemaBuilder, SchemaRegistry};
