//! Read-only registry of model descriptors

use crate::model::{AttributeDescriptor, ModelDescriptor, RelationshipDescriptor};
use std::collections::HashMap;
use tracing::debug;
use treeql_core::{Error, Result};

/// Registry of all models a query can reference.
///
/// Built once through [`SchemaBuilder`]; immutable afterwards, so it can be
/// shared across request handlers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    /// Models by name, with inherited members already merged in
    models: HashMap<String, ModelDescriptor>,

    /// (declaring model, relationship name) -> target model name
    targets: HashMap<(String, String), String>,
}

impl SchemaRegistry {
    /// Start building a registry
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Get a model by name
    pub fn get_model(&self, name: &str) -> Result<&ModelDescriptor> {
        self.models
            .get(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Get the model a relationship of `model` points at
    pub fn get_target_model(&self, model: &str, relationship: &str) -> Result<&ModelDescriptor> {
        let target = self
            .targets
            .get(&(model.to_string(), relationship.to_string()))
            .ok_or_else(|| Error::UnknownRelationship {
                model: model.to_string(),
                relationship: relationship.to_string(),
            })?;
        self.get_model(target)
    }

    /// Get a relationship declared on (or inherited by) `model`
    pub fn get_relationship(&self, model: &str, relationship: &str) -> Result<&RelationshipDescriptor> {
        self.get_model(model)?
            .relationship_named(relationship)
            .ok_or_else(|| Error::UnknownRelationship {
                model: model.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// Get an attribute declared on (or inherited by) `model`
    pub fn get_attribute(&self, model: &str, attribute: &str) -> Result<&AttributeDescriptor> {
        self.get_model(model)?
            .attribute_named(attribute)
            .ok_or_else(|| Error::UnknownAttribute {
                model: model.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// The model itself followed by all of its transitive variants
    pub fn variants_of(&self, model: &str) -> Result<Vec<&str>> {
        let root = self.get_model(model)?;
        let mut out = vec![root.name.as_str()];
        let mut idx = 0;
        while idx < out.len() {
            let current = self.get_model(out[idx])?;
            out.extend(current.variants.iter().map(String::as_str));
            idx += 1;
        }
        Ok(out)
    }

    /// Returns true if `candidate` is `base` or one of its variants
    pub fn is_variant_of(&self, candidate: &str, base: &str) -> bool {
        let mut current = self.models.get(candidate);
        while let Some(model) = current {
            if model.name == base {
                return true;
            }
            current = model.parent.as_ref().and_then(|p| self.models.get(p));
        }
        false
    }

    /// Iterate over all models
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Number of registered models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Collects model descriptors and validates them into a [`SchemaRegistry`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: Vec<ModelDescriptor>,
}

impl SchemaBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a model
    pub fn model(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    /// Builder: add several models
    pub fn models<I: IntoIterator<Item = ModelDescriptor>>(mut self, models: I) -> Self {
        self.models.extend(models);
        self
    }

    /// Validate and freeze the schema
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut pending: HashMap<String, ModelDescriptor> = HashMap::new();
        for model in self.models {
            if pending.contains_key(&model.name) {
                return Err(Error::Schema(format!("duplicate model `{}`", model.name)));
            }
            pending.insert(model.name.clone(), model);
        }

        for model in pending.values() {
            if let Some(parent) = &model.parent {
                if !pending.contains_key(parent) {
                    return Err(Error::Schema(format!(
                        "model `{}` is a variant of unknown model `{}`",
                        model.name, parent
                    )));
                }
            }
            for rel in model.relationships.values() {
                if !pending.contains_key(&rel.target) {
                    return Err(Error::Schema(format!(
                        "relationship `{}.{}` targets unknown model `{}`",
                        model.name, rel.name, rel.target
                    )));
                }
            }
        }

        // Resolve inheritance parents-first; a round without progress means a cycle
        let mut models: HashMap<String, ModelDescriptor> = HashMap::new();
        while !pending.is_empty() {
            let ready: Vec<String> = pending
                .values()
                .filter(|m| m.parent.as_ref().is_none_or(|p| models.contains_key(p)))
                .map(|m| m.name.clone())
                .collect();
            if ready.is_empty() {
                return Err(Error::Schema("cyclic polymorphic inheritance".to_string()));
            }
            for name in ready {
                let Some(mut model) = pending.remove(&name) else {
                    continue;
                };
                if let Some(parent) = model.parent.as_ref().and_then(|p| models.get(p)) {
                    inherit(&mut model, parent);
                }
                models.insert(name, model);
            }
        }

        let children: Vec<(String, String)> = models
            .values()
            .filter_map(|m| m.parent.clone().map(|p| (p, m.name.clone())))
            .collect();
        for (parent, child) in children {
            if let Some(parent) = models.get_mut(&parent) {
                parent.variants.insert(child);
            }
        }

        let targets = models
            .values()
            .flat_map(|m| {
                m.relationships
                    .values()
                    .map(move |rel| ((m.name.clone(), rel.name.clone()), rel.target.clone()))
            })
            .collect();

        debug!("Built schema registry with {} models", models.len());
        Ok(SchemaRegistry { models, targets })
    }
}

/// Copy members a variant does not override from its parent
fn inherit(model: &mut ModelDescriptor, parent: &ModelDescriptor) {
    if model.primary_key.is_empty() {
        model.primary_key = parent.primary_key.clone();
    }
    for (name, attr) in &parent.attributes {
        model
            .attributes
            .entry(name.clone())
            .or_insert_with(|| attr.clone());
    }
    for (name, rel) in &parent.relationships {
        model
            .relationships
            .entry(name.clone())
            .or_insert_with(|| rel.clone());
    }
}
