//! Query plan building
//!
//! Walks a parsed query and emits, in child order:
//! - for every relationship block: one eager-load chain covering the path
//!   from the root, and one inner join of a freshly minted alias
//! - for every filtered attribute: one predicate
//!
//! Filter terms translate as follows (`r` is the enclosing relationship,
//! `p` the alias it hangs off):
//! - `* op v`   -> `alias.attr op v` (not allowed under a to-many `r`)
//! - `any op v` -> `EXISTS(p.r WHERE attr op v)`
//! - `all op v` -> `NOT EXISTS(p.r WHERE attr negated(op) v)`

use crate::ast::{AttributeNode, FilterExpr, FilterNode, LogicOp, Member, RelationshipNode, RootNode, Selector};
use crate::coercion::CoercionRegistry;
use tracing::debug;
use treeql_core::{Error, Result, Value};
use treeql_engine::{Alias, Column, Directive, EagerChain, Join, Predicate, QueryPlan};
use treeql_schema::{AttributeDescriptor, RelationshipDescriptor, SchemaRegistry};

/// Where in the query tree a member is being planned
struct Scope {
    /// Alias of the model the members belong to
    alias: Alias,

    /// Root-to-here eager-load chain
    chain: EagerChain,

    /// Nearest enclosing relationship and the alias it was reached from
    relationship: Option<(RelationshipDescriptor, Alias)>,
}

/// Builds a [`QueryPlan`] from a parsed query
pub struct Planner<'a> {
    registry: &'a SchemaRegistry,
    coercions: &'a CoercionRegistry,
    next_alias: usize,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a SchemaRegistry, coercions: &'a CoercionRegistry) -> Self {
        Self {
            registry,
            coercions,
            next_alias: 0,
        }
    }

    fn mint(&mut self, model: &str) -> Alias {
        let alias = Alias::new(model, self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Build the plan for `root`
    pub fn plan(mut self, root: &RootNode) -> Result<QueryPlan> {
        self.registry.get_model(&root.model)?;
        let alias = self.mint(&root.model);
        let mut plan = QueryPlan::new(&root.model, alias.clone());
        let scope = Scope {
            alias,
            chain: EagerChain::default(),
            relationship: None,
        };
        self.members(&mut plan, &scope, &root.children)?;
        debug!(
            "Planned query on {}: {} joins, {} filters",
            root.model,
            plan.joins().count(),
            plan.filters().count()
        );
        Ok(plan)
    }

    fn members(&mut self, plan: &mut QueryPlan, scope: &Scope, members: &[Member]) -> Result<()> {
        for member in members {
            match member {
                Member::Attribute(node) => self.attribute(plan, scope, node)?,
                Member::Relationship(node) => self.relationship(plan, scope, node)?,
            }
        }
        Ok(())
    }

    fn relationship(&mut self, plan: &mut QueryPlan, scope: &Scope, node: &RelationshipNode) -> Result<()> {
        let relationship = self
            .registry
            .get_relationship(&scope.alias.model, &node.relationship.name)?
            .clone();
        let alias = self.mint(&node.model);
        let chain = scope.chain.extended(&relationship.name, &alias);

        plan.push(Directive::EagerLoad(chain.clone()));
        plan.push(Directive::Join(Join {
            alias: alias.clone(),
            parent: scope.alias.clone(),
            relationship: relationship.clone(),
        }));

        // Quantified filters below a cast only range over the cast class
        let mut quantified = relationship;
        quantified.target = node.model.clone();

        let inner = Scope {
            alias,
            chain,
            relationship: Some((quantified, scope.alias.clone())),
        };
        self.members(plan, &inner, &node.children)
    }

    fn attribute(&mut self, plan: &mut QueryPlan, scope: &Scope, node: &AttributeNode) -> Result<()> {
        let attribute = self
            .registry
            .get_attribute(&scope.alias.model, &node.attribute.name)?;
        if let Some(filter) = &node.filter {
            let predicate = self.filter(scope, attribute, filter)?;
            plan.push(Directive::Filter(predicate));
        }
        Ok(())
    }

    fn filter(&self, scope: &Scope, attribute: &AttributeDescriptor, expr: &FilterExpr) -> Result<Predicate> {
        match expr {
            FilterExpr::BinaryLogic { op, left, right } => {
                let left = self.filter(scope, attribute, left)?;
                let right = self.filter(scope, attribute, right)?;
                Ok(match op {
                    LogicOp::And => Predicate::and(left, right),
                    LogicOp::Or => Predicate::or(left, right),
                })
            }
            FilterExpr::Filter(term) => self.term(scope, attribute, term),
        }
    }

    fn literal(&self, attribute: &AttributeDescriptor, term: &FilterNode) -> Result<Value> {
        let value = self.coercions.coerce(attribute, &term.literal.to_value())?;
        if !attribute.ty.accepts(&value) {
            let found = match &value {
                Value::List(items) => items.first().map_or("list", Value::type_name),
                other => other.type_name(),
            };
            return Err(Error::TypeMismatch {
                attribute: format!("{}.{}", attribute.model, attribute.name),
                expected: attribute.ty.key().to_string(),
                found: found.to_string(),
            });
        }
        Ok(value)
    }

    fn term(&self, scope: &Scope, attribute: &AttributeDescriptor, term: &FilterNode) -> Result<Predicate> {
        let value = self.literal(attribute, term)?;
        let op = term.operator.compare_op();

        match term.selector {
            Selector::Star => {
                if let Some((relationship, _)) = &scope.relationship {
                    if relationship.is_many() {
                        return Err(Error::InvalidQuantifier {
                            selector: term.selector.to_string(),
                            context: format!("to-many relationship `{}`", relationship.name),
                        });
                    }
                }
                Ok(Predicate::Compare {
                    column: Column::Aliased {
                        alias: scope.alias.clone(),
                        attribute: attribute.name.clone(),
                    },
                    op,
                    value,
                })
            }
            Selector::Any | Selector::All => {
                let (relationship, parent) = match &scope.relationship {
                    Some((relationship, parent)) if relationship.is_many() => (relationship, parent),
                    Some((relationship, _)) => {
                        return Err(Error::InvalidQuantifier {
                            selector: term.selector.to_string(),
                            context: format!("singular relationship `{}`", relationship.name),
                        });
                    }
                    None => {
                        return Err(Error::InvalidQuantifier {
                            selector: term.selector.to_string(),
                            context: format!("root model `{}`", scope.alias.model),
                        });
                    }
                };
                let quantified = term.selector == Selector::All;
                let exists = Predicate::Exists {
                    parent: parent.clone(),
                    relationship: relationship.clone(),
                    predicate: Box::new(Predicate::Compare {
                        column: Column::Related {
                            attribute: attribute.name.clone(),
                        },
                        op: if quantified { op.negate() } else { op },
                        value,
                    }),
                };
                Ok(if quantified { Predicate::not(exists) } else { exists })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use treeql_engine::CompareOp;
    use treeql_schema::{AttributeType, JoinKeys, ModelDescriptor};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .model(
                ModelDescriptor::new("Sample")
                    .primary_key("id")
                    .attribute("name", AttributeType::String)
                    .attribute("date", AttributeType::Date)
                    .attribute("tube_id", AttributeType::Integer)
                    .has_one("tube", "Tube", JoinKeys::new("tube_id", "id"))
                    .has_many("tubes", "Tube", JoinKeys::new("id", "sample_id")),
            )
            .model(
                ModelDescriptor::new("Tube")
                    .primary_key("id")
                    .attribute("type", AttributeType::String)
                    .attribute("sample_id", AttributeType::Integer)
                    .attribute("self_tube_id", AttributeType::Integer)
                    .has_one("self_tube", "Tube", JoinKeys::new("self_tube_id", "id")),
            )
            .model(
                ModelDescriptor::new("CryoTube")
                    .variant_of("Tube")
                    .attribute("temperature", AttributeType::Integer),
            )
            .build()
            .unwrap()
    }

    fn plan(text: &str) -> Result<QueryPlan> {
        let registry = registry();
        let coercions = CoercionRegistry::default();
        let root = parse(text, &registry)?;
        Planner::new(&registry, &coercions).plan(&root)
    }

    #[test]
    fn test_root_only_plan() {
        let plan = plan("query Sample {\n  id\n  name\n}").unwrap();
        assert_eq!(plan.root_alias, Alias::new("Sample", 0));
        assert!(plan.directives.is_empty());
    }

    #[test]
    fn test_relationship_emits_chain_and_join() {
        let plan = plan("query Sample {\n  tube {\n    self_tube {\n      type\n    }\n  }\n}").unwrap();
        let joins: Vec<&Join> = plan.joins().collect();
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].alias, Alias::new("Tube", 1));
        assert_eq!(joins[0].parent, Alias::new("Sample", 0));
        // Self join gets its own alias
        assert_eq!(joins[1].alias, Alias::new("Tube", 2));
        assert_eq!(joins[1].parent, Alias::new("Tube", 1));

        let chains: Vec<&EagerChain> = plan.eager_loads().collect();
        assert_eq!(chains[0].len(), 1);
        assert_eq!(chains[1].len(), 2);
        assert_eq!(chains[1].steps()[1].relationship, "self_tube");
        assert_eq!(chains[1].last_alias(), Some(&Alias::new("Tube", 2)));
    }

    #[test]
    fn test_star_filter_compares_alias_column() {
        let plan = plan("query Sample {\n  tube {\n    type [* == 'a']\n  }\n}").unwrap();
        let filters: Vec<&Predicate> = plan.filters().collect();
        assert_eq!(
            filters,
            vec![&Predicate::Compare {
                column: Column::Aliased {
                    alias: Alias::new("Tube", 1),
                    attribute: "type".into(),
                },
                op: CompareOp::Eq,
                value: Value::from("a"),
            }]
        );
    }

    #[test]
    fn test_all_negates_operator() {
        let plan = plan("query Sample {\n  tubes {\n    type [all in ['a', 'b']]\n  }\n}").unwrap();
        let Some(Predicate::Not(inner)) = plan.filters().next() else {
            panic!("expected NOT EXISTS");
        };
        let Predicate::Exists {
            parent,
            relationship,
            predicate,
        } = inner.as_ref()
        else {
            panic!("expected EXISTS");
        };
        assert_eq!(parent, &Alias::new("Sample", 0));
        assert_eq!(relationship.name, "tubes");
        assert!(matches!(
            predicate.as_ref(),
            Predicate::Compare { op: CompareOp::NotIn, column: Column::Related { .. }, .. }
        ));
    }

    #[test]
    fn test_any_keeps_operator() {
        let plan = plan("query Sample {\n  tubes {\n    type [any > 'a' or any == 'c']\n  }\n}").unwrap();
        let Some(Predicate::Or(left, right)) = plan.filters().next() else {
            panic!("expected OR");
        };
        for (side, expected) in [(left, CompareOp::Gt), (right, CompareOp::Eq)] {
            let Predicate::Exists { predicate, .. } = side.as_ref() else {
                panic!("expected EXISTS");
            };
            assert!(matches!(predicate.as_ref(), Predicate::Compare { op, .. } if *op == expected));
        }
    }

    #[test]
    fn test_quantifier_legality() {
        assert!(matches!(
            plan("query Sample {\n  tubes {\n    type [* == 'a']\n  }\n}"),
            Err(Error::InvalidQuantifier { selector, .. }) if selector == "*"
        ));
        assert!(matches!(
            plan("query Sample {\n  tube {\n    type [any == 'a']\n  }\n}"),
            Err(Error::InvalidQuantifier { selector, .. }) if selector == "any"
        ));
        assert!(matches!(
            plan("query Sample {\n  name [all == 'a']\n}"),
            Err(Error::InvalidQuantifier { selector, .. }) if selector == "all"
        ));
        assert!(plan("query Sample {\n  name [* == 'a']\n}").is_ok());
    }

    #[test]
    fn test_literal_coercion_and_type_check() {
        let planned = plan("query Sample {\n  date [* > '2017-01-01']\n}").unwrap();
        assert!(matches!(
            planned.filters().next(),
            Some(Predicate::Compare { value: Value::Date(_), .. })
        ));

        assert!(matches!(
            plan("query Sample {\n  name [* == 3]\n}"),
            Err(Error::TypeMismatch { expected, found, .. }) if expected == "string" && found == "integer"
        ));
        assert!(matches!(
            plan("query Sample {\n  date [* == 'yesterday']\n}"),
            Err(Error::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_cast_narrows_quantified_target() {
        let plan = plan("query Sample {\n  tubes (CryoTube) {\n    temperature [any < -20]\n  }\n}").unwrap();
        let join = plan.joins().next().unwrap();
        assert_eq!(join.alias.model, "CryoTube");
        assert_eq!(join.relationship.target, "Tube");
        let Some(Predicate::Exists { relationship, .. }) = plan.filters().next() else {
            panic!("expected EXISTS");
        };
        assert_eq!(relationship.target, "CryoTube");
    }
}
