//! Query tree → engine query DSL
//!
//! # Translation rules
//!
//! ```text
//! MatchAll / empty group        → {"match_all": {}}
//! Boolean group                 → {"bool": {must, must_not, should}}
//!   nested group                → clauses flattened into the same bool
//!   empty nested group          → skipped
//! Wildcard on exact field       → {"wildcard": {"<raw path>": {"value": pattern}}}
//! Wildcard on analyzed field    → {"query_string": {"query": "field:pattern"}}
//! Opaque                        → {"query_string": {"query": text}}
//! ```
//!
//! Wildcards cannot be evaluated against the analyzed representation, so
//! patterns on analyzed fields degrade to free-text query strings.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::query::{Clause, Occur, QueryNode};
use crate::error::{BridgeError, Result};
use crate::schema::{IndexDescriptor, SchemaResolver};

/// Engine-side query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetQuery {
    MatchAll,
    Bool {
        must: Vec<TargetQuery>,
        must_not: Vec<TargetQuery>,
        should: Vec<TargetQuery>,
    },
    Wildcard { field: String, pattern: String },
    QueryString { query: String },
}

impl TargetQuery {
    /// DSL body of this query.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            TargetQuery::MatchAll => json!({ "match_all": {} }),
            TargetQuery::Bool { must, must_not, should } => {
                let mut body = Map::new();
                for (key, clauses) in [("must", must), ("must_not", must_not), ("should", should)] {
                    if !clauses.is_empty() {
                        body.insert(
                            key.to_string(),
                            Value::Array(clauses.iter().map(TargetQuery::to_json).collect()),
                        );
                    }
                }
                json!({ "bool": body })
            }
            TargetQuery::Wildcard { field, pattern } => {
                let mut inner = Map::new();
                inner.insert(field.clone(), json!({ "value": pattern }));
                json!({ "wildcard": inner })
            }
            TargetQuery::QueryString { query } => json!({ "query_string": { "query": query } }),
        }
    }

    #[must_use]
    pub fn is_match_all(&self) -> bool {
        matches!(self, TargetQuery::MatchAll)
    }
}

#[derive(Default)]
struct BoolParts {
    must: Vec<TargetQuery>,
    must_not: Vec<TargetQuery>,
    should: Vec<TargetQuery>,
}

impl BoolParts {
    fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty() && self.should.is_empty()
    }
}

/// Converts [`QueryNode`] trees using per-field analysis metadata.
#[derive(Clone)]
pub struct QueryTranslator {
    resolver: Arc<dyn SchemaResolver>,
}

impl QueryTranslator {
    pub fn new(resolver: Arc<dyn SchemaResolver>) -> Self {
        Self { resolver }
    }

    /// Translate `node` for `entity_type`.
    ///
    /// Fails with a schema error when the entity or a wildcard field is not
    /// declared, and with a translation error on an unrecognized occur.
    pub fn translate(&self, node: &QueryNode, entity_type: &str) -> Result<TargetQuery> {
        let descriptor = self.resolver.descriptor(entity_type)?;
        let query = node_query(&descriptor, node)?;
        debug!(entity = entity_type, query = %query.to_json(), "Translated query");
        Ok(query)
    }
}

/// Nested groups contribute their clauses to the enclosing container.
fn flatten(descriptor: &IndexDescriptor, clauses: &[Clause], parts: &mut BoolParts) -> Result<()> {
    for clause in clauses {
        if let QueryNode::Boolean { clauses: inner } = &clause.node {
            flatten(descriptor, inner, parts)?;
            continue;
        }
        let query = node_query(descriptor, &clause.node)?;
        match clause.occur {
            Occur::Must => parts.must.push(query),
            Occur::MustNot => parts.must_not.push(query),
            Occur::Should => parts.should.push(query),
            Occur::Unrecognized => {
                return Err(BridgeError::Translation(format!(
                    "boolean clause '{}' has no recognized occur",
                    clause.node
                )))
            }
        }
    }
    Ok(())
}

fn node_query(descriptor: &IndexDescriptor, node: &QueryNode) -> Result<TargetQuery> {
    match node {
        QueryNode::MatchAll => Ok(TargetQuery::MatchAll),
        QueryNode::Wildcard { field, pattern } => {
            let mapping = descriptor.field_mapping(field)?;
            if mapping.analyzed {
                Ok(TargetQuery::QueryString { query: node.to_string() })
            } else {
                Ok(TargetQuery::Wildcard {
                    field: mapping.raw_path(),
                    pattern: pattern.clone(),
                })
            }
        }
        QueryNode::Opaque { text } => Ok(TargetQuery::QueryString { query: text.clone() }),
        QueryNode::Boolean { clauses } => {
            let mut parts = BoolParts::default();
            flatten(descriptor, clauses, &mut parts)?;
            if parts.is_empty() {
                return Ok(TargetQuery::MatchAll);
            }
            Ok(TargetQuery::Bool {
                must: parts.must,
                must_not: parts.must_not,
                should: parts.should,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMapping, FieldType, SchemaError, StaticSchemaResolver};

    fn translator() -> QueryTranslator {
        let resolver = StaticSchemaResolver::new();
        resolver.register(
            IndexDescriptor::new("MockEntity", "mock", "id")
                .field(FieldMapping::analyzed("name", FieldType::Text))
                .field(FieldMapping::exact("gender", FieldType::Text)),
        );
        QueryTranslator::new(Arc::new(resolver))
    }

    #[test]
    fn test_match_all_and_empty_group() {
        let t = translator();
        assert!(t.translate(&QueryNode::MatchAll, "MockEntity").unwrap().is_match_all());
        assert!(t
            .translate(&QueryNode::boolean().build(), "MockEntity")
            .unwrap()
            .is_match_all());
    }

    #[test]
    fn test_wildcard_on_exact_field_targets_raw() {
        let q = translator()
            .translate(&QueryNode::wildcard("gender", "ma*"), "MockEntity")
            .unwrap();
        assert_eq!(q.to_json(), json!({ "wildcard": { "gender": { "value": "ma*" } } }));
    }

    #[test]
    fn test_wildcard_on_analyzed_field_falls_back() {
        let q = translator()
            .translate(&QueryNode::wildcard("name", "wa*"), "MockEntity")
            .unwrap();
        assert_eq!(q, TargetQuery::QueryString { query: "name:wa*".into() });
    }

    #[test]
    fn test_nested_groups_are_flattened() {
        let node = QueryNode::boolean()
            .must(QueryNode::wildcard("gender", "male"))
            .should(
                QueryNode::boolean()
                    .must_not(QueryNode::opaque("name:jesse"))
                    .build(),
            )
            .build();
        let q = translator().translate(&node, "MockEntity").unwrap();
        assert_eq!(
            q,
            TargetQuery::Bool {
                must: vec![TargetQuery::Wildcard { field: "gender".into(), pattern: "male".into() }],
                must_not: vec![TargetQuery::QueryString { query: "name:jesse".into() }],
                should: vec![],
            }
        );
    }

    #[test]
    fn test_unknown_field_is_schema_error() {
        let err = translator()
            .translate(&QueryNode::wildcard("age", "4*"), "MockEntity")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Schema(SchemaError::UnknownField { .. })));
    }

    #[test]
    fn test_unknown_entity_is_schema_error() {
        let err = translator().translate(&QueryNode::MatchAll, "Ghost").unwrap_err();
        assert!(matches!(err, BridgeError::Schema(SchemaError::UnknownEntity(_))));
    }

    #[test]
    fn test_unrecognized_occur_fails() {
        let node = QueryNode::boolean()
            .clause(Occur::Unrecognized, QueryNode::opaque("x"))
            .build();
        let err = translator().translate(&node, "MockEntity").unwrap_err();
        assert!(matches!(err, BridgeError::Translation(_)));
    }

    #[test]
    fn test_bool_json_omits_empty_lists() {
        let q = TargetQuery::Bool {
            must: vec![TargetQuery::MatchAll],
            must_not: vec![],
            should: vec![],
        };
        assert_eq!(q.to_json(), json!({ "bool": { "must": [{ "match_all": {} }] } }));
    }
}
