// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity schema descriptors and resolution.
//!
//! Every indexed entity type is described once, up front, by an
//! [`IndexDescriptor`]: the index it lives in, its identifier field and the
//! ordered list of [`FieldMapping`]s. Components never introspect entity
//! values; they ask a [`SchemaResolver`].
//!
//! # Example
//!
//! ```
//! use search_bridge::schema::{SchemaConfig, SchemaResolver, StaticSchemaResolver};
//!
//! let config: SchemaConfig = serde_json::from_value(serde_json::json!({
//!     "entities": [{
//!         "name": "MockEntity",
//!         "index": "mock_entity",
//!         "id_field": "id",
//!         "id_type": "numeric",
//!         "fields": [
//!             { "name": "name", "type": "String" },
//!             { "name": "gender", "type": "String", "analyzed": false },
//!             { "name": "age", "type": "Integer" }
//!         ]
//!     }]
//! })).unwrap();
//!
//! let resolver = StaticSchemaResolver::from_config(&config, "search_bridge").unwrap();
//! assert_eq!(resolver.index_name_of("MockEntity").unwrap(), "mock_entity");
//! assert_eq!(resolver.id_field_of("MockEntity").unwrap(), "id");
//! assert_eq!(resolver.fields_of("MockEntity").unwrap().len(), 3);
//! ```
//!
//! # Physical layout
//!
//! - Analyzed field `f`: declared as `f` (analyzed) with a sub-field `f_raw`
//!   (unanalyzed). The raw path is `f.f_raw`.
//! - Unanalyzed field `f`: a single unanalyzed field, its own raw path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Suffix of the unanalyzed twin of an analyzed field.
pub const RAW_SUFFIX: &str = "_raw";

/// Reserved source field carrying the entity (document) type of each document.
pub const TYPE_FIELD: &str = "__type";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity type '{0}' is not registered")]
    UnknownEntity(String),
    #[error("entity type '{entity}' has no field named '{field}'")]
    UnknownField { entity: String, field: String },
    #[error("entity type '{0}' does not declare an identifier field")]
    MissingId(String),
    #[error("invalid schema configuration: {0}")]
    InvalidConfig(String),
}

/// Data type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
}

impl FieldType {
    /// Derive the index data type from a declared language type name.
    ///
    /// Integers and longs map to numeric types, floating types to `Double`,
    /// date/time types to `Date`, booleans to `Boolean`. Anything else is text.
    #[must_use]
    pub fn derive(declared: &str) -> Self {
        let simple = declared
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(declared)
            .to_ascii_lowercase();

        match simple.as_str() {
            "i8" | "i16" | "i32" | "u8" | "u16" | "u32" | "int" | "integer" | "short" | "byte" => {
                FieldType::Integer
            }
            "i64" | "u64" | "i128" | "u128" | "isize" | "usize" | "long" => {
                FieldType::Long
            }
            "f32" | "f64" | "float" | "double" | "decimal" => FieldType::Double,
            "bool" | "boolean" => FieldType::Boolean,
            "date" | "datetime" | "naivedate" | "naivedatetime" | "timestamp" | "systemtime"
            | "offsetdatetime" | "primitivedatetime" => FieldType::Date,
            _ => FieldType::Text,
        }
    }

    /// Engine type name for the analyzed (or only) representation.
    #[must_use]
    pub fn engine_type(self, analyzed: bool) -> &'static str {
        match self {
            FieldType::Text if analyzed => "text",
            FieldType::Text => "keyword",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }

    /// Whether values of this type are numbers in the engine.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Long | FieldType::Double)
    }
}

/// One indexed field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub data_type: FieldType,
    pub analyzed: bool,
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, data_type: FieldType, analyzed: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            analyzed,
        }
    }

    /// Analyzed field (free text).
    pub fn analyzed(name: impl Into<String>, data_type: FieldType) -> Self {
        Self::new(name, data_type, true)
    }

    /// Unanalyzed field (exact match).
    pub fn exact(name: impl Into<String>, data_type: FieldType) -> Self {
        Self::new(name, data_type, false)
    }

    /// Name of the unanalyzed twin sub-field, e.g. `name_raw`.
    #[must_use]
    pub fn raw_name(&self) -> String {
        format!("{}{}", self.name, RAW_SUFFIX)
    }

    /// Path used for exact matching, wildcards and sorting.
    #[must_use]
    pub fn raw_path(&self) -> String {
        if self.analyzed {
            format!("{}.{}", self.name, self.raw_name())
        } else {
            self.name.clone()
        }
    }

    /// Mapping declaration for this field.
    fn to_mapping(&self) -> Value {
        if self.analyzed {
            let mut sub = Map::new();
            sub.insert(
                self.raw_name(),
                json!({ "type": self.data_type.engine_type(false) }),
            );
            json!({
                "type": self.data_type.engine_type(true),
                "fields": Value::Object(sub),
            })
        } else {
            json!({ "type": self.data_type.engine_type(false) })
        }
    }
}

/// How identifiers coming back from the engine are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// Ids pass through as strings.
    String,
    /// Ids are parsed as integers, falling back to the raw string.
    #[default]
    Numeric,
}

/// Everything needed to index and search one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub entity_type: String,
    pub index_name: String,
    pub id_field: String,
    pub id_type: IdType,
    pub fields: Vec<FieldMapping>,
}

impl IndexDescriptor {
    pub fn new(
        entity_type: impl Into<String>,
        index_name: impl Into<String>,
        id_field: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            index_name: index_name.into(),
            id_field: id_field.into(),
            id_type: IdType::default(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_id_type(mut self, id_type: IdType) -> Self {
        self.id_type = id_type;
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a declared field.
    pub fn field_mapping(&self, name: &str) -> Result<&FieldMapping, SchemaError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SchemaError::UnknownField {
                entity: self.entity_type.clone(),
                field: name.to_string(),
            })
    }

    /// Build the index mapping body.
    ///
    /// ```text
    /// { "properties": {
    ///     "__type": { "type": "keyword" },
    ///     "name":   { "type": "text", "fields": { "name_raw": { "type": "keyword" } } },
    ///     "gender": { "type": "keyword" } },
    ///   "_meta": { "doc_types": ["MockEntity"] } }
    /// ```
    #[must_use]
    pub fn mapping(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(TYPE_FIELD.to_string(), json!({ "type": "keyword" }));
        for field in &self.fields {
            properties.insert(field.name.clone(), field.to_mapping());
        }
        json!({
            "properties": Value::Object(properties),
            "_meta": { "doc_types": [self.entity_type] },
        })
    }
}

/// Source of entity schema information.
///
/// Must fail with [`SchemaError::MissingId`] for a type without identifier.
pub trait SchemaResolver: Send + Sync {
    /// Full descriptor of an entity type.
    fn descriptor(&self, entity_type: &str) -> Result<Arc<IndexDescriptor>, SchemaError>;

    /// All registered entity types, in registration order.
    fn entity_types(&self) -> Vec<String>;

    fn fields_of(&self, entity_type: &str) -> Result<Vec<FieldMapping>, SchemaError> {
        Ok(self.descriptor(entity_type)?.fields.clone())
    }

    fn id_field_of(&self, entity_type: &str) -> Result<String, SchemaError> {
        Ok(self.descriptor(entity_type)?.id_field.clone())
    }

    fn index_name_of(&self, entity_type: &str) -> Result<String, SchemaError> {
        Ok(self.descriptor(entity_type)?.index_name.clone())
    }
}

/// Declared field in a [`SchemaConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    /// Declared language type (`i32`, `Long`, `f64`, `date`, `String`, ...)
    #[serde(rename = "type", default = "default_field_type")]
    pub declared_type: String,
    #[serde(default = "default_analyzed")]
    pub analyzed: bool,
}

fn default_field_type() -> String { "String".to_string() }
fn default_analyzed() -> bool { true }

/// Declared entity in a [`SchemaConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub id_type: IdType,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// Explicit, caller-supplied schema for all indexed entity types.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub entities: Vec<EntitySchema>,
}

/// Resolver backed by descriptors registered at startup.
///
/// Reads are concurrent; [`register`](Self::register) replaces a descriptor
/// (used when an index is recreated with a new layout).
#[derive(Debug, Default)]
pub struct StaticSchemaResolver {
    descriptors: RwLock<HashMap<String, Arc<IndexDescriptor>>>,
    order: RwLock<Vec<String>>,
}

impl StaticSchemaResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a [`SchemaConfig`] once into descriptors.
    pub fn from_config(config: &SchemaConfig, default_index: &str) -> Result<Self, SchemaError> {
        let resolver = Self::new();
        for entity in &config.entities {
            if entity.name.is_empty() {
                return Err(SchemaError::InvalidConfig("entity with empty name".into()));
            }
            let id_field = entity
                .id_field
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| SchemaError::MissingId(entity.name.clone()))?;

            let index_name = entity
                .index
                .clone()
                .filter(|idx| !idx.is_empty())
                .unwrap_or_else(|| default_index.to_string());

            let mut descriptor = IndexDescriptor::new(&entity.name, index_name, id_field)
                .with_id_type(entity.id_type);
            for field in &entity.fields {
                if descriptor.fields.iter().any(|f| f.name == field.name) {
                    return Err(SchemaError::InvalidConfig(format!(
                        "field '{}' declared twice on '{}'",
                        field.name, entity.name
                    )));
                }
                descriptor.fields.push(FieldMapping::new(
                    &field.name,
                    FieldType::derive(&field.declared_type),
                    field.analyzed,
                ));
            }
            resolver.register(descriptor);
        }
        Ok(resolver)
    }

    /// Register or replace a descriptor.
    pub fn register(&self, descriptor: IndexDescriptor) {
        let name = descriptor.entity_type.clone();
        let previous = self
            .descriptors
            .write()
            .insert(name.clone(), Arc::new(descriptor));
        if previous.is_none() {
            self.order.write().push(name);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

impl SchemaResolver for StaticSchemaResolver {
    fn descriptor(&self, entity_type: &str) -> Result<Arc<IndexDescriptor>, SchemaError> {
        self.descriptors
            .read()
            .get(entity_type)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownEntity(entity_type.to_string()))
    }

    fn entity_types(&self) -> Vec<String> {
        self.order.read().clone()
    }
}
