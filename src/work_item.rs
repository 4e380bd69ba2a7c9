//! Index work items.
//!
//! A [`WorkItem`] is one add-or-delete instruction for one entity instance.
//! Items are immutable once built and flow through the
//! [`IndexingQueue`](crate::batching::queue::IndexingQueue) in enqueue order.
//!
//! # Example
//!
//! ```
//! use search_bridge::{WorkItem, WorkKind};
//! use serde_json::json;
//!
//! let add = WorkItem::add("MockEntity", "42")
//!     .with_field("name", json!("waabox"))
//!     .with_field("gender", json!("male"));
//! assert_eq!(add.kind(), WorkKind::Add);
//! assert_eq!(add.fields().len(), 2);
//!
//! let delete = WorkItem::delete("MockEntity", "42");
//! assert!(delete.fields().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of index operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// Create or replace the document.
    Add,
    /// Remove the document.
    Delete,
}

/// A single index instruction for one entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    kind: WorkKind,
    entity_type: String,
    entity_id: String,
    /// Flattened field name → value, in declaration order (Add only)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    fields: Map<String, Value>,
}

impl WorkItem {
    /// Add (or replace) an entity document.
    pub fn add(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            kind: WorkKind::Add,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            fields: Map::new(),
        }
    }

    /// Add with a complete field map.
    pub fn add_with_fields(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            fields,
            ..Self::add(entity_type, entity_id)
        }
    }

    /// Delete an entity document.
    pub fn delete(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            kind: WorkKind::Delete,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter. Ignored for deletes.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        if self.kind == WorkKind::Add {
            self.fields.insert(name.into(), value);
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
