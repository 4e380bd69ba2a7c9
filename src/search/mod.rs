// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! Query translation, index lifecycle and search execution against the
//! document-search engine.
//!
//! # Architecture
//!
//! ```text
//! QueryNode (tree) + SortSpec
//!     ↓
//!     QueryTranslator (per-field analysis) → TargetQuery (engine DSL)
//!     ↓
//!     SearchExecutor → SearchTransport::search → hits → EntityReference
//!
//! IndexSchemaManager → create / delete / recreate (dual analyzed + raw fields)
//! ```
//!
//! # Field representations
//!
//! ```text
//! analyzed field "name"   → name (free text) + name.name_raw (exact)
//! exact field "gender"    → gender (exact)
//! wildcards on exact fields and all sorts use the exact representation
//! ```

mod executor;
mod index_manager;
mod query;
mod translator;

pub use executor::{EntityId, EntityLoader, EntityReference, SearchExecutor, SearchPage, SearchQuery};
pub use index_manager::IndexSchemaManager;
pub use query::{BooleanBuilder, Clause, Occur, QueryNode, SortEntry, SortSpec};
pub use translator::{QueryTranslator, TargetQuery};
