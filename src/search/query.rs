// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query tree
//!
//! The boolean/wildcard query representation callers build, plus sort
//! specifications. The set of node kinds is closed; anything the translator
//! does not model travels as [`QueryNode::Opaque`] literal text.
//!
//! # Example
//!
//! ```rust
//! use search_bridge::search::{QueryNode, Occur, SortSpec};
//!
//! let query = QueryNode::boolean()
//!     .must(QueryNode::wildcard("gender", "ma*"))
//!     .must_not(QueryNode::wildcard("name", "jesse"))
//!     .build();
//! assert_eq!(query.to_string(), "+gender:ma* -name:jesse");
//!
//! let sort = SortSpec::new().asc("name").desc("age");
//! assert_eq!(sort.len(), 2);
//! # let _ = Occur::Should;
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a clause participates in its boolean group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Occur {
    /// Required
    Must,
    /// Excluded
    MustNot,
    /// Optional
    Should,
    /// Occur value this crate does not know; translation rejects it
    #[serde(other)]
    Unrecognized,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::MustNot => "-",
            Occur::Should | Occur::Unrecognized => "",
        }
    }
}

/// One `(occur, node)` pair of a boolean group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub occur: Occur,
    pub node: QueryNode,
}

impl Clause {
    pub fn new(occur: Occur, node: QueryNode) -> Self {
        Self { occur, node }
    }
}

/// Legacy query tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryNode {
    MatchAll,
    Wildcard { field: String, pattern: String },
    /// Ordered clauses; an empty group is a no-op
    Boolean { clauses: Vec<Clause> },
    /// Literal query text for node kinds without a structured form
    Opaque { text: String },
}

impl QueryNode {
    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        QueryNode::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        QueryNode::Opaque { text: text.into() }
    }

    /// Start building a boolean group.
    pub fn boolean() -> BooleanBuilder {
        BooleanBuilder::default()
    }

    /// True for groups that contain no clauses at any depth.
    #[must_use]
    pub fn is_empty_group(&self) -> bool {
        match self {
            QueryNode::Boolean { clauses } => clauses.iter().all(|c| c.node.is_empty_group()),
            _ => false,
        }
    }
}

/// Lucene-style literal form, used for free-text fallback.
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::MatchAll => write!(f, "*:*"),
            QueryNode::Wildcard { field, pattern } => write!(f, "{}:{}", field, pattern),
            QueryNode::Opaque { text } => write!(f, "{}", text),
            QueryNode::Boolean { clauses } => {
                let mut first = true;
                for clause in clauses.iter().filter(|c| !c.node.is_empty_group()) {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    match &clause.node {
                        QueryNode::Boolean { .. } => {
                            write!(f, "{}({})", clause.occur.prefix(), clause.node)?
                        }
                        node => write!(f, "{}{}", clause.occur.prefix(), node)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Fluent builder for [`QueryNode::Boolean`].
#[derive(Debug, Default)]
pub struct BooleanBuilder {
    clauses: Vec<Clause>,
}

impl BooleanBuilder {
    #[must_use]
    pub fn must(self, node: QueryNode) -> Self {
        self.clause(Occur::Must, node)
    }

    #[must_use]
    pub fn must_not(self, node: QueryNode) -> Self {
        self.clause(Occur::MustNot, node)
    }

    #[must_use]
    pub fn should(self, node: QueryNode) -> Self {
        self.clause(Occur::Should, node)
    }

    #[must_use]
    pub fn clause(mut self, occur: Occur, node: QueryNode) -> Self {
        self.clauses.push(Clause::new(occur, node));
        self
    }

    pub fn build(self) -> QueryNode {
        QueryNode::Boolean { clauses: self.clauses }
    }
}

/// One sort entry on a logical field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub ascending: bool,
}

/// Ordered list of sort entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec {
    entries: Vec<SortEntry>,
}

impl SortSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, true)
    }

    #[must_use]
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, false)
    }

    #[must_use]
    pub fn by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.entries.push(SortEntry {
            field: field.into(),
            ascending,
        });
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
