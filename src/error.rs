// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use thiserror::Error;

use crate::schema::SchemaError;
use crate::transport::TransportError;

/// Errors surfaced by the bridge.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// Missing entity, field or identifier metadata
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Malformed query tree
    #[error("translation error: {0}")]
    Translation(String),

    /// A write batch could not be delivered after retrying
    #[error("bulk submission of batch {batch_id} failed after {attempts} attempt(s): {message}")]
    BulkSubmission {
        batch_id: String,
        attempts: usize,
        message: String,
    },

    /// A written batch could not be made visible to search (strict mode)
    #[error("refresh after batch {batch_id} failed after {attempts} attempt(s): {message}")]
    Refresh {
        batch_id: String,
        attempts: usize,
        message: String,
    },

    #[error("failed to create index '{index}': {message}")]
    SchemaCreation { index: String, message: String },

    #[error("index '{index}' did not reach yellow health within {waited:?}")]
    ClusterTimeout { index: String, waited: Duration },

    /// A shard reported a failure; no partial results are returned
    #[error("search failed: {0}")]
    SearchExecution(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The external entity loader failed
    #[error("entity loading failed: {0}")]
    Load(String),

    #[error("indexing queue is stopped")]
    QueueStopped,

    #[error("bridge is not open")]
    NotOpen,
}

impl BridgeError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Transport(e) => e.is_retryable(),
            BridgeError::ClusterTimeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_converts() {
        let err: BridgeError = SchemaError::UnknownEntity("Ghost".into()).into();
        assert!(matches!(err, BridgeError::Schema(_)));
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_retryable() {
        let err: BridgeError = TransportError::Connection("reset".into()).into();
        assert!(err.is_retryable());
        assert!(!BridgeError::SearchExecution("boom".into()).is_retryable());
        assert!(!BridgeError::Translation("bad".into()).is_retryable());
    }

    #[test]
    fn test_bulk_submission_message() {
        let err = BridgeError::BulkSubmission {
            batch_id: "b-1".into(),
            attempts: 5,
            message: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("b-1"));
        assert!(msg.contains("5 attempt"));
    }
}
