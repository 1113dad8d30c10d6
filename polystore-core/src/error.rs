//! The datastore error taxonomy.
//!
//! Every contract operation returns one of these three kinds; adapters
//! translate their backend's native failures and never let them cross the
//! boundary. Programming errors (unknown property names, malformed filter
//! construction) are not represented here — they panic synchronously at
//! the call site instead.

use crate::value::Value;
use thiserror::Error;

/// Backend-neutral datastore failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatastoreError {
    /// Generic backend-reported failure.
    #[error("datastore {store}: {message}")]
    Backend { store: String, message: String },

    /// The requested id does not exist for the type.
    #[error("datastore {store}: key {id} not found for entity {entity_type}")]
    KeyNotFound {
        store: String,
        entity_type: String,
        id: Value,
    },

    /// The operation referenced a type never registered on this datastore.
    #[error("datastore {store}: type {entity_type} is not registered")]
    UnknownType { store: String, entity_type: String },
}

impl DatastoreError {
    /// Wrap a backend failure, folding the cause into the message.
    pub fn backend(store: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        DatastoreError::Backend {
            store: store.into(),
            message: cause.to_string(),
        }
    }

    pub fn key_not_found(
        store: impl Into<String>,
        entity_type: impl Into<String>,
        id: Value,
    ) -> Self {
        DatastoreError::KeyNotFound {
            store: store.into(),
            entity_type: entity_type.into(),
            id,
        }
    }

    pub fn unknown_type(store: impl Into<String>, entity_type: impl Into<String>) -> Self {
        DatastoreError::UnknownType {
            store: store.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// Result alias for datastore operations.
pub type DatastoreResult<T> = Result<T, DatastoreError>;

// =============================================================================
// TESTS
// =============================================================================
