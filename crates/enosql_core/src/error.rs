//! Error types for the enosql engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database is not registered and no snapshot file exists for it.
    #[error("database not found: {name}")]
    DatabaseNotFound {
        /// Name of the database.
        name: String,
    },

    /// A database with this name is already registered.
    #[error("database already exists: {name}")]
    DatabaseExists {
        /// Name of the database.
        name: String,
    },

    /// Collection not found in the database.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A collection with this name already exists in the database.
    #[error("collection already exists: {name}")]
    CollectionExists {
        /// Name of the collection.
        name: String,
    },

    /// Document not found in the collection.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// Id of the document.
        id: String,
    },

    /// A document with this id already exists in the collection.
    #[error("document already exists: {id}")]
    DocumentExists {
        /// Id of the document.
        id: String,
    },

    /// Unparsable snapshot, backup archive, or import payload.
    #[error("malformed data: {message}")]
    Malformed {
        /// Description of what failed to parse.
        message: String,
    },

    /// Unknown import/export format.
    #[error("unsupported format: {format}")]
    UnsupportedFormat {
        /// The offending format name.
        format: String,
    },

    /// Unknown aggregation operation in a group stage.
    #[error("unknown aggregation operation: {operation}")]
    UnknownAggregation {
        /// The offending operation name.
        operation: String,
    },

    /// Invalid argument provided to an API.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Creates a database-not-found error.
    pub fn database_not_found(name: impl Into<String>) -> Self {
        Self::DatabaseNotFound { name: name.into() }
    }

    /// Creates a database-exists error.
    pub fn database_exists(name: impl Into<String>) -> Self {
        Self::DatabaseExists { name: name.into() }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates a collection-exists error.
    pub fn collection_exists(name: impl Into<String>) -> Self {
        Self::CollectionExists { name: name.into() }
    }

    /// Creates a document-not-found error.
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::DocumentNotFound { id: id.into() }
    }

    /// Creates a document-exists error.
    pub fn document_exists(id: impl Into<String>) -> Self {
        Self::DocumentExists { id: id.into() }
    }

    /// Creates a malformed-data error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unsupported-format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an unknown-aggregation error.
    pub fn unknown_aggregation(operation: impl Into<String>) -> Self {
        Self::UnknownAggregation {
            operation: operation.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
