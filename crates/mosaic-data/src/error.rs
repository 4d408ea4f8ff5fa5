//! Data error types.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while loading or querying collections.
#[derive(Debug, Error)]
pub enum DataError {
    /// A data source could not be read or has the wrong shape.
    #[error("{path}: {message}")]
    DataFile { path: String, message: String },

    /// The collection was never defined.
    #[error("collection {0} is not defined")]
    UnknownCollection(String),

    /// The scope is not registered on the collection.
    #[error("unknown scope {scope} for model {model}")]
    UnknownScope { scope: String, model: String },

    /// The computed method is not registered on the collection.
    #[error("unknown method {method} for model {model}")]
    UnknownMethod { method: String, model: String },

    /// A scope failed.
    #[error("error in scope {scope} for model {model}: {source}")]
    Scope {
        scope: String,
        model: String,
        #[source]
        source: Box<DataError>,
    },

    /// A computed method failed.
    #[error("error in item method {method} for model {model}: {source}")]
    ItemMethod {
        method: String,
        model: String,
        #[source]
        source: Box<DataError>,
    },

    /// Records are read-only.
    #[error("{model} records are immutable, cannot assign {key}")]
    ImmutableMutation { key: String, model: String },

    /// A caller passed an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DataError {
    /// Create a data file error.
    pub fn data_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
