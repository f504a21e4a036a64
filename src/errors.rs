//! Typed error hierarchy for the kennel tracker.
//!
//! Two enums cover the two layers:
//! - `StoreError`: every failure surfaced by a `CellStore` backend
//! - `LoadError`: a dashboard load failure, classified for the user

use thiserror::Error;

/// Phrases the store uses when the expected tables have not been created.
const SCHEMA_MISSING_PHRASES: &[&str] = &["schema cache", "table not found", "no such table"];

/// Errors from the persistence gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store is not configured: {reason}")]
    NotConfigured { reason: String },

    #[error("Database error during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("Cell {id} not found")]
    RowNotFound { id: i64 },
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    /// Whether the underlying message says a table is missing.
    pub fn is_schema_missing(&self) -> bool {
        let Self::Backend { message, .. } = self else {
            return false;
        };
        let message = message.to_lowercase();
        if message.contains("table") && message.contains("does not exist") {
            return true;
        }
        if message.contains("relation") && message.contains("does not exist") {
            return true;
        }
        SCHEMA_MISSING_PHRASES.iter().any(|p| message.contains(p))
    }
}

/// Errors from loading the dashboard.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("{source}")]
    NotConfigured {
        #[source]
        source: StoreError,
    },

    #[error("Database table not found: {source}")]
    SetupRequired {
        #[source]
        source: StoreError,
    },

    #[error("Failed to load cages. Please check your database connection: {source}")]
    Connection {
        #[source]
        source: StoreError,
    },
}

impl LoadError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::NotConfigured { source }
            | Self::SetupRequired { source }
            | Self::Connection { source } => source,
        }
    }

    /// Setup errors come with instructions instead of a retry action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

impl From<StoreError> for LoadError {
    fn from(source: StoreError) -> Self {
        if matches!(source, StoreError::NotConfigured { .. }) {
            Self::NotConfigured { source }
        } else if source.is_schema_missing() {
            Self::SetupRequired { source }
        } else {
            Self::Connection { source }
        }
    }
}
