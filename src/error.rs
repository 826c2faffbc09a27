//! Custom error types for ticket-sync.
//!
//! Lookup-side errors are recovered inside the resolver and turned into
//! "not found" results; update and configuration errors travel up to the
//! orchestrator and the binary.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ticket-sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A required credential or identifier is absent from the environment
    #[error("Missing required setting: {name}")]
    MissingCredential { name: String },

    // =========================================================================
    // Trigger Errors
    // =========================================================================
    /// The webhook payload could not be interpreted
    #[error("Malformed {event} payload: {message}")]
    Payload { event: String, message: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// A query or schema call against the workspace store failed
    #[error("Lookup failed during {operation}: {message}")]
    Lookup { operation: String, message: String },

    /// A schema property exists but has no filter mapping for this use
    #[error("Property '{property}' has unsupported type '{kind}' for {usage}")]
    UnsupportedPropertyType {
        property: String,
        kind: String,
        usage: String,
    },

    /// A status write failed
    #[error("Failed to set status of {item_id} to '{status}': {message}")]
    Update {
        item_id: String,
        status: String,
        message: String,
    },

    /// Transport-level failure talking to the remote API
    #[error("HTTP error: {0}")]
    Http(String),

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a payload error
    pub fn payload(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Payload {
            event: event.into(),
            message: message.into(),
        }
    }

    /// Create a lookup error
    pub fn lookup(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lookup {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an update error
    pub fn update(
        item_id: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Update {
            item_id: item_id.into(),
            status: status.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recovered locally (lookup path degrades to "not found")
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Lookup { .. } | Self::UnsupportedPropertyType { .. } | Self::Http(_)
        )
    }

    /// Check if this error must abort the run before any remote call
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::MissingCredential { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Payload { .. } => 2,
            Self::Update { .. } => 3,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::MissingCredential { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for ticket-sync results
pub type Result<T> = std::result::Result<T, SyncError>;

/// Extension trait for converting foreign errors to SyncError
pub trait IntoSyncError<T> {
    fn into_sync_config(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoSyncError<T> for std::result::Result<T, E> {
    fn into_sync_config(self) -> Result<T> {
        self.map_err(|e| SyncError::config(e.into().to_string()))
    }
}
