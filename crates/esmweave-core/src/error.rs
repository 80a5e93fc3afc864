//! Unified error handling for esmweave
//!
//! Errors raised while orchestrating a load session. Framing errors from
//! the record reader arrive here boxed inside [`Error::Parse`].

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for load-session operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Content file could not be located
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Parse Errors ====================

    /// Fatal framing or decoding error in a content file
    #[error("Failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ==================== Load Order Errors ====================

    /// A declared master has not been loaded yet
    #[error("{file} depends on {dependency}, which is not loaded")]
    MissingDependency {
        file: String,
        dependency: String,
    },

    /// The same content file was started twice in one session
    #[error("Content file already loaded: {file}")]
    AlreadyLoaded {
        file: String,
    },

    /// Operation called in the wrong loader state
    #[error("Invalid loader state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    // ==================== Database Errors ====================

    /// Record not found
    #[error("Record not found: {id}")]
    RecordNotFound {
        id: String,
    },

    // ==================== Configuration Errors ====================

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    // ==================== General Errors ====================

    /// Internal error (should not happen)
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Create a parse error for the named file
    pub fn parse(
        file: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Parse {
            file: file.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FileNotFound(_) | Error::RecordNotFound { .. } => true,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a parse/format error
    pub fn is_parse_error(&self) -> bool {
        match self {
            Error::Parse { .. } => true,
            Error::WithContext { source, .. } => source.is_parse_error(),
            _ => false,
        }
    }

    /// Check if this is a load-order dependency error
    pub fn is_dependency_error(&self) -> bool {
        match self {
            Error::MissingDependency { .. } => true,
            Error::WithContext { source, .. } => source.is_dependency_error(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
