//! Error types and handling
//!
//! This module provides the error types used throughout the Muse engine.
//! All errors implement the `MuseErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Safety of messages
//!
//! Error messages are safe to display to end users: they never embed API
//! keys and they never echo raw model output.

use thiserror::Error;

/// Trait for Muse error extensions
///
/// Provides additional context for errors: a user-friendly hint and
/// recoverability information. All engine errors implement this trait.
pub trait MuseErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around within the same
    /// process. Non-recoverable errors require operator intervention
    /// (ingesting data, fixing configuration) before retrying.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// Each variant carries the context a caller needs to decide between retry,
/// fallback, and abort, without exposing secrets in the message.
///
/// # Error Categories
///
/// - **Configuration**: invalid or missing configuration
/// - **StoreNotReady**: the brand memory holds no ingested records
/// - **MalformedInput**: a caller passed an incomplete structured object
/// - **GenerationFailed**: the generation service errored, timed out, or
///   returned an unparseable structured response
/// - **BudgetExceeded**: a session crossed its token limit and the caller
///   has not chosen how to proceed
/// - **Database / Session**: SQLite persistence failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, MuseErrorExt};
///
/// let error = EngineError::BudgetExceeded { used: 9000, limit: 8000 };
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::StoreNotReady;
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Vector store errors
    #[error("Brand memory is empty: no records have been ingested")]
    StoreNotReady,

    // Caller contract errors
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    // Generation service errors
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    // Session budget errors
    #[error("Session token budget exceeded: {used} tokens used, limit is {limit}")]
    BudgetExceeded { used: usize, limit: usize },

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Session errors
    #[error("Session error: {0}")]
    Session(String),

    // Action dispatch errors
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    // Credential errors
    #[error("Missing API credentials: {0}")]
    MissingCredentials(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuseErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::StoreNotReady => "Run 'muse ingest <file.jsonl>' to load brand history first",
            Self::MalformedInput(_) => "A required field is missing from the request",
            Self::GenerationFailed(_) => {
                "The generation service failed. Check your API key and network, then retry"
            }
            Self::BudgetExceeded { .. } => {
                "Session history is too large. Proceed anyway, clear it, or start a new session"
            }
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::Session(_) => "Session operation failed. Check the session id",
            Self::UnknownAction(_) => "The requested action is not registered",
            Self::MissingCredentials(_) => "Set the API key environment variable and retry",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable without operator intervention
            Self::StoreNotReady | Self::Config(_) | Self::MissingCredentials(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
