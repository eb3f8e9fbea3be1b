use thiserror::Error;

/// Error types for dialer engine operations
///
/// The variants split into three families that callers should treat
/// differently:
///
/// - "nothing to do right now": [`NoAgentsAvailable`](DialerError::NoAgentsAvailable),
///   [`QueueEmpty`](DialerError::QueueEmpty). Back off and try again.
/// - "operation is invalid": [`Validation`](DialerError::Validation),
///   [`Conflict`](DialerError::Conflict), [`NotFound`](DialerError::NotFound),
///   [`Configuration`](DialerError::Configuration). Retrying will not help.
/// - "transient backend issue": [`TransientStore`](DialerError::TransientStore).
///   Retry later.
///
/// # Examples
///
/// ```
/// use rvoip_dialer_engine::{DialerError, ErrorClass};
///
/// let err = DialerError::queue_empty("campaign c-1 has no eligible records");
/// assert_eq!(err.class(), ErrorClass::Expected);
/// assert!(err.is_retryable());
///
/// let err = DialerError::conflict("campaign c-1 is already active");
/// assert_eq!(err.class(), ErrorClass::InvalidOperation);
/// assert!(!err.is_retryable());
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DialerError {
    /// Bad input on the command surface
    ///
    /// # Examples
    /// - Missing source campaign id
    /// - Empty agent list
    /// - Ratio bounds that do not contain the initial ratio
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested state transition is not valid from the current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown campaign or call
    #[error("Not found: {0}")]
    NotFound(String),

    /// No agent of the campaign is currently available
    #[error("No agents available: {0}")]
    NoAgentsAvailable(String),

    /// The dial queue holds no eligible record
    #[error("Queue empty: {0}")]
    QueueEmpty(String),

    /// Timeout or connection failure talking to a collaborator store
    ///
    /// Retried with bounded exponential backoff by the store gateway before
    /// it is surfaced.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// Non-transient store failure (bad query, constraint violation, ...)
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid engine or campaign configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal condition
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`DialerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected steady-state condition; back off and retry
    Expected,
    /// Caller bug or invalid request; do not retry
    InvalidOperation,
    /// Backend hiccup; retry later
    Transient,
    /// Engine or storage defect
    Internal,
}

impl DialerError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn no_agents_available<S: Into<String>>(msg: S) -> Self {
        Self::NoAgentsAvailable(msg.into())
    }

    pub fn queue_empty<S: Into<String>>(msg: S) -> Self {
        Self::QueueEmpty(msg.into())
    }

    pub fn transient_store<S: Into<String>>(msg: S) -> Self {
        Self::TransientStore(msg.into())
    }

    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error for the caller
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoAgentsAvailable(_) | Self::QueueEmpty(_) => ErrorClass::Expected,
            Self::Validation(_) | Self::Conflict(_) | Self::NotFound(_) | Self::Configuration(_) => {
                ErrorClass::InvalidOperation
            }
            Self::TransientStore(_) => ErrorClass::Transient,
            Self::Database(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Expected | ErrorClass::Transient)
    }

    /// Whether the store gateway should retry this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

impl From<sqlx::Error> for DialerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DialerError::TransientStore(err.to_string())
            }
            sqlx::Error::WorkerCrashed => DialerError::TransientStore(err.to_string()),
            _ => DialerError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DialerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DialerError::Database(format!("migration failed: {}", err))
    }
}

/// Result type for dialer engine operations
pub type Result<T> = std::result::Result<T, DialerError>;
