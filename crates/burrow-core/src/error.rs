use jiff::Timestamp;
use thiserror::Error;

/// Errors returned by the alias-resolution engine to its caller.
///
/// Messages never carry storage-engine text; the underlying cause is logged
/// where it is classified.
#[derive(Debug, Clone, Error)]
pub enum AliasError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("alias not found: {0}")]
    NotFound(String),
    #[error("alias {code} expired at {expired_at}")]
    Expired { code: String, expired_at: Timestamp },
    #[error("internal error: {0}")]
    Internal(String),
    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),
}

/// Stable classification of an [`AliasError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Expired,
    Internal,
    DeadlineExceeded,
}

impl AliasError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AliasError::InvalidInput(_) => ErrorKind::InvalidInput,
            AliasError::NotFound(_) => ErrorKind::NotFound,
            AliasError::Expired { .. } => ErrorKind::Expired,
            AliasError::Internal(_) => ErrorKind::Internal,
            AliasError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
        }
    }
}

impl ErrorKind {
    /// Numeric error code handed to clients.
    ///
    /// `Expired` shares the 404 family with `NotFound` but keeps its own code
    /// so clients can tell a stale alias from an unknown one.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::InvalidInput => 400_001,
            ErrorKind::NotFound => 404_001,
            ErrorKind::Expired => 404_003,
            ErrorKind::Internal => 500_001,
            ErrorKind::DeadlineExceeded => 504_001,
        }
    }

    /// The HTTP status a transport should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound | ErrorKind::Expired => 404,
            ErrorKind::Internal => 500,
            ErrorKind::DeadlineExceeded => 504,
        }
    }

    /// Short client-facing description.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "One of the request inputs is not valid.",
            ErrorKind::NotFound => "The specified alias does not exist.",
            ErrorKind::Expired => "The shortened URL has expired.",
            ErrorKind::Internal => "The server encountered an internal error.",
            ErrorKind::DeadlineExceeded => "The operation did not finish in time.",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache initialization failed: {0}")]
    Initialization(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("membership filter unavailable: {0}")]
    Unavailable(String),
    #[error("membership filter initialization failed: {0}")]
    Initialization(String),
    #[error("membership filter operation failed: {0}")]
    Operation(String),
}
