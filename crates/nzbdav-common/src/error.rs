//! Common error types used throughout nzbdav.
//!
//! A single error enum covers transport failures (connect/login), missing
//! articles, corrupt or unsupported content, and the usual storage and I/O
//! failures. The ingestion pipeline uses [`Error::is_non_retryable`] to decide
//! whether a failed job is finalized or paused for a retry.

/// Common error type for nzbdav.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The usenet provider could not be reached or rejected the greeting.
    #[error("Could not connect to usenet host: {0}")]
    CouldNotConnect(String),

    /// The usenet provider rejected the configured credentials.
    #[error("Could not login to usenet host: {0}")]
    CouldNotLogin(String),

    /// The requested article does not exist on the provider.
    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    /// Segment boundaries are inconsistent with the declared file layout.
    #[error("Corrupt file: {0}")]
    CorruptFile(String),

    /// A segment body did not contain valid yEnc data.
    #[error("Invalid yEnc data: {0}")]
    InvalidYenc(String),

    /// An archive volume has a bad signature or malformed headers.
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// The NZB document could not be parsed.
    #[error("Invalid NZB: {0}")]
    InvalidNzb(String),

    /// An archive entry uses a compression method other than store.
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// An archive is encrypted.
    #[error("Password protected archive: {0}")]
    PasswordProtected(String),

    /// A job produced no file with a known video extension.
    #[error("No importable videos found: {0}")]
    NoVideoFiles(String),

    /// The connection pool was shut down.
    #[error("Connection pool has been shut down")]
    PoolShutdown,

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The server answered with an unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The operation did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The requested item was not found.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new Protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new CorruptFile error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::CorruptFile(msg.into())
    }

    /// Create a new InvalidArchive error.
    pub fn invalid_archive<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArchive(msg.into())
    }

    /// Create an Io error of kind `UnexpectedEof`.
    pub fn unexpected_eof<S: Into<String>>(msg: S) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            msg.into(),
        ))
    }

    /// Whether retrying the same job can never succeed.
    ///
    /// Jobs failing with one of these errors are moved straight to history
    /// as failed instead of being paused for a retry.
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            Self::CorruptFile(_)
                | Self::InvalidYenc(_)
                | Self::InvalidArchive(_)
                | Self::InvalidNzb(_)
                | Self::UnsupportedCompression(_)
                | Self::PasswordProtected(_)
                | Self::NoVideoFiles(_)
        )
    }

    /// Whether this error is the result of cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("item");
        assert_eq!(err.to_string(), "Item not found: item");

        let err = Error::ArticleNotFound("<abc@host>".into());
        assert_eq!(err.to_string(), "Article not found: <abc@host>");

        let err = Error::PoolShutdown;
        assert_eq!(err.to_string(), "Connection pool has been shut down");

        let err = Error::corrupt("segment 3 outside search range");
        assert_eq!(
            err.to_string(),
            "Corrupt file: segment 3 outside search range"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_non_retryable_classification() {
        assert!(Error::corrupt("x").is_non_retryable());
        assert!(Error::InvalidYenc("x".into()).is_non_retryable());
        assert!(Error::invalid_archive("x").is_non_retryable());
        assert!(Error::InvalidNzb("x".into()).is_non_retryable());
        assert!(Error::UnsupportedCompression("m3".into()).is_non_retryable());
        assert!(Error::PasswordProtected("x".into()).is_non_retryable());
        assert!(Error::NoVideoFiles("x".into()).is_non_retryable());

        assert!(!Error::ArticleNotFound("x".into()).is_non_retryable());
        assert!(!Error::CouldNotConnect("x".into()).is_non_retryable());
        assert!(!Error::Timeout("x".into()).is_non_retryable());
        assert!(!Error::Cancelled.is_non_retryable());
    }

    #[test]
    fn test_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::PoolShutdown.is_cancelled());
    }

    #[test]
    fn test_unexpected_eof_kind() {
        match Error::unexpected_eof("short read") {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
