//! Error types for group storage components.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends and the storage facade.
///
/// Most of these never reach callers of the [`Storage`](super::Storage)
/// contract: reads degrade to absence and writes are dropped after logging.
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// Filesystem failures, with the operation that failed.
    #[error("io error while {context}: {message}")]
    Io {
        /// What the backend was doing.
        context: String,
        /// Underlying error message.
        message: String,
    },

    /// Errors coming from the preferences blob store.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// Errors coming from the cross-process file lock.
    #[error("storage lock error: {0}")]
    Lock(String),

    /// Encoding/decoding failures of stored values.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The mapped log header is missing, truncated or fails its checksum.
    ///
    /// Damaged records never surface as errors: replay treats the first bad
    /// record as the end of the log.
    #[error("corrupted log header: {0}")]
    CorruptedHeader(String),

    /// The mapped log was written by an unknown format version.
    #[error("unsupported log format version: {0}")]
    UnsupportedFormatVersion(u16),

    /// Key does not fit in a log record.
    #[error("key too large: {0} bytes")]
    KeyTooLarge(u64),

    /// Value does not fit in a log record.
    #[error("value too large: {0} bytes")]
    ValueTooLarge(u64),

    /// No backend could be constructed at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
